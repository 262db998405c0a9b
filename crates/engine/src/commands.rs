//! Command structs for engine operations.
//!
//! These types group parameters for write operations (initiate/release/
//! dispute flows), keeping call sites readable and avoiding long argument
//! lists.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    ActorType, Amount, Currency, DisputeReason, DisputeStage, DisputeStatus, EvidenceUpload,
    Priority, TransactionKind,
};

/// Ledger-side outcome of resolving a dispute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionResolution {
    Release,
    Refund,
}

/// Hold funds in escrow against an account.
#[derive(Clone, Debug)]
pub struct InitiateCmd {
    pub account_id: Uuid,
    /// Caller-supplied idempotency key; a duplicate fails with `Conflict`.
    pub reference: String,
    pub amount: Amount,
    pub fee_amount: Amount,
    pub kind: TransactionKind,
    pub initiated_by: i64,
    pub counterparty_id: Option<i64>,
    pub scheduled_release_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

impl InitiateCmd {
    #[must_use]
    pub fn new(
        account_id: Uuid,
        reference: impl Into<String>,
        amount: Amount,
        kind: TransactionKind,
        initiated_by: i64,
    ) -> Self {
        Self {
            account_id,
            reference: reference.into(),
            amount,
            fee_amount: Amount::ZERO,
            kind,
            initiated_by,
            counterparty_id: None,
            scheduled_release_at: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn fee_amount(mut self, fee_amount: Amount) -> Self {
        self.fee_amount = fee_amount;
        self
    }

    #[must_use]
    pub fn counterparty_id(mut self, counterparty_id: i64) -> Self {
        self.counterparty_id = Some(counterparty_id);
        self
    }

    #[must_use]
    pub fn scheduled_release_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_release_at = Some(at);
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Actor context for release/refund/cancel.
#[derive(Clone, Debug)]
pub struct ResolutionCmd {
    pub actor_id: i64,
    pub notes: Option<String>,
}

impl ResolutionCmd {
    #[must_use]
    pub fn new(actor_id: i64) -> Self {
        Self {
            actor_id,
            notes: None,
        }
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Whitelist patch for `update_account`.
///
/// Absent fields are left untouched; a patch equal to the current state is a
/// no-op and returns the account unchanged.
#[derive(Clone, Debug, Default)]
pub struct AccountPatch {
    pub status: Option<crate::AccountStatus>,
    pub currency: Option<Currency>,
    pub current_balance: Option<Amount>,
    pub pending_release_total: Option<Amount>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

impl AccountPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: crate::AccountStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    #[must_use]
    pub fn current_balance(mut self, amount: Amount) -> Self {
        self.current_balance = Some(amount);
        self
    }

    #[must_use]
    pub fn pending_release_total(mut self, amount: Amount) -> Self {
        self.pending_release_total = Some(amount);
        self
    }

    #[must_use]
    pub fn last_reconciled_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_reconciled_at = Some(at);
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.currency.is_none()
            && self.current_balance.is_none()
            && self.pending_release_total.is_none()
            && self.last_reconciled_at.is_none()
            && self.metadata.is_none()
    }
}

/// Open a dispute case against an escrow transaction.
#[derive(Clone, Debug)]
pub struct OpenDisputeCmd {
    pub transaction_id: Uuid,
    pub opened_by: i64,
    /// Who the opener is acting as; customers are the common case.
    pub opened_by_type: ActorType,
    pub reason: DisputeReason,
    pub summary: String,
    pub priority: Priority,
    pub customer_deadline_at: Option<DateTime<Utc>>,
    pub provider_deadline_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

impl OpenDisputeCmd {
    #[must_use]
    pub fn new(
        transaction_id: Uuid,
        opened_by: i64,
        reason: DisputeReason,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            opened_by,
            opened_by_type: ActorType::Customer,
            reason,
            summary: summary.into(),
            priority: Priority::Medium,
            customer_deadline_at: None,
            provider_deadline_at: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn opened_by_type(mut self, actor_type: ActorType) -> Self {
        self.opened_by_type = actor_type;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn customer_deadline_at(mut self, at: DateTime<Utc>) -> Self {
        self.customer_deadline_at = Some(at);
        self
    }

    #[must_use]
    pub fn provider_deadline_at(mut self, at: DateTime<Utc>) -> Self {
        self.provider_deadline_at = Some(at);
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Whitelisted dispute-case field updates shared by `append_event` and
/// `update_case`. Absent fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct CasePatch {
    pub stage: Option<DisputeStage>,
    pub status: Option<DisputeStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<i64>,
    pub customer_deadline_at: Option<DateTime<Utc>>,
    pub provider_deadline_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

impl CasePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stage(mut self, stage: DisputeStage) -> Self {
        self.stage = Some(stage);
        self
    }

    #[must_use]
    pub fn status(mut self, status: DisputeStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn assigned_to(mut self, assigned_to: i64) -> Self {
        self.assigned_to = Some(assigned_to);
        self
    }

    #[must_use]
    pub fn customer_deadline_at(mut self, at: DateTime<Utc>) -> Self {
        self.customer_deadline_at = Some(at);
        self
    }

    #[must_use]
    pub fn provider_deadline_at(mut self, at: DateTime<Utc>) -> Self {
        self.provider_deadline_at = Some(at);
        self
    }

    #[must_use]
    pub fn resolution_notes(mut self, notes: impl Into<String>) -> Self {
        self.resolution_notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stage.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
            && self.customer_deadline_at.is_none()
            && self.provider_deadline_at.is_none()
            && self.resolution_notes.is_none()
    }
}

/// Append an event to a dispute case, optionally updating the case and
/// resolving its transaction in the same atomic scope.
#[derive(Clone, Debug)]
pub struct AppendEventCmd {
    pub dispute_id: Uuid,
    pub actor_id: i64,
    pub actor_type: ActorType,
    /// Derived from the patch/resolution when absent.
    pub action_type: Option<crate::ActionType>,
    pub notes: Option<String>,
    pub patch: CasePatch,
    pub evidence: Option<EvidenceUpload>,
    pub transaction_resolution: Option<TransactionResolution>,
    pub metadata: Option<serde_json::Value>,
}

impl AppendEventCmd {
    #[must_use]
    pub fn new(dispute_id: Uuid, actor_id: i64, actor_type: ActorType) -> Self {
        Self {
            dispute_id,
            actor_id,
            actor_type,
            action_type: None,
            notes: None,
            patch: CasePatch::default(),
            evidence: None,
            transaction_resolution: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn action_type(mut self, action_type: crate::ActionType) -> Self {
        self.action_type = Some(action_type);
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn patch(mut self, patch: CasePatch) -> Self {
        self.patch = patch;
        self
    }

    #[must_use]
    pub fn evidence(mut self, evidence: EvidenceUpload) -> Self {
        self.evidence = Some(evidence);
        self
    }

    #[must_use]
    pub fn transaction_resolution(mut self, resolution: TransactionResolution) -> Self {
        self.transaction_resolution = Some(resolution);
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Administrative direct patch on a dispute case.
///
/// Same rules as [`AppendEventCmd`], but only emits an event when something
/// actually changed or notes/resolution were supplied.
#[derive(Clone, Debug)]
pub struct UpdateCaseCmd {
    pub dispute_id: Uuid,
    pub actor_id: i64,
    pub actor_type: ActorType,
    pub patch: CasePatch,
    pub notes: Option<String>,
    pub transaction_resolution: Option<TransactionResolution>,
    pub metadata: Option<serde_json::Value>,
}

impl UpdateCaseCmd {
    #[must_use]
    pub fn new(dispute_id: Uuid, actor_id: i64, actor_type: ActorType) -> Self {
        Self {
            dispute_id,
            actor_id,
            actor_type,
            patch: CasePatch::default(),
            notes: None,
            transaction_resolution: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn patch(mut self, patch: CasePatch) -> Self {
        self.patch = patch;
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn transaction_resolution(mut self, resolution: TransactionResolution) -> Self {
        self.transaction_resolution = Some(resolution);
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
