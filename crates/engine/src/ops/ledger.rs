use chrono::{DateTime, Utc};
use uuid::Uuid;

use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};

use crate::{
    AccountStatus, AuditEntry, AuditTrail, EngineError, EscrowTransaction, InitiateCmd,
    ResolutionCmd, ResultEngine, TransactionKind, TransactionStatus, transactions,
    util::{normalize_optional_text, normalize_required_text, validate_actor_id},
};

use super::{Engine, with_tx};

/// Filters for listing an account's transactions.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`), both in UTC and
/// matched against `created_at`.
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// If present, acts as an allow-list of statuses to return.
    pub statuses: Option<Vec<TransactionStatus>>,
    /// If present, acts as an allow-list of kinds to return.
    pub kinds: Option<Vec<TransactionKind>>,
}

fn validate_list_filter(filter: &TransactionListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from >= to
    {
        return Err(EngineError::Validation(
            "invalid range: from must be < to".to_string(),
        ));
    }
    if filter.statuses.as_ref().is_some_and(|s| s.is_empty()) {
        return Err(EngineError::Validation(
            "statuses must not be empty".to_string(),
        ));
    }
    if filter.kinds.as_ref().is_some_and(|k| k.is_empty()) {
        return Err(EngineError::Validation(
            "kinds must not be empty".to_string(),
        ));
    }
    Ok(())
}

trait ApplyTxFilters: QueryFilter + Sized {
    fn apply_tx_filters(self, filter: &TransactionListFilter) -> Self;
}

impl<T> ApplyTxFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_tx_filters(mut self, filter: &TransactionListFilter) -> Self {
        if let Some(from) = filter.from {
            self = self.filter(transactions::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(transactions::Column::CreatedAt.lt(to));
        }
        if let Some(statuses) = &filter.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            self = self.filter(transactions::Column::Status.is_in(statuses));
        }
        if let Some(kinds) = &filter.kinds {
            let kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
            self = self.filter(transactions::Column::Kind.is_in(kinds));
        }
        self
    }
}

/// How a settlement leaves the transaction.
#[derive(Clone, Copy)]
enum Settlement {
    Release,
    Refund,
    Cancel,
}

impl Settlement {
    fn action(self) -> &'static str {
        match self {
            Self::Release => "released",
            Self::Refund => "refunded",
            Self::Cancel => "cancelled",
        }
    }

    fn target_status(self) -> TransactionStatus {
        match self {
            Self::Release => TransactionStatus::Released,
            Self::Refund => TransactionStatus::Refunded,
            Self::Cancel => TransactionStatus::Cancelled,
        }
    }

    /// Cancel is an administrative unwind and is refused once a dispute has
    /// attached to the funds; release/refund are the two dispute-capable
    /// settlements.
    fn allowed_from(self, status: TransactionStatus) -> bool {
        match self {
            Self::Release | Self::Refund => status.is_settleable(),
            Self::Cancel => matches!(
                status,
                TransactionStatus::InEscrow | TransactionStatus::Funded
            ),
        }
    }
}

impl Engine {
    /// Hold funds in escrow: create a transaction in `in_escrow` and credit
    /// the account's gross/net balances.
    ///
    /// `reference` is the caller's idempotency key; reuse fails with
    /// [`EngineError::Conflict`]. A `pending` account is activated by its
    /// first hold, a `closed` one refuses new holds.
    pub async fn initiate(&self, cmd: InitiateCmd) -> ResultEngine<EscrowTransaction> {
        validate_actor_id(cmd.initiated_by, "initiated_by")?;
        let reference = normalize_required_text(&cmd.reference, "reference")?;
        if !cmd.amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "amount must be positive".to_string(),
            ));
        }
        if cmd.fee_amount.is_negative() {
            return Err(EngineError::InvalidAmount(
                "fee_amount must not be negative".to_string(),
            ));
        }
        if cmd.fee_amount > cmd.amount {
            return Err(EngineError::InvalidAmount(
                "fee_amount must not exceed amount".to_string(),
            ));
        }

        with_tx!(self, |db_tx| {
            let mut account = self.require_account(&db_tx, cmd.account_id).await?;
            if account.status == AccountStatus::Closed {
                return Err(EngineError::InvalidState(
                    "account is closed".to_string(),
                ));
            }

            if self
                .find_by_reference(&db_tx, &reference)
                .await?
                .is_some()
            {
                return Err(EngineError::Conflict(format!(
                    "reference {reference} already used"
                )));
            }

            let now = Utc::now();
            let net_amount = cmd.amount - cmd.fee_amount;
            let mut audit_trail = AuditTrail::default();
            audit_trail.append(AuditEntry {
                action: "initiated".to_string(),
                actor_id: cmd.initiated_by,
                at: now,
                notes: None,
            });
            let tx = EscrowTransaction {
                id: Uuid::new_v4(),
                account_id: account.id,
                reference: reference.clone(),
                kind: cmd.kind,
                status: TransactionStatus::InEscrow,
                currency: account.currency,
                amount: cmd.amount,
                fee_amount: cmd.fee_amount,
                net_amount,
                initiated_by: cmd.initiated_by,
                counterparty_id: cmd.counterparty_id,
                scheduled_release_at: cmd.scheduled_release_at,
                released_at: None,
                refunded_at: None,
                cancelled_at: None,
                audit_trail,
                metadata: cmd.metadata.clone(),
                created_at: now,
            };

            if let Err(err) = tx.to_active_model()?.insert(&db_tx).await {
                // The unique index on reference may race the pre-check.
                if self.find_by_reference(&db_tx, &reference).await?.is_some() {
                    return Err(EngineError::Conflict(format!(
                        "reference {reference} already used"
                    )));
                }
                return Err(err.into());
            }

            Engine::activate_if_pending(&mut account);
            self.apply_balance_delta(&db_tx, &mut account, tx.amount, tx.net_amount)
                .await?;
            Ok(tx)
        })
    }

    /// Release held funds to the provider.
    pub async fn release(
        &self,
        transaction_id: Uuid,
        cmd: ResolutionCmd,
    ) -> ResultEngine<EscrowTransaction> {
        validate_actor_id(cmd.actor_id, "actor_id")?;
        with_tx!(self, |db_tx| {
            self.settle_in(
                &db_tx,
                transaction_id,
                Settlement::Release,
                cmd.actor_id,
                normalize_optional_text(cmd.notes.as_deref()),
            )
            .await
        })
    }

    /// Return held funds to the customer.
    pub async fn refund(
        &self,
        transaction_id: Uuid,
        cmd: ResolutionCmd,
    ) -> ResultEngine<EscrowTransaction> {
        validate_actor_id(cmd.actor_id, "actor_id")?;
        with_tx!(self, |db_tx| {
            self.settle_in(
                &db_tx,
                transaction_id,
                Settlement::Refund,
                cmd.actor_id,
                normalize_optional_text(cmd.notes.as_deref()),
            )
            .await
        })
    }

    /// Unwind a hold that never reached a dispute.
    pub async fn cancel(
        &self,
        transaction_id: Uuid,
        cmd: ResolutionCmd,
    ) -> ResultEngine<EscrowTransaction> {
        validate_actor_id(cmd.actor_id, "actor_id")?;
        with_tx!(self, |db_tx| {
            self.settle_in(
                &db_tx,
                transaction_id,
                Settlement::Cancel,
                cmd.actor_id,
                normalize_optional_text(cmd.notes.as_deref()),
            )
            .await
        })
    }

    /// Fetch one transaction by id.
    pub async fn transaction(&self, transaction_id: Uuid) -> ResultEngine<EscrowTransaction> {
        with_tx!(self, |db_tx| {
            self.require_transaction(&db_tx, transaction_id).await
        })
    }

    /// Fetch one transaction by its caller-supplied reference.
    pub async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> ResultEngine<EscrowTransaction> {
        let reference = normalize_required_text(reference, "reference")?;
        with_tx!(self, |db_tx| {
            self.find_by_reference(&db_tx, &reference)
                .await?
                .ok_or_else(|| EngineError::NotFound("transaction".to_string()))
        })
    }

    /// List an account's transactions, oldest first.
    pub async fn list_transactions_for_account(
        &self,
        account_id: Uuid,
        filter: &TransactionListFilter,
    ) -> ResultEngine<Vec<EscrowTransaction>> {
        validate_list_filter(filter)?;
        with_tx!(self, |db_tx| {
            self.require_account(&db_tx, account_id).await?;
            let models = transactions::Entity::find()
                .filter(transactions::Column::AccountId.eq(account_id.to_string()))
                .apply_tx_filters(filter)
                .order_by_asc(transactions::Column::CreatedAt)
                .order_by_asc(transactions::Column::Id)
                .all(&db_tx)
                .await?;
            models
                .into_iter()
                .map(EscrowTransaction::try_from)
                .collect()
        })
    }

    /// Release inside an already-open scope; dispute resolutions compose on
    /// the same transaction so the case change and the ledger change commit
    /// or roll back together.
    pub(in crate::ops) async fn release_in(
        &self,
        db_tx: &DatabaseTransaction,
        transaction_id: Uuid,
        actor_id: i64,
        notes: Option<String>,
    ) -> ResultEngine<EscrowTransaction> {
        self.settle_in(db_tx, transaction_id, Settlement::Release, actor_id, notes)
            .await
    }

    /// Refund counterpart of [`release_in`](Engine::release_in).
    pub(in crate::ops) async fn refund_in(
        &self,
        db_tx: &DatabaseTransaction,
        transaction_id: Uuid,
        actor_id: i64,
        notes: Option<String>,
    ) -> ResultEngine<EscrowTransaction> {
        self.settle_in(db_tx, transaction_id, Settlement::Refund, actor_id, notes)
            .await
    }

    async fn settle_in(
        &self,
        db_tx: &DatabaseTransaction,
        transaction_id: Uuid,
        settlement: Settlement,
        actor_id: i64,
        notes: Option<String>,
    ) -> ResultEngine<EscrowTransaction> {
        let mut tx = self.require_transaction(db_tx, transaction_id).await?;
        if !settlement.allowed_from(tx.status) {
            return Err(EngineError::InvalidState(format!(
                "cannot move transaction from {} to {}",
                tx.status.as_str(),
                settlement.target_status().as_str()
            )));
        }

        let now = Utc::now();
        tx.status = settlement.target_status();
        match settlement {
            Settlement::Release => tx.released_at = Some(now),
            Settlement::Refund => tx.refunded_at = Some(now),
            Settlement::Cancel => tx.cancelled_at = Some(now),
        }
        tx.audit_trail.append(AuditEntry {
            action: settlement.action().to_string(),
            actor_id,
            at: now,
            notes,
        });
        tx.to_active_model()?.update(db_tx).await?;

        // The hold credited gross to current_balance and net to
        // pending_release_total; the settlement debits the same shape.
        let mut account = self.require_account(db_tx, tx.account_id).await?;
        self.apply_balance_delta(db_tx, &mut account, -tx.amount, -tx.net_amount)
            .await?;
        Ok(tx)
    }

    pub(in crate::ops) async fn require_transaction(
        &self,
        db_tx: &DatabaseTransaction,
        transaction_id: Uuid,
    ) -> ResultEngine<EscrowTransaction> {
        let model = transactions::Entity::find_by_id(transaction_id.to_string())
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::NotFound("transaction".to_string()))?;
        EscrowTransaction::try_from(model)
    }

    async fn find_by_reference(
        &self,
        db_tx: &DatabaseTransaction,
        reference: &str,
    ) -> ResultEngine<Option<EscrowTransaction>> {
        let model = transactions::Entity::find()
            .filter(transactions::Column::Reference.eq(reference.to_string()))
            .one(db_tx)
            .await?;
        model.map(EscrowTransaction::try_from).transpose()
    }

    pub(in crate::ops) async fn append_transaction_audit(
        &self,
        db_tx: &DatabaseTransaction,
        transaction: &mut EscrowTransaction,
        action: &str,
        actor_id: i64,
        notes: Option<String>,
    ) -> ResultEngine<()> {
        transaction.audit_trail.append(AuditEntry {
            action: action.to_string(),
            actor_id,
            at: Utc::now(),
            notes,
        });
        transaction.to_active_model()?.update(db_tx).await?;
        Ok(())
    }

    pub(in crate::ops) async fn mark_disputed(
        &self,
        db_tx: &DatabaseTransaction,
        transaction: &mut EscrowTransaction,
        actor_id: i64,
    ) -> ResultEngine<()> {
        transaction.status = TransactionStatus::Disputed;
        self.append_transaction_audit(db_tx, transaction, "dispute_opened", actor_id, None)
            .await
    }
}
