//! Escrow transaction primitives.
//!
//! An `EscrowTransaction` holds funds against one account until a release
//! condition is met. Every mutation appends an entry to its `AuditTrail`,
//! which is strictly append-only.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, Currency, EngineError, ResultEngine, util::{model_currency, parse_uuid}};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Project,
    Gig,
    Milestone,
    Retainer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Gig => "gig",
            Self::Milestone => "milestone",
            Self::Retainer => "retainer",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "project" => Ok(Self::Project),
            "gig" => Ok(Self::Gig),
            "milestone" => Ok(Self::Milestone),
            "retainer" => Ok(Self::Retainer),
            other => Err(EngineError::Validation(format!(
                "invalid transaction type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Initiated,
    Funded,
    InEscrow,
    Disputed,
    Released,
    Refunded,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Funded => "funded",
            Self::InEscrow => "in_escrow",
            Self::Disputed => "disputed",
            Self::Released => "released",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states are immutable except for trailing metadata.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::Cancelled)
    }

    /// Only these states may be released or refunded.
    #[must_use]
    pub fn is_settleable(self) -> bool {
        matches!(self, Self::InEscrow | Self::Funded | Self::Disputed)
    }
}

impl TryFrom<&str> for TransactionStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "initiated" => Ok(Self::Initiated),
            "funded" => Ok(Self::Funded),
            "in_escrow" => Ok(Self::InEscrow),
            "disputed" => Ok(Self::Disputed),
            "released" => Ok(Self::Released),
            "refunded" => Ok(Self::Refunded),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!(
                "invalid transaction status: {other}"
            ))),
        }
    }
}

/// One entry of a transaction's audit trail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub actor_id: i64,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Ordered, append-only audit log owned by a transaction.
///
/// The only mutation exposed is [`append`](AuditTrail::append); existing
/// entries are never rewritten or removed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail(Vec<AuditEntry>);

impl AuditTrail {
    pub fn append(&mut self, entry: AuditEntry) {
        self.0.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn from_json(value: Option<Json>) -> ResultEngine<Self> {
        match value {
            None => Ok(Self::default()),
            Some(json) => serde_json::from_value(json)
                .map_err(|_| EngineError::Validation("invalid audit trail".to_string())),
        }
    }

    pub(crate) fn to_json(&self) -> ResultEngine<Json> {
        serde_json::to_value(self)
            .map_err(|_| EngineError::Validation("invalid audit trail".to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Caller-supplied idempotency key, globally unique.
    pub reference: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub currency: Currency,
    pub amount: Amount,
    pub fee_amount: Amount,
    pub net_amount: Amount,
    pub initiated_by: i64,
    pub counterparty_id: Option<i64>,
    pub scheduled_release_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub audit_trail: AuditTrail,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "escrow_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub reference: String,
    pub kind: String,
    pub status: String,
    pub currency: String,
    pub amount_minor: i64,
    pub fee_minor: i64,
    pub net_minor: i64,
    pub initiated_by: i64,
    pub counterparty_id: Option<i64>,
    pub scheduled_release_at: Option<DateTimeUtc>,
    pub released_at: Option<DateTimeUtc>,
    pub refunded_at: Option<DateTimeUtc>,
    pub cancelled_at: Option<DateTimeUtc>,
    pub audit_trail: Option<Json>,
    pub metadata: Option<Json>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id"
    )]
    Account,
    #[sea_orm(has_many = "super::disputes::Entity")]
    DisputeCases,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::disputes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DisputeCases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl EscrowTransaction {
    pub(crate) fn to_active_model(&self) -> ResultEngine<ActiveModel> {
        Ok(ActiveModel {
            id: ActiveValue::Set(self.id.to_string()),
            account_id: ActiveValue::Set(self.account_id.to_string()),
            reference: ActiveValue::Set(self.reference.clone()),
            kind: ActiveValue::Set(self.kind.as_str().to_string()),
            status: ActiveValue::Set(self.status.as_str().to_string()),
            currency: ActiveValue::Set(self.currency.code().to_string()),
            amount_minor: ActiveValue::Set(self.amount.minor()),
            fee_minor: ActiveValue::Set(self.fee_amount.minor()),
            net_minor: ActiveValue::Set(self.net_amount.minor()),
            initiated_by: ActiveValue::Set(self.initiated_by),
            counterparty_id: ActiveValue::Set(self.counterparty_id),
            scheduled_release_at: ActiveValue::Set(self.scheduled_release_at),
            released_at: ActiveValue::Set(self.released_at),
            refunded_at: ActiveValue::Set(self.refunded_at),
            cancelled_at: ActiveValue::Set(self.cancelled_at),
            audit_trail: ActiveValue::Set(Some(self.audit_trail.to_json()?)),
            metadata: ActiveValue::Set(self.metadata.clone()),
            created_at: ActiveValue::Set(self.created_at),
        })
    }
}

impl TryFrom<Model> for EscrowTransaction {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            reference: model.reference,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            status: TransactionStatus::try_from(model.status.as_str())?,
            currency: model_currency(&model.currency)?,
            amount: Amount::from_minor(model.amount_minor),
            fee_amount: Amount::from_minor(model.fee_minor),
            net_amount: Amount::from_minor(model.net_minor),
            initiated_by: model.initiated_by,
            counterparty_id: model.counterparty_id,
            scheduled_release_at: model.scheduled_release_at,
            released_at: model.released_at,
            refunded_at: model.refunded_at,
            cancelled_at: model.cancelled_at,
            audit_trail: AuditTrail::from_json(model.audit_trail)?,
            metadata: model.metadata,
            created_at: model.created_at,
        })
    }
}
