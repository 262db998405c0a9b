//! Escrow account primitives.
//!
//! One account exists per `(user_id, provider)` pair and carries the
//! denormalized balance totals the ledger maintains: `current_balance` is the
//! gross sum of all non-terminal transactions on the account,
//! `pending_release_total` the net-of-fee sum.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, Currency, EngineError, ResultEngine, util::{model_currency, parse_uuid}};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Active,
    Suspended,
    Closed,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Closed => "closed",
        }
    }
}

impl TryFrom<&str> for AccountStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "closed" => Ok(Self::Closed),
            other => Err(EngineError::Validation(format!(
                "invalid account status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub id: Uuid,
    pub user_id: i64,
    pub provider: String,
    pub status: AccountStatus,
    pub currency: Currency,
    pub current_balance: Amount,
    pub pending_release_total: Amount,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl EscrowAccount {
    pub fn new(
        user_id: i64,
        provider: String,
        currency: Currency,
        metadata: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider,
            status: AccountStatus::Pending,
            currency,
            current_balance: Amount::ZERO,
            pending_release_total: Amount::ZERO,
            last_reconciled_at: None,
            metadata,
            created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "escrow_accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: i64,
    pub provider: String,
    pub status: String,
    pub currency: String,
    pub current_balance_minor: i64,
    pub pending_release_minor: i64,
    pub last_reconciled_at: Option<DateTimeUtc>,
    pub metadata: Option<Json>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&EscrowAccount> for ActiveModel {
    fn from(account: &EscrowAccount) -> Self {
        Self {
            id: ActiveValue::Set(account.id.to_string()),
            user_id: ActiveValue::Set(account.user_id),
            provider: ActiveValue::Set(account.provider.clone()),
            status: ActiveValue::Set(account.status.as_str().to_string()),
            currency: ActiveValue::Set(account.currency.code().to_string()),
            current_balance_minor: ActiveValue::Set(account.current_balance.minor()),
            pending_release_minor: ActiveValue::Set(account.pending_release_total.minor()),
            last_reconciled_at: ActiveValue::Set(account.last_reconciled_at),
            metadata: ActiveValue::Set(account.metadata.clone()),
            created_at: ActiveValue::Set(account.created_at),
        }
    }
}

impl TryFrom<Model> for EscrowAccount {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "account")?,
            user_id: model.user_id,
            provider: model.provider,
            status: AccountStatus::try_from(model.status.as_str())?,
            currency: model_currency(&model.currency)?,
            current_balance: Amount::from_minor(model.current_balance_minor),
            pending_release_total: Amount::from_minor(model.pending_release_minor),
            last_reconciled_at: model.last_reconciled_at,
            metadata: model.metadata,
            created_at: model.created_at,
        })
    }
}
