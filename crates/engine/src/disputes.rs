//! Dispute case primitives.
//!
//! A `DisputeCase` contests one escrow transaction. `status` drives the hard
//! state machine (at most one *active* case per transaction); `stage` is a
//! softer progression tracked independently for reporting. SLA flags
//! (`overdue`, `due_soon`, open duration) are derived on read and never
//! stored.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::parse_uuid};

/// Window ahead of a deadline in which a case counts as due soon.
pub const DUE_SOON_WINDOW_HOURS: i64 = 48;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStage {
    Intake,
    Mediation,
    Arbitration,
    Resolved,
}

impl DisputeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Mediation => "mediation",
            Self::Arbitration => "arbitration",
            Self::Resolved => "resolved",
        }
    }
}

impl TryFrom<&str> for DisputeStage {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "intake" => Ok(Self::Intake),
            "mediation" => Ok(Self::Mediation),
            "arbitration" => Ok(Self::Arbitration),
            "resolved" => Ok(Self::Resolved),
            other => Err(EngineError::Validation(format!(
                "invalid dispute stage: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    AwaitingCustomer,
    UnderReview,
    Settled,
    Closed,
}

impl DisputeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::AwaitingCustomer => "awaiting_customer",
            Self::UnderReview => "under_review",
            Self::Settled => "settled",
            Self::Closed => "closed",
        }
    }

    /// Active cases block a second dispute on the same transaction.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::AwaitingCustomer | Self::UnderReview)
    }

    /// `resolved_at` is set iff the status is one of these.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Settled | Self::Closed)
    }

    pub(crate) fn active_values() -> [&'static str; 3] {
        ["open", "awaiting_customer", "under_review"]
    }
}

impl TryFrom<&str> for DisputeStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "open" => Ok(Self::Open),
            "awaiting_customer" => Ok(Self::AwaitingCustomer),
            "under_review" => Ok(Self::UnderReview),
            "settled" => Ok(Self::Settled),
            "closed" => Ok(Self::Closed),
            other => Err(EngineError::Validation(format!(
                "invalid dispute status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl TryFrom<&str> for Priority {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(EngineError::Validation(format!("invalid priority: {other}"))),
        }
    }
}

/// Catalog of dispute reasons accepted at intake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    QualityIssue,
    NonDelivery,
    LateDelivery,
    ScopeDisagreement,
    PaymentIssue,
    UnauthorizedCharge,
    CommunicationBreakdown,
    Other,
}

impl DisputeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QualityIssue => "quality_issue",
            Self::NonDelivery => "non_delivery",
            Self::LateDelivery => "late_delivery",
            Self::ScopeDisagreement => "scope_disagreement",
            Self::PaymentIssue => "payment_issue",
            Self::UnauthorizedCharge => "unauthorized_charge",
            Self::CommunicationBreakdown => "communication_breakdown",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for DisputeReason {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "quality_issue" => Ok(Self::QualityIssue),
            "non_delivery" => Ok(Self::NonDelivery),
            "late_delivery" => Ok(Self::LateDelivery),
            "scope_disagreement" => Ok(Self::ScopeDisagreement),
            "payment_issue" => Ok(Self::PaymentIssue),
            "unauthorized_charge" => Ok(Self::UnauthorizedCharge),
            "communication_breakdown" => Ok(Self::CommunicationBreakdown),
            "other" => Ok(Self::Other),
            other => Err(EngineError::Validation(format!(
                "invalid dispute reason: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisputeCase {
    pub id: Uuid,
    pub escrow_transaction_id: Uuid,
    pub stage: DisputeStage,
    pub status: DisputeStatus,
    pub priority: Priority,
    pub reason: DisputeReason,
    pub summary: String,
    pub opened_by: i64,
    pub assigned_to: Option<i64>,
    pub customer_deadline_at: Option<DateTime<Utc>>,
    pub provider_deadline_at: Option<DateTime<Utc>>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl DisputeCase {
    /// Hours between opening and resolution, or `now` while unresolved.
    #[must_use]
    pub fn open_duration_hours(&self, now: DateTime<Utc>) -> i64 {
        let end = self.resolved_at.unwrap_or(now);
        (end - self.opened_at).num_hours().max(0)
    }

    /// True iff the case is active and any deadline is strictly in the past.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active()
            && [self.customer_deadline_at, self.provider_deadline_at]
                .into_iter()
                .flatten()
                .any(|deadline| deadline < now)
    }

    /// True iff the case is active and any deadline falls within the next
    /// [`DUE_SOON_WINDOW_HOURS`] hours.
    #[must_use]
    pub fn is_due_soon(&self, now: DateTime<Utc>) -> bool {
        let window_end = now + Duration::hours(DUE_SOON_WINDOW_HOURS);
        self.status.is_active()
            && [self.customer_deadline_at, self.provider_deadline_at]
                .into_iter()
                .flatten()
                .any(|deadline| deadline >= now && deadline <= window_end)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dispute_cases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub escrow_transaction_id: String,
    pub stage: String,
    pub status: String,
    pub priority: String,
    pub reason_code: String,
    pub summary: String,
    pub opened_by: i64,
    pub assigned_to: Option<i64>,
    pub customer_deadline_at: Option<DateTimeUtc>,
    pub provider_deadline_at: Option<DateTimeUtc>,
    pub opened_at: DateTimeUtc,
    pub resolved_at: Option<DateTimeUtc>,
    pub resolution_notes: Option<String>,
    pub metadata: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions::Entity",
        from = "Column::EscrowTransactionId",
        to = "super::transactions::Column::Id"
    )]
    Transaction,
    #[sea_orm(has_many = "super::events::Entity")]
    Events,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl Related<super::events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&DisputeCase> for ActiveModel {
    fn from(case: &DisputeCase) -> Self {
        Self {
            id: ActiveValue::Set(case.id.to_string()),
            escrow_transaction_id: ActiveValue::Set(case.escrow_transaction_id.to_string()),
            stage: ActiveValue::Set(case.stage.as_str().to_string()),
            status: ActiveValue::Set(case.status.as_str().to_string()),
            priority: ActiveValue::Set(case.priority.as_str().to_string()),
            reason_code: ActiveValue::Set(case.reason.as_str().to_string()),
            summary: ActiveValue::Set(case.summary.clone()),
            opened_by: ActiveValue::Set(case.opened_by),
            assigned_to: ActiveValue::Set(case.assigned_to),
            customer_deadline_at: ActiveValue::Set(case.customer_deadline_at),
            provider_deadline_at: ActiveValue::Set(case.provider_deadline_at),
            opened_at: ActiveValue::Set(case.opened_at),
            resolved_at: ActiveValue::Set(case.resolved_at),
            resolution_notes: ActiveValue::Set(case.resolution_notes.clone()),
            metadata: ActiveValue::Set(case.metadata.clone()),
        }
    }
}

impl TryFrom<Model> for DisputeCase {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "dispute case")?,
            escrow_transaction_id: parse_uuid(&model.escrow_transaction_id, "transaction")?,
            stage: DisputeStage::try_from(model.stage.as_str())?,
            status: DisputeStatus::try_from(model.status.as_str())?,
            priority: Priority::try_from(model.priority.as_str())?,
            reason: DisputeReason::try_from(model.reason_code.as_str())?,
            summary: model.summary,
            opened_by: model.opened_by,
            assigned_to: model.assigned_to,
            customer_deadline_at: model.customer_deadline_at,
            provider_deadline_at: model.provider_deadline_at,
            opened_at: model.opened_at,
            resolved_at: model.resolved_at,
            resolution_notes: model.resolution_notes,
            metadata: model.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_with_deadline(deadline: Option<DateTime<Utc>>, status: DisputeStatus) -> DisputeCase {
        DisputeCase {
            id: Uuid::new_v4(),
            escrow_transaction_id: Uuid::new_v4(),
            stage: DisputeStage::Intake,
            status,
            priority: Priority::Medium,
            reason: DisputeReason::QualityIssue,
            summary: "test".to_string(),
            opened_by: 1,
            assigned_to: None,
            customer_deadline_at: deadline,
            provider_deadline_at: None,
            opened_at: Utc::now() - Duration::hours(5),
            resolved_at: None,
            resolution_notes: None,
            metadata: None,
        }
    }

    #[test]
    fn overdue_requires_active_status() {
        let now = Utc::now();
        let past = Some(now - Duration::hours(1));

        assert!(case_with_deadline(past, DisputeStatus::Open).is_overdue(now));
        assert!(!case_with_deadline(past, DisputeStatus::Settled).is_overdue(now));
        assert!(!case_with_deadline(None, DisputeStatus::Open).is_overdue(now));
    }

    #[test]
    fn due_soon_uses_48h_window() {
        let now = Utc::now();

        let inside = Some(now + Duration::hours(12));
        assert!(case_with_deadline(inside, DisputeStatus::Open).is_due_soon(now));

        let outside = Some(now + Duration::hours(72));
        assert!(!case_with_deadline(outside, DisputeStatus::Open).is_due_soon(now));

        // Already-past deadlines are overdue, not due soon.
        let past = Some(now - Duration::hours(1));
        assert!(!case_with_deadline(past, DisputeStatus::Open).is_due_soon(now));
    }

    #[test]
    fn open_duration_stops_at_resolution() {
        let now = Utc::now();
        let mut case = case_with_deadline(None, DisputeStatus::Settled);
        case.opened_at = now - Duration::hours(10);
        case.resolved_at = Some(now - Duration::hours(4));
        assert_eq!(case.open_duration_hours(now), 6);

        case.resolved_at = None;
        assert_eq!(case.open_duration_hours(now), 10);
    }
}
