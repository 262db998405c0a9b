//! Dispute event primitives.
//!
//! Events are the append-only journal of a dispute case. There is no update
//! or delete path; corrections are new events pointing at the old one via
//! `metadata`. Chronological order is `(event_at, id)` ascending.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Customer,
    Provider,
    Mediator,
    Admin,
    System,
}

impl ActorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Provider => "provider",
            Self::Mediator => "mediator",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl TryFrom<&str> for ActorType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "customer" => Ok(Self::Customer),
            "provider" => Ok(Self::Provider),
            "mediator" => Ok(Self::Mediator),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            other => Err(EngineError::Validation(format!(
                "invalid actor type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Comment,
    StatusChange,
    StageAdvanced,
    EvidenceUpload,
    DeadlineAdjusted,
    SystemNotice,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::StatusChange => "status_change",
            Self::StageAdvanced => "stage_advanced",
            Self::EvidenceUpload => "evidence_upload",
            Self::DeadlineAdjusted => "deadline_adjusted",
            Self::SystemNotice => "system_notice",
        }
    }
}

impl TryFrom<&str> for ActionType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "comment" => Ok(Self::Comment),
            "status_change" => Ok(Self::StatusChange),
            "stage_advanced" => Ok(Self::StageAdvanced),
            "evidence_upload" => Ok(Self::EvidenceUpload),
            "deadline_adjusted" => Ok(Self::DeadlineAdjusted),
            "system_notice" => Ok(Self::SystemNotice),
            other => Err(EngineError::Validation(format!(
                "invalid action type: {other}"
            ))),
        }
    }
}

/// Reference to a stored evidence object, attached to an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub key: String,
    pub url: String,
    pub file_name: String,
    pub content_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisputeEvent {
    pub id: Uuid,
    pub dispute_case_id: Uuid,
    pub actor_id: i64,
    pub actor_type: ActorType,
    pub action_type: ActionType,
    pub notes: Option<String>,
    pub evidence: Option<EvidenceRef>,
    pub metadata: Option<serde_json::Value>,
    pub event_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dispute_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub dispute_case_id: String,
    pub actor_id: i64,
    pub actor_type: String,
    pub action_type: String,
    pub notes: Option<String>,
    pub evidence: Option<Json>,
    pub metadata: Option<Json>,
    pub event_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::disputes::Entity",
        from = "Column::DisputeCaseId",
        to = "super::disputes::Column::Id"
    )]
    Case,
}

impl Related<super::disputes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Case.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl DisputeEvent {
    pub(crate) fn to_active_model(&self) -> ResultEngine<ActiveModel> {
        let evidence = match &self.evidence {
            None => None,
            Some(evidence) => Some(
                serde_json::to_value(evidence)
                    .map_err(|_| EngineError::Validation("invalid evidence ref".to_string()))?,
            ),
        };
        Ok(ActiveModel {
            id: ActiveValue::Set(self.id.to_string()),
            dispute_case_id: ActiveValue::Set(self.dispute_case_id.to_string()),
            actor_id: ActiveValue::Set(self.actor_id),
            actor_type: ActiveValue::Set(self.actor_type.as_str().to_string()),
            action_type: ActiveValue::Set(self.action_type.as_str().to_string()),
            notes: ActiveValue::Set(self.notes.clone()),
            evidence: ActiveValue::Set(evidence),
            metadata: ActiveValue::Set(self.metadata.clone()),
            event_at: ActiveValue::Set(self.event_at),
        })
    }
}

impl TryFrom<Model> for DisputeEvent {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let evidence = match model.evidence {
            None => None,
            Some(json) => Some(
                serde_json::from_value(json)
                    .map_err(|_| EngineError::Validation("invalid evidence ref".to_string()))?,
            ),
        };
        Ok(Self {
            id: parse_uuid(&model.id, "dispute event")?,
            dispute_case_id: parse_uuid(&model.dispute_case_id, "dispute case")?,
            actor_id: model.actor_id,
            actor_type: ActorType::try_from(model.actor_type.as_str())?,
            action_type: ActionType::try_from(model.action_type.as_str())?,
            notes: model.notes,
            evidence,
            metadata: model.metadata,
            event_at: model.event_at,
        })
    }
}
