use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*};

use crate::{
    ActionType, ActorType, AppendEventCmd, CasePatch, DisputeCase, DisputeEvent, DisputeStage,
    DisputeStatus, EngineError, EvidenceUpload, OpenDisputeCmd, ResultEngine,
    TransactionResolution, UpdateCaseCmd, disputes, events,
    util::{normalize_optional_text, normalize_required_text, validate_actor_id},
};

use super::{Engine, with_tx};

pub(in crate::ops) mod list;

/// What a patch actually changed, used to derive the event's action type and
/// its before/after metadata.
#[derive(Default)]
struct PatchOutcome {
    changed: bool,
    stage_change: Option<(DisputeStage, DisputeStage)>,
    status_change: Option<(DisputeStatus, DisputeStatus)>,
    deadlines_changed: bool,
}

fn apply_case_patch(case: &mut DisputeCase, patch: &CasePatch, now: DateTime<Utc>) -> PatchOutcome {
    let mut outcome = PatchOutcome::default();

    if let Some(stage) = patch.stage
        && stage != case.stage
    {
        outcome.stage_change = Some((case.stage, stage));
        case.stage = stage;
        outcome.changed = true;
    }
    if let Some(status) = patch.status
        && status != case.status
    {
        outcome.status_change = Some((case.status, status));
        case.status = status;
        // resolved_at mirrors the status: stamped on resolution, cleared on
        // reopen.
        case.resolved_at = status.is_resolved().then_some(now);
        outcome.changed = true;
    }
    if let Some(priority) = patch.priority
        && priority != case.priority
    {
        case.priority = priority;
        outcome.changed = true;
    }
    if let Some(assigned_to) = patch.assigned_to
        && Some(assigned_to) != case.assigned_to
    {
        case.assigned_to = Some(assigned_to);
        outcome.changed = true;
    }
    if let Some(at) = patch.customer_deadline_at
        && Some(at) != case.customer_deadline_at
    {
        case.customer_deadline_at = Some(at);
        outcome.deadlines_changed = true;
        outcome.changed = true;
    }
    if let Some(at) = patch.provider_deadline_at
        && Some(at) != case.provider_deadline_at
    {
        case.provider_deadline_at = Some(at);
        outcome.deadlines_changed = true;
        outcome.changed = true;
    }
    if let Some(notes) = &patch.resolution_notes
        && Some(notes) != case.resolution_notes.as_ref()
    {
        case.resolution_notes = Some(notes.clone());
        outcome.changed = true;
    }

    outcome
}

fn derive_action(
    explicit: Option<ActionType>,
    has_evidence: bool,
    has_resolution: bool,
    actor_type: ActorType,
    outcome: &PatchOutcome,
) -> ActionType {
    if let Some(action) = explicit {
        return action;
    }
    // Settling the ledger is an engine action no matter who asked for it,
    // so it journals as a system notice rather than the status flip it
    // also causes.
    if has_resolution {
        return ActionType::SystemNotice;
    }
    if has_evidence {
        return ActionType::EvidenceUpload;
    }
    if actor_type == ActorType::System {
        return ActionType::SystemNotice;
    }
    if outcome.status_change.is_some() {
        return ActionType::StatusChange;
    }
    if outcome.stage_change.is_some() {
        return ActionType::StageAdvanced;
    }
    if outcome.deadlines_changed {
        return ActionType::DeadlineAdjusted;
    }
    ActionType::Comment
}

/// Fold the before/after transition keys into the caller's metadata.
fn event_metadata(base: Option<Value>, outcome: &PatchOutcome) -> Option<Value> {
    let mut map = match base {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("context".to_string(), other);
            map
        }
        None if outcome.stage_change.is_none() && outcome.status_change.is_none() => {
            return None;
        }
        None => Map::new(),
    };
    if let Some((before, after)) = outcome.stage_change {
        map.insert("stage_before".to_string(), Value::from(before.as_str()));
        map.insert("stage_after".to_string(), Value::from(after.as_str()));
    }
    if let Some((before, after)) = outcome.status_change {
        map.insert("status_before".to_string(), Value::from(before.as_str()));
        map.insert("status_after".to_string(), Value::from(after.as_str()));
    }
    Some(Value::Object(map))
}

impl Engine {
    /// Open a dispute case against a non-terminal transaction.
    ///
    /// At most one *active* case may exist per transaction; a second open
    /// fails with [`EngineError::Conflict`]. The transaction moves to
    /// `disputed` and the case starts at `intake`/`open` with an initial
    /// comment event carrying the summary.
    pub async fn open_case(&self, cmd: OpenDisputeCmd) -> ResultEngine<DisputeCase> {
        validate_actor_id(cmd.opened_by, "opened_by")?;
        let summary = normalize_required_text(&cmd.summary, "summary")?;
        with_tx!(self, |db_tx| {
            let mut tx = self.require_transaction(&db_tx, cmd.transaction_id).await?;
            if tx.status.is_terminal() {
                return Err(EngineError::InvalidState(format!(
                    "cannot dispute a {} transaction",
                    tx.status.as_str()
                )));
            }
            if self
                .find_active_case(&db_tx, cmd.transaction_id)
                .await?
                .is_some()
            {
                return Err(EngineError::Conflict(
                    "transaction already has an active dispute".to_string(),
                ));
            }

            let now = Utc::now();
            let case = DisputeCase {
                id: Uuid::new_v4(),
                escrow_transaction_id: tx.id,
                stage: DisputeStage::Intake,
                status: DisputeStatus::Open,
                priority: cmd.priority,
                reason: cmd.reason,
                summary: summary.clone(),
                opened_by: cmd.opened_by,
                assigned_to: None,
                customer_deadline_at: cmd.customer_deadline_at,
                provider_deadline_at: cmd.provider_deadline_at,
                opened_at: now,
                resolved_at: None,
                resolution_notes: None,
                metadata: cmd.metadata.clone(),
            };
            disputes::ActiveModel::from(&case).insert(&db_tx).await?;

            if tx.status != crate::TransactionStatus::Disputed {
                self.mark_disputed(&db_tx, &mut tx, cmd.opened_by).await?;
            }

            let event = DisputeEvent {
                id: Uuid::new_v4(),
                dispute_case_id: case.id,
                actor_id: cmd.opened_by,
                actor_type: cmd.opened_by_type,
                action_type: ActionType::Comment,
                notes: Some(summary),
                evidence: None,
                metadata: None,
                event_at: now,
            };
            event.to_active_model()?.insert(&db_tx).await?;

            Ok(case)
        })
    }

    /// Append an event to a case's journal, optionally patching the case
    /// and settling its transaction in the same atomic scope.
    pub async fn append_event(&self, cmd: AppendEventCmd) -> ResultEngine<DisputeEvent> {
        let AppendEventCmd {
            dispute_id,
            actor_id,
            actor_type,
            action_type,
            notes,
            patch,
            evidence,
            transaction_resolution,
            metadata,
        } = cmd;
        with_tx!(self, |db_tx| {
            let (_, event) = self
                .record_case_event(
                    &db_tx,
                    dispute_id,
                    actor_id,
                    actor_type,
                    action_type,
                    notes,
                    patch,
                    evidence,
                    transaction_resolution,
                    metadata,
                    false,
                )
                .await?;
            event.ok_or_else(|| {
                EngineError::Validation("nothing to record for dispute event".to_string())
            })
        })
    }

    /// Patch a case directly. Emits a journal event only when something
    /// changed or notes/resolution were supplied; a no-op patch returns
    /// the stored case untouched.
    pub async fn update_case(&self, cmd: UpdateCaseCmd) -> ResultEngine<DisputeCase> {
        let UpdateCaseCmd {
            dispute_id,
            actor_id,
            actor_type,
            patch,
            notes,
            transaction_resolution,
            metadata,
        } = cmd;
        with_tx!(self, |db_tx| {
            let (case, _) = self
                .record_case_event(
                    &db_tx,
                    dispute_id,
                    actor_id,
                    actor_type,
                    None,
                    notes,
                    patch,
                    None,
                    transaction_resolution,
                    metadata,
                    true,
                )
                .await?;
            Ok(case)
        })
    }

    /// Fetch one dispute case by id.
    pub async fn case(&self, dispute_id: Uuid) -> ResultEngine<DisputeCase> {
        with_tx!(self, |db_tx| {
            self.require_case(&db_tx, dispute_id).await
        })
    }

    /// A case's journal in chronological `(event_at, id)` order.
    pub async fn list_events(&self, dispute_id: Uuid) -> ResultEngine<Vec<DisputeEvent>> {
        with_tx!(self, |db_tx| {
            self.require_case(&db_tx, dispute_id).await?;
            let models = events::Entity::find()
                .filter(events::Column::DisputeCaseId.eq(dispute_id.to_string()))
                .order_by_asc(events::Column::EventAt)
                .order_by_asc(events::Column::Id)
                .all(&db_tx)
                .await?;
            models.into_iter().map(DisputeEvent::try_from).collect()
        })
    }

    /// The most recent journal entry, if any.
    pub async fn latest_event(&self, dispute_id: Uuid) -> ResultEngine<Option<DisputeEvent>> {
        with_tx!(self, |db_tx| {
            self.require_case(&db_tx, dispute_id).await?;
            let model = events::Entity::find()
                .filter(events::Column::DisputeCaseId.eq(dispute_id.to_string()))
                .order_by_desc(events::Column::EventAt)
                .order_by_desc(events::Column::Id)
                .one(&db_tx)
                .await?;
            model.map(DisputeEvent::try_from).transpose()
        })
    }

    async fn record_case_event(
        &self,
        db_tx: &DatabaseTransaction,
        dispute_id: Uuid,
        actor_id: i64,
        actor_type: ActorType,
        explicit_action: Option<ActionType>,
        notes: Option<String>,
        mut patch: CasePatch,
        evidence: Option<EvidenceUpload>,
        resolution: Option<TransactionResolution>,
        metadata: Option<Value>,
        skip_if_unchanged: bool,
    ) -> ResultEngine<(DisputeCase, Option<DisputeEvent>)> {
        validate_actor_id(actor_id, "actor_id")?;
        let notes = normalize_optional_text(notes.as_deref());
        let mut case = self.require_case(db_tx, dispute_id).await?;

        // A ledger resolution settles the case unless the patch says
        // otherwise.
        if resolution.is_some() {
            if patch.status.is_none() {
                patch.status = Some(DisputeStatus::Settled);
            }
            if patch.stage.is_none() {
                patch.stage = Some(DisputeStage::Resolved);
            }
        }

        let now = Utc::now();
        let outcome = apply_case_patch(&mut case, &patch, now);

        if skip_if_unchanged && !outcome.changed && notes.is_none() && resolution.is_none() {
            return Ok((case, None));
        }

        let evidence_ref = match evidence {
            None => None,
            Some(mut upload) => {
                let store = self.evidence_store().ok_or_else(|| {
                    EngineError::Evidence("no evidence store configured".to_string())
                })?;
                if upload.prefix.is_empty() {
                    upload.prefix = format!("disputes/{dispute_id}");
                }
                let stored = store.store(upload.clone()).await?;
                Some(stored.into_ref(&upload))
            }
        };

        if outcome.changed {
            disputes::ActiveModel::from(&case).update(db_tx).await?;
        }

        let has_resolution = resolution.is_some();
        if let Some(resolution) = resolution {
            let settle_notes = case.resolution_notes.clone().or_else(|| notes.clone());
            let mut tx = match resolution {
                TransactionResolution::Release => {
                    self.release_in(db_tx, case.escrow_transaction_id, actor_id, settle_notes)
                        .await?
                }
                TransactionResolution::Refund => {
                    self.refund_in(db_tx, case.escrow_transaction_id, actor_id, settle_notes)
                        .await?
                }
            };
            self.append_transaction_audit(db_tx, &mut tx, "dispute_resolved", actor_id, None)
                .await?;
        }

        let event = DisputeEvent {
            id: Uuid::new_v4(),
            dispute_case_id: case.id,
            actor_id,
            actor_type,
            action_type: derive_action(
                explicit_action,
                evidence_ref.is_some(),
                has_resolution,
                actor_type,
                &outcome,
            ),
            notes,
            evidence: evidence_ref,
            metadata: event_metadata(metadata, &outcome),
            event_at: now,
        };
        event.to_active_model()?.insert(db_tx).await?;

        Ok((case, Some(event)))
    }

    pub(in crate::ops) async fn require_case(
        &self,
        db_tx: &DatabaseTransaction,
        dispute_id: Uuid,
    ) -> ResultEngine<DisputeCase> {
        let model = disputes::Entity::find_by_id(dispute_id.to_string())
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::NotFound("dispute case".to_string()))?;
        DisputeCase::try_from(model)
    }

    async fn find_active_case(
        &self,
        db_tx: &DatabaseTransaction,
        transaction_id: Uuid,
    ) -> ResultEngine<Option<DisputeCase>> {
        let model = disputes::Entity::find()
            .filter(disputes::Column::EscrowTransactionId.eq(transaction_id.to_string()))
            .filter(disputes::Column::Status.is_in(DisputeStatus::active_values()))
            .one(db_tx)
            .await?;
        model.map(DisputeCase::try_from).transpose()
    }
}
