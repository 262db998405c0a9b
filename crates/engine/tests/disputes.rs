use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use sea_orm::Database;

use engine::{
    ActionType, ActorType, Amount, AppendEventCmd, CaseListFilter, CasePatch, Currency,
    DisputeReason, DisputeStage, DisputeStatus, Engine, EngineError, EscrowTransaction,
    EvidenceStore, EvidenceUpload, InitiateCmd, OpenDisputeCmd, Priority, ResolutionCmd,
    StoredEvidence, TransactionKind, TransactionResolution, TransactionStatus, UpdateCaseCmd,
};
use migration::MigratorTrait;

struct MemoryEvidence {
    keys: Mutex<Vec<String>>,
}

impl MemoryEvidence {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            keys: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl EvidenceStore for MemoryEvidence {
    async fn store(&self, upload: EvidenceUpload) -> Result<StoredEvidence, EngineError> {
        let key = format!("{}/{}", upload.prefix, upload.file_name);
        self.keys.lock().unwrap().push(key.clone());
        Ok(StoredEvidence {
            url: format!("memory://{key}"),
            key,
        })
    }
}

async fn engine_with_db() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Engine::builder().database(db).build().await.unwrap()
}

async fn engine_with_evidence() -> (Engine, Arc<MemoryEvidence>) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let store = MemoryEvidence::new();
    let engine = Engine::builder()
        .database(db)
        .evidence_store(store.clone())
        .build()
        .await
        .unwrap();
    (engine, store)
}

async fn hold(engine: &Engine, reference: &str, major: i64, fee_major: i64) -> EscrowTransaction {
    let account = engine
        .ensure_account(1, "marketplace", Currency::default(), None)
        .await
        .unwrap();
    engine
        .initiate(
            InitiateCmd::new(
                account.id,
                reference,
                Amount::from_major(major),
                TransactionKind::Project,
                1,
            )
            .fee_amount(Amount::from_major(fee_major))
            .counterparty_id(2),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn open_case_marks_transaction_disputed() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-1", 100, 10).await;

    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::NonDelivery,
            "Deliverable never arrived",
        ))
        .await
        .unwrap();
    assert_eq!(case.stage, DisputeStage::Intake);
    assert_eq!(case.status, DisputeStatus::Open);
    assert_eq!(case.priority, Priority::Medium);
    assert!(case.resolved_at.is_none());

    let tx = engine.transaction(tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Disputed);
    let last = tx.audit_trail.entries().last().unwrap();
    assert_eq!(last.action, "dispute_opened");

    let events = engine.list_events(case.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action_type, ActionType::Comment);
    assert_eq!(events[0].notes.as_deref(), Some("Deliverable never arrived"));
}

#[tokio::test]
async fn second_active_case_conflicts() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-2", 100, 0).await;

    engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::QualityIssue,
            "Low quality",
        ))
        .await
        .unwrap();

    let err = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            2,
            DisputeReason::LateDelivery,
            "Also late",
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Conflict("transaction already has an active dispute".to_string())
    );
}

#[tokio::test]
async fn terminal_transactions_cannot_be_disputed() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-3", 100, 0).await;
    engine
        .release(tx.id, ResolutionCmd::new(2))
        .await
        .unwrap();

    let err = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::Other,
            "Too late",
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidState("cannot dispute a released transaction".to_string())
    );
}

#[tokio::test]
async fn disputed_holds_cannot_be_cancelled() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-4", 100, 0).await;
    engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::ScopeDisagreement,
            "Scope creep",
        ))
        .await
        .unwrap();

    let err = engine
        .cancel(tx.id, ResolutionCmd::new(1))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidState("cannot move transaction from disputed to cancelled".to_string())
    );
}

#[tokio::test]
async fn refund_resolution_settles_case_and_ledger_together() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-5", 100, 10).await;
    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::NonDelivery,
            "Nothing delivered",
        ))
        .await
        .unwrap();

    let event = engine
        .append_event(
            AppendEventCmd::new(case.id, 3, ActorType::Mediator)
                .patch(CasePatch::new().resolution_notes("refund in full"))
                .transaction_resolution(TransactionResolution::Refund),
        )
        .await
        .unwrap();
    // The engine settles the ledger on the caller's behalf, so the journal
    // entry is a system notice even though the case status also flipped.
    assert_eq!(event.action_type, ActionType::SystemNotice);
    let metadata = event.metadata.clone().unwrap();
    assert_eq!(metadata["status_after"], "settled");

    let case = engine.case(case.id).await.unwrap();
    assert_eq!(case.status, DisputeStatus::Settled);
    assert_eq!(case.stage, DisputeStage::Resolved);
    assert!(case.resolved_at.is_some());
    assert_eq!(case.resolution_notes.as_deref(), Some("refund in full"));

    let tx = engine.transaction(tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Refunded);
    let actions: Vec<&str> = tx
        .audit_trail
        .entries()
        .iter()
        .map(|e| e.action.as_str())
        .collect();
    assert_eq!(
        actions,
        vec!["initiated", "dispute_opened", "refunded", "dispute_resolved"]
    );

    let account = engine.account(tx.account_id).await.unwrap();
    assert!(account.current_balance.is_zero());
    assert!(account.pending_release_total.is_zero());
}

#[tokio::test]
async fn failed_resolution_rolls_back_the_whole_event() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-6", 100, 0).await;
    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::PaymentIssue,
            "Charged twice",
        ))
        .await
        .unwrap();

    engine
        .append_event(
            AppendEventCmd::new(case.id, 3, ActorType::Mediator)
                .transaction_resolution(TransactionResolution::Release),
        )
        .await
        .unwrap();
    let events_before = engine.list_events(case.id).await.unwrap().len();

    // A second resolution hits a terminal transaction; the case patch in
    // the same command must roll back with it.
    let err = engine
        .append_event(
            AppendEventCmd::new(case.id, 3, ActorType::Mediator)
                .patch(CasePatch::new().priority(Priority::Urgent))
                .transaction_resolution(TransactionResolution::Refund),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidState("cannot move transaction from released to refunded".to_string())
    );

    let case = engine.case(case.id).await.unwrap();
    assert_eq!(case.priority, Priority::Medium);
    assert_eq!(case.status, DisputeStatus::Settled);
    assert_eq!(engine.list_events(case.id).await.unwrap().len(), events_before);

    let tx = engine.transaction(tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Released);
}

#[tokio::test]
async fn update_case_noop_emits_no_event() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-7", 100, 0).await;
    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::QualityIssue,
            "Blurry photos",
        ))
        .await
        .unwrap();
    let events_before = engine.list_events(case.id).await.unwrap().len();

    let unchanged = engine
        .update_case(UpdateCaseCmd::new(case.id, 4, ActorType::Admin))
        .await
        .unwrap();
    assert_eq!(unchanged.id, case.id);
    assert_eq!(unchanged.status, case.status);
    assert_eq!(unchanged.priority, case.priority);

    // Patching to the values already stored is also a no-op.
    let unchanged = engine
        .update_case(
            UpdateCaseCmd::new(case.id, 4, ActorType::Admin)
                .patch(CasePatch::new().priority(Priority::Medium)),
        )
        .await
        .unwrap();
    assert_eq!(unchanged.priority, Priority::Medium);
    assert!(unchanged.resolved_at.is_none());

    assert_eq!(engine.list_events(case.id).await.unwrap().len(), events_before);
}

#[tokio::test]
async fn update_case_records_transitions_in_event_metadata() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-8", 100, 0).await;
    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::CommunicationBreakdown,
            "No replies for a week",
        ))
        .await
        .unwrap();

    let updated = engine
        .update_case(
            UpdateCaseCmd::new(case.id, 4, ActorType::Admin).patch(
                CasePatch::new()
                    .stage(DisputeStage::Mediation)
                    .status(DisputeStatus::UnderReview)
                    .assigned_to(9),
            ),
        )
        .await
        .unwrap();
    assert_eq!(updated.stage, DisputeStage::Mediation);
    assert_eq!(updated.status, DisputeStatus::UnderReview);
    assert_eq!(updated.assigned_to, Some(9));

    let event = engine.latest_event(case.id).await.unwrap().unwrap();
    assert_eq!(event.action_type, ActionType::StatusChange);
    let metadata = event.metadata.unwrap();
    assert_eq!(metadata["stage_before"], "intake");
    assert_eq!(metadata["stage_after"], "mediation");
    assert_eq!(metadata["status_before"], "open");
    assert_eq!(metadata["status_after"], "under_review");
}

#[tokio::test]
async fn reopening_clears_resolved_at() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-9", 100, 0).await;
    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::Other,
            "Misc issue",
        ))
        .await
        .unwrap();

    let closed = engine
        .update_case(
            UpdateCaseCmd::new(case.id, 4, ActorType::Admin)
                .patch(CasePatch::new().status(DisputeStatus::Closed)),
        )
        .await
        .unwrap();
    assert!(closed.resolved_at.is_some());

    let reopened = engine
        .update_case(
            UpdateCaseCmd::new(case.id, 4, ActorType::Admin)
                .patch(CasePatch::new().status(DisputeStatus::UnderReview)),
        )
        .await
        .unwrap();
    assert!(reopened.resolved_at.is_none());
}

#[tokio::test]
async fn evidence_upload_is_stored_and_referenced() {
    let (engine, store) = engine_with_evidence().await;
    let tx = hold(&engine, "ord-10", 100, 0).await;
    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::QualityIssue,
            "Cracked on arrival",
        ))
        .await
        .unwrap();

    let event = engine
        .append_event(
            AppendEventCmd::new(case.id, 1, ActorType::Customer)
                .notes("photo of the damage")
                .evidence(EvidenceUpload::new(
                    "damage.jpg",
                    "image/jpeg",
                    vec![0xff, 0xd8],
                )),
        )
        .await
        .unwrap();

    assert_eq!(event.action_type, ActionType::EvidenceUpload);
    let evidence = event.evidence.unwrap();
    assert_eq!(evidence.key, format!("disputes/{}/damage.jpg", case.id));
    assert_eq!(evidence.file_name, "damage.jpg");
    assert_eq!(evidence.content_type, "image/jpeg");
    assert_eq!(store.keys.lock().unwrap().as_slice(), [evidence.key.clone()]);
}

#[tokio::test]
async fn evidence_without_a_store_fails_and_records_nothing() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-11", 100, 0).await;
    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::QualityIssue,
            "Wrong color",
        ))
        .await
        .unwrap();
    let events_before = engine.list_events(case.id).await.unwrap().len();

    let err = engine
        .append_event(
            AppendEventCmd::new(case.id, 1, ActorType::Customer)
                .evidence(EvidenceUpload::new("proof.png", "image/png", vec![1])),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Evidence("no evidence store configured".to_string())
    );
    assert_eq!(engine.list_events(case.id).await.unwrap().len(), events_before);
}

#[tokio::test]
async fn system_actor_defaults_to_system_notice() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-12", 100, 0).await;
    let case = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::LateDelivery,
            "Two weeks late",
        ))
        .await
        .unwrap();

    let event = engine
        .append_event(
            AppendEventCmd::new(case.id, 1, ActorType::System)
                .notes("deadline reminder sent"),
        )
        .await
        .unwrap();
    assert_eq!(event.action_type, ActionType::SystemNotice);

    let event = engine
        .append_event(
            AppendEventCmd::new(case.id, 2, ActorType::Provider)
                .patch(CasePatch::new().provider_deadline_at(Utc::now() + Duration::days(3))),
        )
        .await
        .unwrap();
    assert_eq!(event.action_type, ActionType::DeadlineAdjusted);
}

#[tokio::test]
async fn case_summary_matches_the_listing_filter() {
    let engine = engine_with_db().await;
    let now = Utc::now();

    let overdue_tx = hold(&engine, "ord-13", 100, 10).await;
    engine
        .open_case(
            OpenDisputeCmd::new(
                overdue_tx.id,
                1,
                DisputeReason::NonDelivery,
                "Nothing arrived",
            )
            .priority(Priority::High)
            .customer_deadline_at(now - Duration::hours(2)),
        )
        .await
        .unwrap();

    let due_soon_tx = hold(&engine, "ord-14", 50, 5).await;
    engine
        .open_case(
            OpenDisputeCmd::new(
                due_soon_tx.id,
                1,
                DisputeReason::QualityIssue,
                "Scratched casing",
            )
            .provider_deadline_at(now + Duration::hours(12)),
        )
        .await
        .unwrap();

    let cases = engine.list_cases(&CaseListFilter::default()).await.unwrap();
    assert_eq!(cases.len(), 2);

    let summary = engine
        .case_summary(&CaseListFilter::default(), now)
        .await
        .unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.overdue, 1);
    assert_eq!(summary.due_soon, 1);
    assert_eq!(summary.unassigned, 2);
    assert_eq!(summary.by_status.get("open"), Some(&2));
    assert_eq!(summary.by_priority.get("high"), Some(&1));
    assert_eq!(summary.by_priority.get("medium"), Some(&1));
    assert_eq!(summary.total_held, Amount::from_major(150));

    let filter = CaseListFilter {
        priority: Some(Priority::High),
        ..Default::default()
    };
    let filtered_cases = engine.list_cases(&filter).await.unwrap();
    let filtered_summary = engine.case_summary(&filter, now).await.unwrap();
    assert_eq!(filtered_cases.len() as u64, filtered_summary.total);
    assert_eq!(filtered_summary.total_held, Amount::from_major(100));

    let settled_only = CaseListFilter {
        statuses: Some(vec![DisputeStatus::Settled]),
        ..Default::default()
    };
    let summary = engine.case_summary(&settled_only, now).await.unwrap();
    assert_eq!(summary.total, 0);
    assert!(summary.total_held.is_zero());
}

#[tokio::test]
async fn closed_case_frees_the_transaction_for_a_new_dispute() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-16", 100, 0).await;
    let first = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::LateDelivery,
            "A week overdue",
        ))
        .await
        .unwrap();

    engine
        .update_case(
            UpdateCaseCmd::new(first.id, 4, ActorType::Admin)
                .patch(CasePatch::new().status(DisputeStatus::Closed)),
        )
        .await
        .unwrap();

    // Only *active* cases block a new dispute on the same hold.
    let second = engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::QualityIssue,
            "Replacement also broken",
        ))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.status, DisputeStatus::Open);

    let tx = engine.transaction(tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Disputed);
}

#[tokio::test]
async fn opening_actor_type_is_recorded_on_the_first_event() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-17", 100, 0).await;

    let case = engine
        .open_case(
            OpenDisputeCmd::new(
                tx.id,
                2,
                DisputeReason::PaymentIssue,
                "Client refuses to release",
            )
            .opened_by_type(ActorType::Provider),
        )
        .await
        .unwrap();

    let events = engine.list_events(case.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].actor_type, ActorType::Provider);
    assert_eq!(events[0].actor_id, 2);
    assert_eq!(events[0].action_type, ActionType::Comment);
}

#[tokio::test]
async fn case_search_filters_on_summary_text() {
    let engine = engine_with_db().await;
    let tx = hold(&engine, "ord-15", 100, 0).await;
    engine
        .open_case(OpenDisputeCmd::new(
            tx.id,
            1,
            DisputeReason::ScopeDisagreement,
            "Extra revisions demanded",
        ))
        .await
        .unwrap();

    let hits = engine
        .list_cases(&CaseListFilter {
            search: Some("revisions".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let misses = engine
        .list_cases(&CaseListFilter {
            search: Some("nonexistent".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(misses.is_empty());
}
