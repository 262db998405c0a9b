//! Case listing and drift-free aggregates.
//!
//! The summary runs the exact same filter as the listing, so its counts can
//! never drift from what a caller would page through.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};

use crate::{
    Amount, DisputeCase, DisputeReason, DisputeStage, DisputeStatus, EngineError, Priority,
    ResultEngine, disputes, transactions,
};

use crate::ops::{Engine, with_tx};

/// Filters for listing dispute cases.
///
/// `opened_from` is inclusive and `opened_to` exclusive, both in UTC and
/// matched against `opened_at`.
#[derive(Clone, Debug, Default)]
pub struct CaseListFilter {
    pub stage: Option<DisputeStage>,
    /// If present, acts as an allow-list of statuses to return.
    pub statuses: Option<Vec<DisputeStatus>>,
    pub priority: Option<Priority>,
    pub reason: Option<DisputeReason>,
    pub assigned_to: Option<i64>,
    pub opened_by: Option<i64>,
    /// Case-insensitive substring match on the summary.
    pub search: Option<String>,
    pub opened_from: Option<DateTime<Utc>>,
    pub opened_to: Option<DateTime<Utc>>,
}

fn validate_case_filter(filter: &CaseListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.opened_from, filter.opened_to)
        && from >= to
    {
        return Err(EngineError::Validation(
            "invalid range: opened_from must be < opened_to".to_string(),
        ));
    }
    if filter.statuses.as_ref().is_some_and(|s| s.is_empty()) {
        return Err(EngineError::Validation(
            "statuses must not be empty".to_string(),
        ));
    }
    if filter
        .search
        .as_deref()
        .is_some_and(|s| s.trim().is_empty())
    {
        return Err(EngineError::Validation(
            "search must not be empty".to_string(),
        ));
    }
    Ok(())
}

trait ApplyCaseFilters: QueryFilter + Sized {
    fn apply_case_filters(self, filter: &CaseListFilter) -> Self;
}

impl<T> ApplyCaseFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_case_filters(mut self, filter: &CaseListFilter) -> Self {
        if let Some(stage) = filter.stage {
            self = self.filter(disputes::Column::Stage.eq(stage.as_str()));
        }
        if let Some(statuses) = &filter.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            self = self.filter(disputes::Column::Status.is_in(statuses));
        }
        if let Some(priority) = filter.priority {
            self = self.filter(disputes::Column::Priority.eq(priority.as_str()));
        }
        if let Some(reason) = filter.reason {
            self = self.filter(disputes::Column::ReasonCode.eq(reason.as_str()));
        }
        if let Some(assigned_to) = filter.assigned_to {
            self = self.filter(disputes::Column::AssignedTo.eq(assigned_to));
        }
        if let Some(opened_by) = filter.opened_by {
            self = self.filter(disputes::Column::OpenedBy.eq(opened_by));
        }
        if let Some(search) = &filter.search {
            self = self.filter(disputes::Column::Summary.contains(search.trim()));
        }
        if let Some(from) = filter.opened_from {
            self = self.filter(disputes::Column::OpenedAt.gte(from));
        }
        if let Some(to) = filter.opened_to {
            self = self.filter(disputes::Column::OpenedAt.lt(to));
        }
        self
    }
}

/// Aggregates over one filtered set of cases.
///
/// Count maps are keyed by the wire value (`stage.as_str()` etc.) and only
/// contain keys that occur in the result set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaseSummary {
    pub total: u64,
    pub by_stage: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub overdue: u64,
    pub due_soon: u64,
    pub unassigned: u64,
    pub awaiting_customer: u64,
    /// Gross escrow still held by the transactions of active cases.
    pub total_held: Amount,
}

impl Engine {
    /// List dispute cases, newest first.
    pub async fn list_cases(&self, filter: &CaseListFilter) -> ResultEngine<Vec<DisputeCase>> {
        validate_case_filter(filter)?;
        with_tx!(self, |db_tx| {
            let models = disputes::Entity::find()
                .apply_case_filters(filter)
                .order_by_desc(disputes::Column::OpenedAt)
                .order_by_desc(disputes::Column::Id)
                .all(&db_tx)
                .await?;
            models.into_iter().map(DisputeCase::try_from).collect()
        })
    }

    /// Aggregate the cases matching `filter` at the instant `now`.
    ///
    /// SLA buckets (`overdue`, `due_soon`) are derived against the supplied
    /// clock, never from stored flags.
    pub async fn case_summary(
        &self,
        filter: &CaseListFilter,
        now: DateTime<Utc>,
    ) -> ResultEngine<CaseSummary> {
        validate_case_filter(filter)?;
        with_tx!(self, |db_tx| {
            let models = disputes::Entity::find()
                .apply_case_filters(filter)
                .all(&db_tx)
                .await?;
            let cases: Vec<DisputeCase> = models
                .into_iter()
                .map(DisputeCase::try_from)
                .collect::<ResultEngine<_>>()?;

            let mut summary = CaseSummary {
                total: cases.len() as u64,
                ..CaseSummary::default()
            };
            let mut held_transaction_ids: Vec<Uuid> = Vec::new();

            for case in &cases {
                *summary
                    .by_stage
                    .entry(case.stage.as_str().to_string())
                    .or_insert(0) += 1;
                *summary
                    .by_status
                    .entry(case.status.as_str().to_string())
                    .or_insert(0) += 1;
                *summary
                    .by_priority
                    .entry(case.priority.as_str().to_string())
                    .or_insert(0) += 1;
                if case.is_overdue(now) {
                    summary.overdue += 1;
                }
                if case.is_due_soon(now) {
                    summary.due_soon += 1;
                }
                if case.status == DisputeStatus::AwaitingCustomer {
                    summary.awaiting_customer += 1;
                }
                if case.status.is_active() {
                    if case.assigned_to.is_none() {
                        summary.unassigned += 1;
                    }
                    held_transaction_ids.push(case.escrow_transaction_id);
                }
            }

            if !held_transaction_ids.is_empty() {
                let ids: Vec<String> = held_transaction_ids
                    .iter()
                    .map(Uuid::to_string)
                    .collect();
                let rows = transactions::Entity::find()
                    .filter(transactions::Column::Id.is_in(ids))
                    .all(&db_tx)
                    .await?;
                for row in rows {
                    summary.total_held += Amount::from_minor(row.amount_minor);
                }
            }

            Ok(summary)
        })
    }
}
