use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use sea_orm::DatabaseConnection;

use crate::EvidenceStore;

mod accounts;
mod disputes;
mod ledger;

pub use disputes::list::{CaseListFilter, CaseSummary};
pub use ledger::TransactionListFilter;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Stateless escrow/dispute service over a relational store.
///
/// Callers arrive pre-authenticated; the engine trusts actor ids and
/// enforces only the ledger and dispute invariants.
pub struct Engine {
    database: DatabaseConnection,
    evidence_store: Option<Arc<dyn EvidenceStore>>,
    /// Times a release/refund had to floor a balance at zero. A non-zero
    /// value means the account needs reconciliation.
    clamped_adjustments: AtomicU64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("evidence_store", &self.evidence_store.is_some())
            .field(
                "clamped_adjustments",
                &self.clamped_adjustments.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Number of balance adjustments floored at zero since startup.
    pub fn clamped_adjustments(&self) -> u64 {
        self.clamped_adjustments.load(Ordering::Relaxed)
    }

    pub(in crate::ops) fn record_clamp(&self) {
        self.clamped_adjustments.fetch_add(1, Ordering::Relaxed);
    }

    pub(in crate::ops) fn evidence_store(&self) -> Option<&Arc<dyn EvidenceStore>> {
        self.evidence_store.as_ref()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    evidence_store: Option<Arc<dyn EvidenceStore>>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Pass the evidence store used when dispute events carry uploads.
    pub fn evidence_store(mut self, store: Arc<dyn EvidenceStore>) -> EngineBuilder {
        self.evidence_store = Some(store);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> crate::ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            evidence_store: self.evidence_store,
            clamped_adjustments: AtomicU64::new(0),
        })
    }
}
