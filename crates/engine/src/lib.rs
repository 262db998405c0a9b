//! Escrow ledger and dispute-resolution engine.
//!
//! The engine holds funds in escrow against per-`(owner, provider)` accounts
//! until a release condition is met (approval, timeout, or a dispute
//! outcome), keeping an auditable trail of every balance-affecting action.
//! It is a stateless service layer over a relational store: every mutating
//! operation runs inside one atomic database transaction, and dispute
//! resolutions compose the ledger's release/refund primitives inside their
//! own scope.

pub use accounts::{AccountStatus, EscrowAccount};
pub use commands::{
    AccountPatch, AppendEventCmd, CasePatch, InitiateCmd, OpenDisputeCmd, ResolutionCmd,
    TransactionResolution, UpdateCaseCmd,
};
pub use currency::Currency;
pub use disputes::{
    DUE_SOON_WINDOW_HOURS, DisputeCase, DisputeReason, DisputeStage, DisputeStatus, Priority,
};
pub use error::EngineError;
pub use events::{ActionType, ActorType, DisputeEvent, EvidenceRef};
pub use evidence::{EvidenceStore, EvidenceUpload, StoredEvidence};
pub use money::Amount;
pub use ops::{CaseListFilter, CaseSummary, Engine, EngineBuilder, TransactionListFilter};
pub use transactions::{
    AuditEntry, AuditTrail, EscrowTransaction, TransactionKind, TransactionStatus,
};

mod accounts;
mod commands;
mod currency;
mod disputes;
mod error;
mod events;
mod evidence;
mod money;
mod ops;
mod transactions;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
