//! Initial schema migration - creates all tables from scratch.
//!
//! Complete schema for the escrow ledger and dispute engine:
//!
//! - `escrow_accounts`: one per `(user_id, provider)`, with denormalized
//!   gross/net balance totals
//! - `escrow_transactions`: funds held against an account, with an embedded
//!   JSON audit trail
//! - `dispute_cases`: contested transactions with stage/status/priority
//! - `dispute_events`: append-only journal per case

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum EscrowAccounts {
    Table,
    Id,
    UserId,
    Provider,
    Status,
    Currency,
    CurrentBalanceMinor,
    PendingReleaseMinor,
    LastReconciledAt,
    Metadata,
    CreatedAt,
}

#[derive(Iden)]
enum EscrowTransactions {
    Table,
    Id,
    AccountId,
    Reference,
    Kind,
    Status,
    Currency,
    AmountMinor,
    FeeMinor,
    NetMinor,
    InitiatedBy,
    CounterpartyId,
    ScheduledReleaseAt,
    ReleasedAt,
    RefundedAt,
    CancelledAt,
    AuditTrail,
    Metadata,
    CreatedAt,
}

#[derive(Iden)]
enum DisputeCases {
    Table,
    Id,
    EscrowTransactionId,
    Stage,
    Status,
    Priority,
    ReasonCode,
    Summary,
    OpenedBy,
    AssignedTo,
    CustomerDeadlineAt,
    ProviderDeadlineAt,
    OpenedAt,
    ResolvedAt,
    ResolutionNotes,
    Metadata,
}

#[derive(Iden)]
enum DisputeEvents {
    Table,
    Id,
    DisputeCaseId,
    ActorId,
    ActorType,
    ActionType,
    Notes,
    Evidence,
    Metadata,
    EventAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Escrow accounts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(EscrowAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EscrowAccounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EscrowAccounts::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EscrowAccounts::Provider).string().not_null())
                    .col(ColumnDef::new(EscrowAccounts::Status).string().not_null())
                    .col(ColumnDef::new(EscrowAccounts::Currency).string().not_null())
                    .col(
                        ColumnDef::new(EscrowAccounts::CurrentBalanceMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EscrowAccounts::PendingReleaseMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EscrowAccounts::LastReconciledAt).timestamp())
                    .col(ColumnDef::new(EscrowAccounts::Metadata).json())
                    .col(
                        ColumnDef::new(EscrowAccounts::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-escrow_accounts-user_id-provider-unique")
                    .table(EscrowAccounts::Table)
                    .col(EscrowAccounts::UserId)
                    .col(EscrowAccounts::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Escrow transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(EscrowTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EscrowTransactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EscrowTransactions::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EscrowTransactions::Reference)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EscrowTransactions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(EscrowTransactions::Status)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EscrowTransactions::Currency)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EscrowTransactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EscrowTransactions::FeeMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EscrowTransactions::NetMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EscrowTransactions::InitiatedBy)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EscrowTransactions::CounterpartyId).big_integer())
                    .col(
                        ColumnDef::new(EscrowTransactions::ScheduledReleaseAt)
                            .timestamp(),
                    )
                    .col(ColumnDef::new(EscrowTransactions::ReleasedAt).timestamp())
                    .col(ColumnDef::new(EscrowTransactions::RefundedAt).timestamp())
                    .col(ColumnDef::new(EscrowTransactions::CancelledAt).timestamp())
                    .col(ColumnDef::new(EscrowTransactions::AuditTrail).json())
                    .col(ColumnDef::new(EscrowTransactions::Metadata).json())
                    .col(
                        ColumnDef::new(EscrowTransactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-escrow_transactions-account_id")
                            .from(EscrowTransactions::Table, EscrowTransactions::AccountId)
                            .to(EscrowAccounts::Table, EscrowAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-escrow_transactions-reference-unique")
                    .table(EscrowTransactions::Table)
                    .col(EscrowTransactions::Reference)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-escrow_transactions-account_id-created_at")
                    .table(EscrowTransactions::Table)
                    .col(EscrowTransactions::AccountId)
                    .col(EscrowTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-escrow_transactions-status")
                    .table(EscrowTransactions::Table)
                    .col(EscrowTransactions::Status)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Dispute cases
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(DisputeCases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DisputeCases::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DisputeCases::EscrowTransactionId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DisputeCases::Stage).string().not_null())
                    .col(ColumnDef::new(DisputeCases::Status).string().not_null())
                    .col(ColumnDef::new(DisputeCases::Priority).string().not_null())
                    .col(ColumnDef::new(DisputeCases::ReasonCode).string().not_null())
                    .col(ColumnDef::new(DisputeCases::Summary).string().not_null())
                    .col(ColumnDef::new(DisputeCases::OpenedBy).big_integer().not_null())
                    .col(ColumnDef::new(DisputeCases::AssignedTo).big_integer())
                    .col(ColumnDef::new(DisputeCases::CustomerDeadlineAt).timestamp())
                    .col(ColumnDef::new(DisputeCases::ProviderDeadlineAt).timestamp())
                    .col(
                        ColumnDef::new(DisputeCases::OpenedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DisputeCases::ResolvedAt).timestamp())
                    .col(ColumnDef::new(DisputeCases::ResolutionNotes).string())
                    .col(ColumnDef::new(DisputeCases::Metadata).json())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-dispute_cases-escrow_transaction_id")
                            .from(DisputeCases::Table, DisputeCases::EscrowTransactionId)
                            .to(EscrowTransactions::Table, EscrowTransactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-dispute_cases-escrow_transaction_id")
                    .table(DisputeCases::Table)
                    .col(DisputeCases::EscrowTransactionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-dispute_cases-status")
                    .table(DisputeCases::Table)
                    .col(DisputeCases::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-dispute_cases-opened_at")
                    .table(DisputeCases::Table)
                    .col(DisputeCases::OpenedAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Dispute events
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(DisputeEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DisputeEvents::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DisputeEvents::DisputeCaseId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DisputeEvents::ActorId).big_integer().not_null())
                    .col(ColumnDef::new(DisputeEvents::ActorType).string().not_null())
                    .col(ColumnDef::new(DisputeEvents::ActionType).string().not_null())
                    .col(ColumnDef::new(DisputeEvents::Notes).string())
                    .col(ColumnDef::new(DisputeEvents::Evidence).json())
                    .col(ColumnDef::new(DisputeEvents::Metadata).json())
                    .col(
                        ColumnDef::new(DisputeEvents::EventAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-dispute_events-dispute_case_id")
                            .from(DisputeEvents::Table, DisputeEvents::DisputeCaseId)
                            .to(DisputeCases::Table, DisputeCases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-dispute_events-dispute_case_id-event_at")
                    .table(DisputeEvents::Table)
                    .col(DisputeEvents::DisputeCaseId)
                    .col(DisputeEvents::EventAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(DisputeEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DisputeCases::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EscrowTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EscrowAccounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
