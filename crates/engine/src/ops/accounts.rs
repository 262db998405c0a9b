use chrono::Utc;
use uuid::Uuid;

use sea_orm::{DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};

use crate::{
    AccountPatch, AccountStatus, Amount, Currency, EngineError, EscrowAccount, ResultEngine,
    accounts,
    util::{normalize_required_text, validate_actor_id},
};

use super::{Engine, with_tx};

impl Engine {
    /// Find or create the escrow account for `(user_id, provider)`.
    ///
    /// A fresh account starts `pending` with zero balances and carries the
    /// supplied `metadata`; it flips to `active` on its first funded
    /// transaction. When the account already exists a differing `currency`
    /// updates the stored code, everything else (metadata included) is left
    /// untouched.
    pub async fn ensure_account(
        &self,
        user_id: i64,
        provider: &str,
        currency: Currency,
        metadata: Option<serde_json::Value>,
    ) -> ResultEngine<EscrowAccount> {
        validate_actor_id(user_id, "user_id")?;
        let provider = normalize_required_text(provider, "provider")?;
        with_tx!(self, |db_tx| {
            let existing = self
                .find_account_for_owner(&db_tx, user_id, &provider)
                .await?;
            match existing {
                Some(mut account) => {
                    if account.currency != currency {
                        account.currency = currency;
                        accounts::ActiveModel::from(&account).update(&db_tx).await?;
                    }
                    Ok(account)
                }
                None => {
                    let account = EscrowAccount::new(
                        user_id,
                        provider.clone(),
                        currency,
                        metadata,
                        Utc::now(),
                    );
                    accounts::ActiveModel::from(&account).insert(&db_tx).await?;
                    Ok(account)
                }
            }
        })
    }

    /// Fetch one account by id.
    pub async fn account(&self, account_id: Uuid) -> ResultEngine<EscrowAccount> {
        with_tx!(self, |db_tx| {
            self.require_account(&db_tx, account_id).await
        })
    }

    /// Fetch the account owned by `(user_id, provider)`, if any.
    pub async fn account_for_owner(
        &self,
        user_id: i64,
        provider: &str,
    ) -> ResultEngine<Option<EscrowAccount>> {
        let provider = normalize_required_text(provider, "provider")?;
        with_tx!(self, |db_tx| {
            self.find_account_for_owner(&db_tx, user_id, &provider).await
        })
    }

    /// Apply a whitelist patch to an account.
    ///
    /// Fields absent from the patch are untouched. A patch that changes
    /// nothing returns the stored account without writing.
    pub async fn update_account(
        &self,
        account_id: Uuid,
        patch: AccountPatch,
    ) -> ResultEngine<EscrowAccount> {
        with_tx!(self, |db_tx| {
            let account = self.require_account(&db_tx, account_id).await?;
            if patch.is_empty() {
                return Ok(account);
            }

            let mut updated = account.clone();
            if let Some(status) = patch.status {
                updated.status = status;
            }
            if let Some(currency) = patch.currency {
                updated.currency = currency;
            }
            if let Some(balance) = patch.current_balance {
                if balance.is_negative() {
                    return Err(EngineError::InvalidAmount(
                        "current_balance must not be negative".to_string(),
                    ));
                }
                updated.current_balance = balance;
            }
            if let Some(pending) = patch.pending_release_total {
                if pending.is_negative() {
                    return Err(EngineError::InvalidAmount(
                        "pending_release_total must not be negative".to_string(),
                    ));
                }
                updated.pending_release_total = pending;
            }
            if let Some(at) = patch.last_reconciled_at {
                updated.last_reconciled_at = Some(at);
            }
            if let Some(metadata) = patch.metadata {
                updated.metadata = Some(metadata);
            }

            if updated == account {
                return Ok(account);
            }
            accounts::ActiveModel::from(&updated).update(&db_tx).await?;
            Ok(updated)
        })
    }

    pub(in crate::ops) async fn require_account(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: Uuid,
    ) -> ResultEngine<EscrowAccount> {
        let model = accounts::Entity::find_by_id(account_id.to_string())
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::NotFound("account".to_string()))?;
        EscrowAccount::try_from(model)
    }

    pub(in crate::ops) async fn find_account_for_owner(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: i64,
        provider: &str,
    ) -> ResultEngine<Option<EscrowAccount>> {
        let model = accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id))
            .filter(accounts::Column::Provider.eq(provider.to_string()))
            .one(db_tx)
            .await?;
        model.map(EscrowAccount::try_from).transpose()
    }

    /// Apply gross/net deltas to an account's denormalized balances and
    /// persist the row. Negative results are floored at zero; a clamp is
    /// logged and counted rather than failing the settlement.
    pub(in crate::ops) async fn apply_balance_delta(
        &self,
        db_tx: &DatabaseTransaction,
        account: &mut EscrowAccount,
        gross_delta: Amount,
        net_delta: Amount,
    ) -> ResultEngine<()> {
        account.current_balance =
            self.shift_balance(account, "current_balance", account.current_balance, gross_delta)?;
        account.pending_release_total = self.shift_balance(
            account,
            "pending_release_total",
            account.pending_release_total,
            net_delta,
        )?;
        accounts::ActiveModel::from(&*account).update(db_tx).await?;
        Ok(())
    }

    fn shift_balance(
        &self,
        account: &EscrowAccount,
        field: &str,
        value: Amount,
        delta: Amount,
    ) -> ResultEngine<Amount> {
        if delta.is_negative() {
            let (next, clamped) = value.sub_clamped(-delta);
            if clamped {
                tracing::warn!(
                    account_id = %account.id,
                    field,
                    balance_minor = value.minor(),
                    delta_minor = delta.minor(),
                    "balance delta clamped at zero; account needs reconciliation"
                );
                self.record_clamp();
            }
            Ok(next)
        } else {
            value.checked_add(delta).ok_or_else(|| {
                EngineError::InvalidAmount(format!("{field} overflow on account {}", account.id))
            })
        }
    }

    pub(in crate::ops) fn activate_if_pending(account: &mut EscrowAccount) {
        if account.status == AccountStatus::Pending {
            account.status = AccountStatus::Active;
        }
    }
}
