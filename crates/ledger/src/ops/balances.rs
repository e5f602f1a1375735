use std::collections::HashMap;

use sea_orm::{DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    Actor, EngineError, Permission, ResultEngine, Transaction, accounts, transactions,
};

use super::{Engine, access::require_permission, with_tx, with_write_tx};

/// An account whose stored balance differs from the sum of its postings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub account_id: Uuid,
    pub stored_minor: i64,
    pub computed_minor: i64,
}

/// Adds `delta` to the stored balance in a single `UPDATE`.
pub(super) async fn apply_delta(
    db: &DatabaseTransaction,
    account_id: Uuid,
    delta: i64,
) -> ResultEngine<()> {
    if delta == 0 {
        return Ok(());
    }
    let result = accounts::Entity::update_many()
        .col_expr(
            accounts::Column::BalanceMinor,
            Expr::col(accounts::Column::BalanceMinor).add(delta),
        )
        .filter(accounts::Column::Id.eq(account_id))
        .exec(db)
        .await?;
    if result.rows_affected != 1 {
        return Err(EngineError::NotFound(format!("account {account_id}")));
    }
    Ok(())
}

/// Subtracts `amount_minor` only if the stored balance covers it.
pub(super) async fn debit_covered(
    db: &DatabaseTransaction,
    account_id: Uuid,
    amount_minor: i64,
) -> ResultEngine<()> {
    let result = accounts::Entity::update_many()
        .col_expr(
            accounts::Column::BalanceMinor,
            Expr::col(accounts::Column::BalanceMinor).sub(amount_minor),
        )
        .filter(accounts::Column::Id.eq(account_id))
        .filter(accounts::Column::BalanceMinor.gte(amount_minor))
        .exec(db)
        .await?;
    if result.rows_affected == 1 {
        return Ok(());
    }
    let exists = accounts::Entity::find_by_id(account_id).one(db).await?;
    match exists {
        Some(account) => Err(EngineError::InsufficientFunds(format!(
            "account '{}' holds {}, needs {amount_minor}",
            account.name, account.balance_minor
        ))),
        None => Err(EngineError::NotFound(format!("account {account_id}"))),
    }
}

async fn computed_balances(
    db: &DatabaseTransaction,
    family_id: Uuid,
) -> ResultEngine<(Vec<accounts::Model>, HashMap<Uuid, i64>)> {
    let family_accounts = accounts::Entity::find()
        .filter(accounts::Column::FamilyId.eq(family_id))
        .all(db)
        .await?;
    let ids: Vec<Uuid> = family_accounts.iter().map(|a| a.id).collect();
    let mut sums: HashMap<Uuid, i64> = ids.iter().map(|id| (*id, 0)).collect();
    for model in transactions::Entity::find()
        .filter(transactions::Column::AccountId.is_in(ids))
        .all(db)
        .await?
    {
        let posting = Transaction::try_from(model)?;
        *sums.entry(posting.account_id).or_default() += posting.signed_amount();
    }
    Ok((family_accounts, sums))
}

fn drifts(
    family_accounts: &[accounts::Model],
    sums: &HashMap<Uuid, i64>,
) -> Vec<BalanceDrift> {
    family_accounts
        .iter()
        .filter_map(|account| {
            let computed_minor = sums.get(&account.id).copied().unwrap_or_default();
            (computed_minor != account.balance_minor).then(|| BalanceDrift {
                account_id: account.id,
                stored_minor: account.balance_minor,
                computed_minor,
            })
        })
        .collect()
}

impl Engine {
    /// Compares every stored balance of the family with the signed sum of
    /// its postings. An empty result means the ledger is consistent.
    pub async fn audit_balances(&self, actor: &Actor) -> ResultEngine<Vec<BalanceDrift>> {
        with_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            require_permission(actor, Permission::SeeAllAccounts)?;
            let (family_accounts, sums) = computed_balances(&db_tx, actor.family_id).await?;
            Ok(drifts(&family_accounts, &sums))
        })
    }

    /// Rewrites drifted balances from the postings and returns what changed.
    pub async fn recompute_balances(&self, actor: &Actor) -> ResultEngine<Vec<BalanceDrift>> {
        with_write_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            require_permission(actor, Permission::SeeAllAccounts)?;
            let (family_accounts, sums) = computed_balances(&db_tx, actor.family_id).await?;
            let changed = drifts(&family_accounts, &sums);
            for drift in &changed {
                accounts::Entity::update_many()
                    .col_expr(
                        accounts::Column::BalanceMinor,
                        Expr::value(drift.computed_minor),
                    )
                    .filter(accounts::Column::Id.eq(drift.account_id))
                    .exec(&db_tx)
                    .await?;
                tracing::warn!(
                    account_id = %drift.account_id,
                    stored = drift.stored_minor,
                    computed = drift.computed_minor,
                    "balance rewritten from postings"
                );
            }
            Ok(changed)
        })
    }
}
