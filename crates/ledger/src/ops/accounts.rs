use std::collections::BTreeSet;

use chrono::NaiveDate;
use sea_orm::{
    ActiveValue, Condition, PaginatorTrait, QueryFilter, TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::{
    Account, AccountKind, AccountStatus, Actor, EngineError, GoalProgress, NewAccountCmd,
    Permission, ResultEngine, account_visibility, accounts, analytics, expected_expenses,
    recurring_rules, transactions, util::normalize_required_name,
};

use super::{
    Engine,
    access::{require_member, require_permission},
    expected_expenses::reopen_plans,
    families::insert_edge,
    with_tx, with_write_tx,
};

impl Engine {
    /// Creates an account.
    ///
    /// Common, Emergency and Personal accounts need a guardian. Any member may
    /// open a Goal account for themselves; only guardians may name another
    /// owner. The creator, the owner and every `shared_with` member get a
    /// visibility edge; a dependent's Personal account is also shared with
    /// every guardian.
    pub async fn create_account(&self, cmd: NewAccountCmd) -> ResultEngine<Account> {
        let NewAccountCmd {
            actor,
            name,
            kind,
            owner_id,
            goal_amount_minor,
            goal_date,
            shared_with,
        } = cmd;
        let name = normalize_required_name(&name, "account")?;
        if goal_amount_minor.is_some_and(|goal| goal <= 0) {
            return Err(EngineError::InvalidState(
                "goal_amount_minor must be > 0".to_string(),
            ));
        }
        if kind != AccountKind::Goal && (goal_amount_minor.is_some() || goal_date.is_some()) {
            return Err(EngineError::InvalidState(
                "only goal accounts carry a goal".to_string(),
            ));
        }

        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, &actor).await?;
            if kind != AccountKind::Goal {
                require_permission(&actor, Permission::ManageAccounts)?;
            }

            let owner_id = match kind {
                AccountKind::Common if owner_id.is_some() => {
                    return Err(EngineError::InvalidState(
                        "common accounts have no owner".to_string(),
                    ));
                }
                AccountKind::Common => None,
                AccountKind::Emergency => owner_id,
                AccountKind::Personal | AccountKind::Goal => Some(owner_id.unwrap_or(actor.user_id)),
            };
            if let Some(owner) = owner_id {
                require_member(&snapshot, owner)?;
                if owner != actor.user_id {
                    require_permission(&actor, Permission::ManageAccounts)?;
                }
                if kind == AccountKind::Personal && snapshot.personal_account_of(owner).is_some() {
                    return Err(EngineError::InvalidState(format!(
                        "user {owner} already has a personal account"
                    )));
                }
            }
            for user_id in &shared_with {
                require_member(&snapshot, *user_id)?;
            }

            let mut account = Account::new(actor.family_id, name, kind, owner_id);
            account.goal_amount_minor = goal_amount_minor;
            account.goal_date = goal_date;
            accounts::ActiveModel::from(&account).insert(&db_tx).await?;

            let mut audience: BTreeSet<Uuid> = shared_with.into_iter().collect();
            audience.insert(actor.user_id);
            audience.extend(owner_id);
            let owner_is_dependent = owner_id
                .and_then(|owner| snapshot.role_of(owner))
                .is_some_and(|role| role.is_dependent());
            if kind == AccountKind::Personal && owner_is_dependent {
                audience.extend(snapshot.guardian_ids());
            }
            for user_id in audience {
                insert_edge(&db_tx, user_id, account.id).await?;
            }
            tracing::info!(account_id = %account.id, kind = kind.as_str(), "account created");
            Ok(account)
        })
    }

    /// Accounts visible to `actor`, optionally of one kind. Common accounts
    /// report the derived family balance.
    pub async fn list_accounts(
        &self,
        actor: &Actor,
        kind: Option<AccountKind>,
        include_archived: bool,
    ) -> ResultEngine<Vec<Account>> {
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            Ok(snapshot
                .accounts_for(actor)
                .into_iter()
                .filter(|account| kind.is_none_or(|kind| account.kind == kind))
                .filter(|account| include_archived || !account.is_archived())
                .collect())
        })
    }

    pub async fn account(&self, actor: &Actor, account_id: Uuid) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let account = snapshot.require_visible(actor, account_id)?;
            Ok(snapshot.present(account))
        })
    }

    pub async fn set_account_archived(
        &self,
        actor: &Actor,
        account_id: Uuid,
        archived: bool,
    ) -> ResultEngine<Account> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let mut account = snapshot.require_visible(actor, account_id)?.clone();
            require_permission(actor, Permission::ManageAccounts)?;
            account.status = if archived {
                AccountStatus::Archived
            } else {
                AccountStatus::Active
            };
            accounts::ActiveModel {
                id: ActiveValue::Set(account.id),
                status: ActiveValue::Set(account.status.as_str().to_string()),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            Ok(snapshot.present(&account))
        })
    }

    /// Deletes an account.
    ///
    /// A non-zero balance always blocks deletion. Referencing rules, postings
    /// and planned expenses block it unless `force` is set, in which case
    /// rules and postings are deleted and planned expenses unlinked first.
    /// Plans completed by a deleted posting go back to `Planned`.
    pub async fn delete_account(
        &self,
        actor: &Actor,
        account_id: Uuid,
        force: bool,
    ) -> ResultEngine<()> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let account = snapshot.require_visible(actor, account_id)?;
            let own_goal = account.kind == AccountKind::Goal && account.is_owned_by(actor.user_id);
            if !own_goal {
                require_permission(actor, Permission::ManageAccounts)?;
            }
            if account.balance_minor != 0 {
                return Err(EngineError::InvalidState(format!(
                    "account '{}' has a non-zero balance",
                    account.name
                )));
            }

            let rule_filter = Condition::any()
                .add(recurring_rules::Column::FromAccountId.eq(account_id))
                .add(recurring_rules::Column::ToAccountId.eq(account_id));
            let rules = recurring_rules::Entity::find()
                .filter(rule_filter.clone())
                .count(&db_tx)
                .await?;
            let postings = transactions::Entity::find()
                .filter(transactions::Column::AccountId.eq(account_id))
                .count(&db_tx)
                .await?;
            let planned = expected_expenses::Entity::find()
                .filter(expected_expenses::Column::AccountId.eq(account_id))
                .count(&db_tx)
                .await?;

            if rules + postings + planned > 0 {
                if !force {
                    return Err(EngineError::DependencyConflict(format!(
                        "account '{}' is referenced by {rules} rule(s), {postings} posting(s) \
                         and {planned} planned expense(s)",
                        account.name
                    )));
                }
                recurring_rules::Entity::delete_many()
                    .filter(rule_filter)
                    .exec(&db_tx)
                    .await?;
                // Surviving legs of transfers touching this account become
                // plain postings.
                let transfer_ids: Vec<Uuid> = transactions::Entity::find()
                    .filter(transactions::Column::AccountId.eq(account_id))
                    .filter(transactions::Column::TransferId.is_not_null())
                    .all(&db_tx)
                    .await?
                    .into_iter()
                    .filter_map(|model| model.transfer_id)
                    .collect();
                transactions::Entity::update_many()
                    .col_expr(
                        transactions::Column::TransferId,
                        Expr::value(Option::<Uuid>::None),
                    )
                    .filter(transactions::Column::TransferId.is_in(transfer_ids))
                    .filter(transactions::Column::AccountId.ne(account_id))
                    .exec(&db_tx)
                    .await?;
                let removed: Vec<Uuid> = transactions::Entity::find()
                    .filter(transactions::Column::AccountId.eq(account_id))
                    .all(&db_tx)
                    .await?
                    .into_iter()
                    .map(|model| model.id)
                    .collect();
                reopen_plans(&db_tx, removed).await?;
                transactions::Entity::delete_many()
                    .filter(transactions::Column::AccountId.eq(account_id))
                    .exec(&db_tx)
                    .await?;
                expected_expenses::Entity::update_many()
                    .col_expr(
                        expected_expenses::Column::AccountId,
                        Expr::value(Option::<Uuid>::None),
                    )
                    .filter(expected_expenses::Column::AccountId.eq(account_id))
                    .exec(&db_tx)
                    .await?;
            }

            account_visibility::Entity::delete_many()
                .filter(account_visibility::Column::AccountId.eq(account_id))
                .exec(&db_tx)
                .await?;
            accounts::Entity::delete_by_id(account_id)
                .exec(&db_tx)
                .await?;
            tracing::info!(%account_id, force, "account deleted");
            Ok(())
        })
    }

    /// Progress of every visible, active Goal account as of `today`.
    pub async fn goal_progress(
        &self,
        actor: &Actor,
        today: NaiveDate,
    ) -> ResultEngine<Vec<GoalProgress>> {
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            Ok(snapshot
                .accounts_for(actor)
                .iter()
                .filter(|account| account.kind == AccountKind::Goal && !account.is_archived())
                .map(|account| analytics::goal_progress(account, today))
                .collect())
        })
    }
}
