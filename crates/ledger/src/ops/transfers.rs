use sea_orm::{DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Account, Actor, EngineError, FamilySnapshot, Permission, ResultEngine, Transaction, TransactionKind,
    TransferCmd, transactions,
    util::{normalize_optional_text, require_positive},
};

use super::{
    Engine,
    balances::{apply_delta, debit_covered},
    with_tx, with_write_tx,
};

fn leg_description(arrow: &str, counterpart: &str, description: Option<&str>) -> String {
    match description {
        Some(description) => format!("Transfer {arrow} {counterpart}: {description}"),
        None => format!("Transfer {arrow} {counterpart}"),
    }
}

/// Who may move money between two accounts: both must be visible and
/// active, and the actor must own the source unless they are a guardian.
pub(super) fn require_transfer_rights<'a>(
    snapshot: &'a FamilySnapshot,
    actor: &Actor,
    from_account_id: Uuid,
    to_account_id: Uuid,
    amount_minor: i64,
) -> ResultEngine<(&'a Account, &'a Account)> {
    if from_account_id == to_account_id {
        return Err(EngineError::InvalidState(
            "from_account_id and to_account_id must differ".to_string(),
        ));
    }
    require_positive(amount_minor)?;
    let from = snapshot.require_visible(actor, from_account_id)?;
    let to = snapshot.require_visible(actor, to_account_id)?;
    if !from.is_owned_by(actor.user_id) && !actor.role.allows(Permission::TransferFromAnyAccount)
    {
        return Err(EngineError::PermissionDenied(format!(
            "{} may only transfer from accounts they own",
            actor.role.as_str()
        )));
    }
    from.require_active()?;
    to.require_active()?;
    Ok((from, to))
}

impl Engine {
    /// Validates and writes both legs of a transfer inside `db`.
    pub(super) async fn transfer_in_tx(
        &self,
        db: &DatabaseTransaction,
        snapshot: &FamilySnapshot,
        cmd: TransferCmd,
    ) -> ResultEngine<Uuid> {
        let TransferCmd {
            actor,
            from_account_id,
            to_account_id,
            amount_minor,
            description,
            category_id,
            occurred_at,
        } = cmd;
        let (from, to) = require_transfer_rights(
            snapshot,
            &actor,
            from_account_id,
            to_account_id,
            amount_minor,
        )?;
        if let Some(category_id) = category_id {
            self.require_category(db, actor.family_id, category_id)
                .await?;
        }

        let is_family_expense = snapshot.owner_role(from).is_some_and(|r| r.is_guardian())
            && snapshot.owner_role(to).is_some_and(|r| r.is_dependent());
        let description = normalize_optional_text(description.as_deref());
        let transfer_id = Uuid::new_v4();

        let mut outgoing = Transaction::new(
            from.id,
            TransactionKind::Expense,
            amount_minor,
            actor.user_id,
            occurred_at,
        )?;
        outgoing.description = Some(leg_description("->", &to.name, description.as_deref()));
        outgoing.category_id = category_id;
        outgoing.transfer_id = Some(transfer_id);
        outgoing.is_family_expense = is_family_expense;

        let mut incoming = Transaction::new(
            to.id,
            TransactionKind::Income,
            amount_minor,
            actor.user_id,
            occurred_at,
        )?;
        incoming.description = Some(leg_description("<-", &from.name, description.as_deref()));
        incoming.category_id = category_id;
        incoming.transfer_id = Some(transfer_id);

        debit_covered(db, from.id, amount_minor).await?;
        apply_delta(db, to.id, amount_minor).await?;
        transactions::ActiveModel::from(&outgoing).insert(db).await?;
        transactions::ActiveModel::from(&incoming).insert(db).await?;
        Ok(transfer_id)
    }

    /// Moves money between two accounts as one expense and one income
    /// posting sharing a transfer id. Both legs commit together or not at all.
    ///
    /// A transfer from a guardian's account to a child's or teen's account
    /// marks the expense leg as a family expense.
    pub async fn transfer(&self, cmd: TransferCmd) -> ResultEngine<Uuid> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, &cmd.actor).await?;
            self.transfer_in_tx(&db_tx, &snapshot, cmd).await
        })
    }

    /// Both legs of a transfer visible to `actor`, expense leg first.
    pub async fn transfer_legs(
        &self,
        actor: &Actor,
        transfer_id: Uuid,
    ) -> ResultEngine<Vec<Transaction>> {
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let mut legs = transactions::Entity::find()
                .filter(transactions::Column::TransferId.eq(transfer_id))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;
            legs.retain(|leg| {
                snapshot
                    .accounts
                    .get(&leg.account_id)
                    .is_some_and(|account| snapshot.is_visible(actor, account))
            });
            if legs.is_empty() {
                return Err(EngineError::NotFound(format!("transfer {transfer_id}")));
            }
            legs.sort_by_key(|leg| leg.kind != TransactionKind::Expense);
            Ok(legs)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use migration::MigratorTrait;
    use sea_orm::Database;

    use super::*;
    use crate::{AccountKind, NewAccountCmd, PostCmd, Role, accounts};

    async fn engine() -> Engine {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        Engine::builder().database(db).build().await.unwrap()
    }

    #[tokio::test]
    async fn credit_failure_rolls_back_the_whole_transfer() {
        let engine = engine().await;
        let family = engine.create_family("Rivera").await.unwrap();
        let head = engine
            .create_user(family.id, "ana", "Ana", Role::HeadOfFamily)
            .await
            .unwrap()
            .actor();
        let source = engine
            .list_accounts(&head, Some(AccountKind::Personal), false)
            .await
            .unwrap()[0]
            .id;
        engine
            .post(PostCmd::new(
                head,
                source,
                TransactionKind::Income,
                1_000,
                Utc::now(),
            ))
            .await
            .unwrap();
        let goal = engine
            .create_account(NewAccountCmd::new(head, "Holiday", AccountKind::Goal))
            .await
            .unwrap()
            .id;

        // The snapshot still lists the goal, but its row is gone by the time
        // the credit runs, so the transfer fails after the debit.
        let outcome: ResultEngine<Uuid> = async {
            let db_tx = engine.database.begin().await?;
            let snapshot = engine.snapshot_for(&db_tx, &head).await?;
            accounts::Entity::delete_by_id(goal).exec(&db_tx).await?;
            let transfer_id = engine
                .transfer_in_tx(
                    &db_tx,
                    &snapshot,
                    TransferCmd::new(head, source, goal, 300, Utc::now()),
                )
                .await?;
            db_tx.commit().await?;
            Ok(transfer_id)
        }
        .await;
        assert!(matches!(outcome, Err(EngineError::NotFound(_))));

        assert_eq!(engine.account(&head, source).await.unwrap().balance_minor, 1_000);
        assert_eq!(engine.account(&head, goal).await.unwrap().balance_minor, 0);
        let postings = engine
            .list_postings(&head, &Default::default())
            .await
            .unwrap();
        assert_eq!(postings.len(), 1);
        assert!(postings.iter().all(|posting| posting.transfer_id.is_none()));
        assert!(engine.audit_balances(&head).await.unwrap().is_empty());
    }

    #[test]
    fn leg_descriptions_name_the_counterpart() {
        assert_eq!(
            leg_description("->", "Savings", Some("rent share")),
            "Transfer -> Savings: rent share"
        );
        assert_eq!(leg_description("<-", "Ana's account", None), "Transfer <- Ana's account");
    }
}
