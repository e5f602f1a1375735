use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::{
    Actor, EngineError, ExpectedExpense, ExpenseStatus, NewExpectedExpenseCmd, PostCmd,
    ResultEngine, Transaction, TransactionKind, expected_expenses,
    util::{normalize_required_name, require_positive},
};

use super::{Engine, with_tx, with_write_tx};

impl Engine {
    /// Guardians may act on every expense of the family, others on their own.
    async fn require_expected_expense(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        expense_id: Uuid,
    ) -> ResultEngine<ExpectedExpense> {
        let expense: ExpectedExpense = expected_expenses::Entity::find_by_id(expense_id)
            .filter(expected_expenses::Column::FamilyId.eq(actor.family_id))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("expected expense {expense_id}")))?
            .try_into()?;
        if expense.owner_id != actor.user_id && !actor.role.is_guardian() {
            return Err(EngineError::NotFound(format!(
                "expected expense {expense_id}"
            )));
        }
        Ok(expense)
    }

    pub async fn create_expected_expense(
        &self,
        cmd: NewExpectedExpenseCmd,
    ) -> ResultEngine<ExpectedExpense> {
        let NewExpectedExpenseCmd {
            actor,
            description,
            estimated_amount_minor,
            due_date,
            priority,
            category_id,
            account_id,
        } = cmd;
        require_positive(estimated_amount_minor)?;
        let expense = ExpectedExpense {
            id: Uuid::new_v4(),
            family_id: actor.family_id,
            owner_id: actor.user_id,
            description: normalize_required_name(&description, "expected expense")?,
            estimated_amount_minor,
            actual_amount_minor: None,
            due_date,
            status: ExpenseStatus::Planned,
            priority,
            category_id,
            account_id,
            transaction_id: None,
        };
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, &actor).await?;
            if let Some(account_id) = expense.account_id {
                snapshot.require_visible(&actor, account_id)?;
            }
            if let Some(category_id) = expense.category_id {
                self.require_category(&db_tx, actor.family_id, category_id)
                    .await?;
            }
            expected_expenses::ActiveModel::from(&expense)
                .insert(&db_tx)
                .await?;
            Ok(expense)
        })
    }

    /// Ordered by due date. `status` narrows the list when given.
    pub async fn list_expected_expenses(
        &self,
        actor: &Actor,
        status: Option<ExpenseStatus>,
    ) -> ResultEngine<Vec<ExpectedExpense>> {
        with_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            let mut query = expected_expenses::Entity::find()
                .filter(expected_expenses::Column::FamilyId.eq(actor.family_id));
            if !actor.role.is_guardian() {
                query = query.filter(expected_expenses::Column::OwnerId.eq(actor.user_id));
            }
            if let Some(status) = status {
                query = query.filter(expected_expenses::Column::Status.eq(status.as_str()));
            }
            query
                .order_by_asc(expected_expenses::Column::DueDate)
                .order_by_asc(expected_expenses::Column::Description)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(ExpectedExpense::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    pub async fn cancel_expected_expense(
        &self,
        actor: &Actor,
        expense_id: Uuid,
    ) -> ResultEngine<ExpectedExpense> {
        with_write_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            let mut expense = self
                .require_expected_expense(&db_tx, actor, expense_id)
                .await?;
            if !expense.is_planned() {
                return Err(EngineError::InvalidState(format!(
                    "expected expense {expense_id} is {}",
                    expense.status.as_str()
                )));
            }
            expense.status = ExpenseStatus::Cancelled;
            expected_expenses::ActiveModel {
                id: ActiveValue::Set(expense.id),
                status: ActiveValue::Set(expense.status.as_str().to_string()),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            Ok(expense)
        })
    }

    /// Removes the plan. A posting created on completion is kept.
    pub async fn delete_expected_expense(
        &self,
        actor: &Actor,
        expense_id: Uuid,
    ) -> ResultEngine<()> {
        with_write_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            let expense = self
                .require_expected_expense(&db_tx, actor, expense_id)
                .await?;
            expected_expenses::Entity::delete_by_id(expense.id)
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }

    /// Posts the actual expense on `account_id` and marks the plan completed,
    /// in one transaction. The posting follows the same rules as `post`.
    pub async fn complete_expected_expense(
        &self,
        actor: &Actor,
        expense_id: Uuid,
        actual_amount_minor: i64,
        account_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> ResultEngine<(ExpectedExpense, Transaction)> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let mut expense = self
                .require_expected_expense(&db_tx, actor, expense_id)
                .await?;
            if !expense.is_planned() {
                return Err(EngineError::InvalidState(format!(
                    "expected expense {expense_id} is {}",
                    expense.status.as_str()
                )));
            }

            let mut cmd = PostCmd::new(
                *actor,
                account_id,
                TransactionKind::Expense,
                actual_amount_minor,
                occurred_at,
            )
            .description(expense.description.clone());
            cmd.category_id = expense.category_id;
            let posting = self.post_in_tx(&db_tx, &snapshot, cmd).await?;

            expense.status = ExpenseStatus::Completed;
            expense.actual_amount_minor = Some(actual_amount_minor);
            expense.account_id = Some(account_id);
            expense.transaction_id = Some(posting.id);
            expected_expenses::ActiveModel::from(&expense)
                .update(&db_tx)
                .await?;
            tracing::info!(%expense_id, transaction_id = %posting.id, "expected expense completed");
            Ok((expense, posting))
        })
    }
}

/// Returns plans completed by any of `transaction_ids` to `Planned`.
///
/// Called when those postings are deleted, so a plan never points at a
/// posting that no longer exists.
pub(super) async fn reopen_plans(
    db: &DatabaseTransaction,
    transaction_ids: Vec<Uuid>,
) -> ResultEngine<u64> {
    if transaction_ids.is_empty() {
        return Ok(0);
    }
    let reopened = expected_expenses::Entity::update_many()
        .col_expr(
            expected_expenses::Column::Status,
            Expr::value(ExpenseStatus::Planned.as_str()),
        )
        .col_expr(
            expected_expenses::Column::ActualAmountMinor,
            Expr::value(Option::<i64>::None),
        )
        .col_expr(
            expected_expenses::Column::TransactionId,
            Expr::value(Option::<Uuid>::None),
        )
        .filter(expected_expenses::Column::TransactionId.is_in(transaction_ids))
        .exec(db)
        .await?
        .rows_affected;
    if reopened > 0 {
        tracing::info!(reopened, "expected expenses reopened after posting removal");
    }
    Ok(reopened)
}
