use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Actor, AnalyticsScope, Category, CategoryGrouping, CategoryTotal, EngineError,
    ExpectedExpense, ExpenseStatus, Forecast, MonthlyTotals, RecurringRule, ResultEngine,
    Summary, Transaction, analytics, categories, expected_expenses, recurring_rules,
    schedule::{month_start, next_month_start},
    transactions,
};

use super::{Engine, with_tx};

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Postings on `accounts` with `from <= occurred_at < to`.
async fn postings_between(
    db: &DatabaseTransaction,
    accounts: impl IntoIterator<Item = Uuid>,
    from: NaiveDate,
    to: NaiveDate,
) -> ResultEngine<Vec<Transaction>> {
    transactions::Entity::find()
        .filter(transactions::Column::AccountId.is_in(accounts))
        .filter(transactions::Column::OccurredAt.gte(day_start(from)))
        .filter(transactions::Column::OccurredAt.lt(day_start(to)))
        .all(db)
        .await?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
}

impl Engine {
    /// Dashboard totals for the month containing `as_of`.
    pub async fn summary(&self, actor: &Actor, as_of: NaiveDate) -> ResultEngine<Summary> {
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let scope = AnalyticsScope::for_actor(&snapshot, actor);
            let from = month_start(as_of);
            let postings =
                postings_between(&db_tx, scope.accounts, from, next_month_start(from)).await?;
            Ok(analytics::summary(&snapshot, actor, &postings, as_of))
        })
    }

    /// Expense totals per category for `[from, to)`.
    pub async fn category_breakdown(
        &self,
        actor: &Actor,
        from: NaiveDate,
        to: NaiveDate,
        grouping: CategoryGrouping,
    ) -> ResultEngine<Vec<CategoryTotal>> {
        if from >= to {
            return Err(EngineError::InvalidValue(
                "invalid range: from must be < to".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let scope = AnalyticsScope::for_actor(&snapshot, actor);
            let postings = postings_between(&db_tx, scope.accounts.clone(), from, to).await?;
            let categories = categories::Entity::find()
                .filter(categories::Column::FamilyId.eq(actor.family_id))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Category::from)
                .collect::<Vec<_>>();
            Ok(analytics::category_breakdown(
                &postings,
                &scope,
                &categories,
                grouping,
            ))
        })
    }

    /// Income, expense and savings for the `months` months ending with the
    /// one containing `as_of`, oldest first.
    pub async fn monthly_trend(
        &self,
        actor: &Actor,
        months: u32,
        as_of: NaiveDate,
    ) -> ResultEngine<Vec<MonthlyTotals>> {
        if months == 0 {
            return Err(EngineError::InvalidValue("months must be > 0".to_string()));
        }
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let scope = AnalyticsScope::for_actor(&snapshot, actor);
            let window = analytics::trailing_months(as_of, months);
            let (Some(first), Some(last)) = (window.first(), window.last()) else {
                return Ok(Vec::new());
            };
            let postings =
                postings_between(&db_tx, scope.accounts.clone(), *first, next_month_start(*last))
                    .await?;
            Ok(analytics::monthly_trend(&postings, &scope, &window))
        })
    }

    /// Projection for the month after `as_of`.
    pub async fn forecast(&self, actor: &Actor, as_of: NaiveDate) -> ResultEngine<Forecast> {
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let rules = recurring_rules::Entity::find()
                .filter(recurring_rules::Column::FamilyId.eq(actor.family_id))
                .filter(recurring_rules::Column::IsActive.eq(true))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(RecurringRule::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;
            let expected = expected_expenses::Entity::find()
                .filter(expected_expenses::Column::FamilyId.eq(actor.family_id))
                .filter(expected_expenses::Column::Status.eq(ExpenseStatus::Planned.as_str()))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(ExpectedExpense::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;
            Ok(analytics::forecast(
                &snapshot, actor, &rules, &expected, as_of,
            ))
        })
    }
}
