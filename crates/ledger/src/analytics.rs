//! Role-scoped read-models built from accounts, postings and rules.
//!
//! Everything here is pure: the engine loads the family snapshot and the
//! relevant rows inside one transaction and hands them to these functions.
//!
//! Guardians (head of family, parents) get the family view: guardians'
//! personal accounts plus every Common, Goal and Emergency account, with
//! transfer legs ignored unless flagged as family expenses. Children and
//! teens get their own personal account with every posting counted.

use std::collections::{HashMap, HashSet};

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Account, AccountKind, Actor, Category, ExpectedExpense, FamilySnapshot, Permission,
    RecurringRule, RuleKind, Transaction, TransactionKind,
    categories::root_index,
    schedule::{month_start, next_month_start, occurrences_in},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryView {
    Guardian,
    Member,
}

/// Which postings an actor's aggregates are built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyticsScope {
    pub view: SummaryView,
    pub accounts: HashSet<Uuid>,
}

impl AnalyticsScope {
    pub fn for_actor(snapshot: &FamilySnapshot, actor: &Actor) -> Self {
        if actor.role.allows(Permission::FamilyAnalytics) {
            Self {
                view: SummaryView::Guardian,
                accounts: snapshot.guardian_scope(),
            }
        } else {
            Self {
                view: SummaryView::Member,
                accounts: snapshot
                    .personal_account_of(actor.user_id)
                    .map(|account| account.id)
                    .into_iter()
                    .collect(),
            }
        }
    }

    pub fn counts(&self, posting: &Transaction) -> bool {
        if !self.accounts.contains(&posting.account_id) {
            return false;
        }
        match self.view {
            SummaryView::Guardian => posting.counts_for_family(),
            SummaryView::Member => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account_id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    pub balance_minor: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub view: SummaryView,
    pub month: NaiveDate,
    pub total_balance_minor: i64,
    pub monthly_income_minor: i64,
    pub monthly_expense_minor: i64,
    pub monthly_savings_minor: i64,
    /// Non-personal accounts (guardian view only).
    pub other_accounts: Vec<AccountBalance>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub income_minor: i64,
    pub expense_minor: i64,
}

impl Totals {
    pub fn savings_minor(&self) -> i64 {
        self.income_minor - self.expense_minor
    }

    fn add(&mut self, kind: TransactionKind, amount_minor: i64) {
        match kind {
            TransactionKind::Income => self.income_minor += amount_minor,
            TransactionKind::Expense => self.expense_minor += amount_minor,
        }
    }
}

pub fn totals<'a>(
    postings: impl IntoIterator<Item = &'a Transaction>,
    scope: &AnalyticsScope,
) -> Totals {
    let mut out = Totals::default();
    for posting in postings.into_iter().filter(|p| scope.counts(p)) {
        out.add(posting.kind, posting.amount_minor);
    }
    out
}

/// `month_postings` must already be limited to the month containing `as_of`.
pub fn summary(
    snapshot: &FamilySnapshot,
    actor: &Actor,
    month_postings: &[Transaction],
    as_of: NaiveDate,
) -> Summary {
    let scope = AnalyticsScope::for_actor(snapshot, actor);
    let totals = totals(month_postings, &scope);
    let (total_balance_minor, other_accounts) = match scope.view {
        SummaryView::Guardian => {
            let mut others: Vec<AccountBalance> = snapshot
                .accounts
                .values()
                .filter(|account| account.kind != AccountKind::Personal && !account.is_archived())
                .map(|account| {
                    let shown = snapshot.present(account);
                    AccountBalance {
                        account_id: shown.id,
                        name: shown.name,
                        kind: shown.kind,
                        balance_minor: shown.balance_minor,
                    }
                })
                .collect();
            others.sort_by(|a, b| a.name.cmp(&b.name));
            (snapshot.common_balance(), others)
        }
        SummaryView::Member => (
            snapshot
                .personal_account_of(actor.user_id)
                .map_or(0, |account| account.balance_minor),
            Vec::new(),
        ),
    };
    Summary {
        view: scope.view,
        month: month_start(as_of),
        total_balance_minor,
        monthly_income_minor: totals.income_minor,
        monthly_expense_minor: totals.expense_minor,
        monthly_savings_minor: totals.savings_minor(),
        other_accounts,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryGrouping {
    #[default]
    Leaf,
    /// Roll subcategories up into their top-level category.
    Parent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    /// `None` is the uncategorized bucket.
    pub category_id: Option<Uuid>,
    pub name: String,
    pub color: Option<String>,
    pub total_minor: i64,
}

/// Expense totals per category, largest first.
pub fn category_breakdown(
    postings: &[Transaction],
    scope: &AnalyticsScope,
    categories: &[Category],
    grouping: CategoryGrouping,
) -> Vec<CategoryTotal> {
    let roots = root_index(categories);
    let by_id: HashMap<Uuid, &Category> = categories.iter().map(|c| (c.id, c)).collect();

    let mut sums: HashMap<Option<Uuid>, i64> = HashMap::new();
    for posting in postings
        .iter()
        .filter(|p| p.kind == TransactionKind::Expense && scope.counts(p))
    {
        let bucket = posting.category_id.filter(|id| by_id.contains_key(id));
        let bucket = match grouping {
            CategoryGrouping::Leaf => bucket,
            CategoryGrouping::Parent => bucket.map(|id| roots.get(&id).copied().unwrap_or(id)),
        };
        *sums.entry(bucket).or_default() += posting.amount_minor;
    }

    let mut out: Vec<CategoryTotal> = sums
        .into_iter()
        .map(|(category_id, total_minor)| {
            let category = category_id.and_then(|id| by_id.get(&id));
            CategoryTotal {
                category_id,
                name: category.map_or_else(|| "Uncategorized".to_string(), |c| c.name.clone()),
                color: category.and_then(|c| c.color.clone()),
                total_minor,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.total_minor
            .cmp(&a.total_minor)
            .then_with(|| a.name.cmp(&b.name))
    });
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyTotals {
    pub month: NaiveDate,
    pub income_minor: i64,
    pub expense_minor: i64,
    pub savings_minor: i64,
}

/// First days of the `months` months ending with the one containing `as_of`,
/// oldest first.
pub fn trailing_months(as_of: NaiveDate, months: u32) -> Vec<NaiveDate> {
    let current = month_start(as_of);
    (0..months)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .collect()
}

pub fn monthly_trend(
    postings: &[Transaction],
    scope: &AnalyticsScope,
    months: &[NaiveDate],
) -> Vec<MonthlyTotals> {
    let mut buckets: HashMap<NaiveDate, Totals> =
        months.iter().map(|m| (*m, Totals::default())).collect();
    for posting in postings.iter().filter(|p| scope.counts(p)) {
        let month = month_start(posting.occurred_at.date_naive());
        if let Some(bucket) = buckets.get_mut(&month) {
            bucket.add(posting.kind, posting.amount_minor);
        }
    }
    months
        .iter()
        .map(|month| {
            let totals = buckets.get(month).copied().unwrap_or_default();
            MonthlyTotals {
                month: *month,
                income_minor: totals.income_minor,
                expense_minor: totals.expense_minor,
                savings_minor: totals.savings_minor(),
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub income_minor: i64,
    pub expense_minor: i64,
    pub balance_minor: i64,
}

impl Projection {
    fn income(&mut self, amount_minor: i64) {
        self.income_minor += amount_minor;
        self.balance_minor += amount_minor;
    }

    fn expense(&mut self, amount_minor: i64) {
        self.expense_minor += amount_minor;
        self.balance_minor -= amount_minor;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Forecast {
    /// First day of the projected month.
    pub month: NaiveDate,
    pub personal: Projection,
    /// Only computed for guardians.
    pub family: Option<Projection>,
}

/// Projects the month after `as_of` from active rules and planned expenses.
pub fn forecast(
    snapshot: &FamilySnapshot,
    actor: &Actor,
    rules: &[RecurringRule],
    expected: &[ExpectedExpense],
    as_of: NaiveDate,
) -> Forecast {
    let from = next_month_start(as_of);
    let to = next_month_start(from);
    let occurrences = |rule: &RecurringRule| {
        occurrences_in(
            rule.frequency,
            rule.next_run_date,
            rule.anchor_day(),
            rule.end_date,
            from,
            to,
        )
        .len() as i64
    };
    let planned_in_month = |expense: &&ExpectedExpense| {
        expense.is_planned() && expense.due_date >= from && expense.due_date < to
    };

    let personal_account = snapshot.personal_account_of(actor.user_id).map(|a| a.id);
    let mut personal = Projection::default();
    for rule in rules
        .iter()
        .filter(|r| r.is_active && r.owner_id == actor.user_id)
    {
        let amount = rule.amount_minor * occurrences(rule);
        if amount == 0 || personal_account.is_none() {
            continue;
        }
        if rule.to_account_id == personal_account
            && matches!(rule.kind, RuleKind::Income | RuleKind::Transfer)
        {
            personal.income(amount);
        }
        if rule.from_account_id == personal_account
            && matches!(rule.kind, RuleKind::Expense | RuleKind::Transfer)
        {
            personal.expense(amount);
        }
    }
    for expense in expected
        .iter()
        .filter(planned_in_month)
        .filter(|e| e.owner_id == actor.user_id)
    {
        personal.expense(expense.estimated_amount_minor);
    }

    let family = actor.role.allows(Permission::FamilyAnalytics).then(|| {
        let scope = snapshot.guardian_scope();
        let in_scope = |id: Option<Uuid>| id.is_some_and(|id| scope.contains(&id));
        let mut family = Projection::default();
        for rule in rules.iter().filter(|r| r.is_active) {
            let amount = rule.amount_minor * occurrences(rule);
            if amount == 0 {
                continue;
            }
            match rule.kind {
                RuleKind::Income if in_scope(rule.to_account_id) => family.income(amount),
                RuleKind::Expense if in_scope(rule.from_account_id) => family.expense(amount),
                RuleKind::Transfer if is_allowance(snapshot, rule) => family.expense(amount),
                _ => {}
            }
        }
        for expense in expected.iter().filter(planned_in_month) {
            family.expense(expense.estimated_amount_minor);
        }
        family
    });

    Forecast {
        month: from,
        personal,
        family,
    }
}

/// Transfer from a guardian-owned account to a dependent-owned one.
fn is_allowance(snapshot: &FamilySnapshot, rule: &RecurringRule) -> bool {
    let owner_role = |id: Option<Uuid>| {
        id.and_then(|id| snapshot.accounts.get(&id))
            .and_then(|account| snapshot.owner_role(account))
    };
    owner_role(rule.from_account_id).is_some_and(|role| role.is_guardian())
        && owner_role(rule.to_account_id).is_some_and(|role| role.is_dependent())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GoalProgress {
    pub account_id: Uuid,
    pub name: String,
    pub balance_minor: i64,
    pub goal_amount_minor: Option<i64>,
    pub remaining_minor: Option<i64>,
    /// Whole percent, capped at 100.
    pub percent: Option<u8>,
    pub goal_date: Option<NaiveDate>,
    /// Negative once the goal date has passed.
    pub days_left: Option<i64>,
}

pub fn goal_progress(account: &Account, today: NaiveDate) -> GoalProgress {
    let goal = account.goal_amount_minor.filter(|goal| *goal > 0);
    let percent = goal.map(|goal| {
        let ratio = account.balance_minor.max(0).saturating_mul(100) / goal;
        ratio.min(100) as u8
    });
    GoalProgress {
        account_id: account.id,
        name: account.name.clone(),
        balance_minor: account.balance_minor,
        goal_amount_minor: account.goal_amount_minor,
        remaining_minor: goal.map(|goal| (goal - account.balance_minor).max(0)),
        percent,
        goal_date: account.goal_date,
        days_left: account
            .goal_date
            .map(|date| date.signed_duration_since(today).num_days()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{Frequency, Priority, Role, User, expected_expenses::ExpenseStatus};

    struct Fixture {
        snapshot: FamilySnapshot,
        head: Actor,
        child: Actor,
        head_account: Uuid,
        child_account: Uuid,
        goal: Uuid,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_member(snapshot: &mut FamilySnapshot, family_id: Uuid, role: Role) -> (Actor, Uuid) {
        let user = User {
            id: Uuid::new_v4(),
            name: role.as_str().to_string(),
            display_name: role.as_str().to_string(),
            role,
            family_id,
        };
        let account = Account::new(
            family_id,
            format!("{}'s account", role.as_str()),
            AccountKind::Personal,
            Some(user.id),
        );
        let ids = (user.actor(), account.id);
        snapshot.edges.share(user.id, account.id);
        snapshot.accounts.insert(account.id, account);
        snapshot.users.insert(user.id, user);
        ids
    }

    fn fixture() -> Fixture {
        let family_id = Uuid::new_v4();
        let mut snapshot = FamilySnapshot::default();
        let (head, head_account) = add_member(&mut snapshot, family_id, Role::HeadOfFamily);
        let (child, child_account) = add_member(&mut snapshot, family_id, Role::Child);
        let mut goal = Account::new(family_id, "Bike".to_string(), AccountKind::Goal, None);
        goal.goal_amount_minor = Some(10_000);
        let goal_id = goal.id;
        snapshot.accounts.insert(goal.id, goal);
        Fixture {
            snapshot,
            head,
            child,
            head_account,
            child_account,
            goal: goal_id,
        }
    }

    fn posting(account: Uuid, kind: TransactionKind, amount: i64, day: u32) -> Transaction {
        Transaction::new(
            account,
            kind,
            amount,
            Uuid::nil(),
            Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn transfer_pair(from: Uuid, to: Uuid, amount: i64, family_expense: bool) -> [Transaction; 2] {
        let id = Uuid::new_v4();
        let mut out = posting(from, TransactionKind::Expense, amount, 10);
        out.transfer_id = Some(id);
        out.is_family_expense = family_expense;
        let mut inc = posting(to, TransactionKind::Income, amount, 10);
        inc.transfer_id = Some(id);
        [out, inc]
    }

    fn rule(kind: RuleKind, from: Option<Uuid>, to: Option<Uuid>, owner: Uuid) -> RecurringRule {
        RecurringRule {
            id: Uuid::new_v4(),
            family_id: Uuid::nil(),
            owner_id: owner,
            description: "rule".to_string(),
            amount_minor: 1_000,
            kind,
            from_account_id: from,
            to_account_id: to,
            category_id: None,
            frequency: Frequency::Monthly,
            start_date: date(2025, 4, 1),
            end_date: None,
            next_run_date: date(2025, 4, 1),
            last_run_date: None,
            is_active: true,
        }
    }

    #[test]
    fn guardian_summary_skips_plain_transfers_but_keeps_family_expenses() {
        let f = fixture();
        let mut postings = vec![
            posting(f.head_account, TransactionKind::Income, 50_000, 1),
            posting(f.head_account, TransactionKind::Expense, 5_000, 2),
            posting(f.child_account, TransactionKind::Expense, 700, 3),
        ];
        postings.extend(transfer_pair(f.head_account, f.child_account, 2_000, true));
        postings.extend(transfer_pair(f.head_account, f.goal, 3_000, false));

        let summary = summary(&f.snapshot, &f.head, &postings, date(2025, 3, 15));
        assert_eq!(summary.view, SummaryView::Guardian);
        assert_eq!(summary.monthly_income_minor, 50_000);
        assert_eq!(summary.monthly_expense_minor, 7_000);
        assert_eq!(summary.monthly_savings_minor, 43_000);
        assert_eq!(summary.month, date(2025, 3, 1));
        assert!(summary.other_accounts.iter().any(|a| a.account_id == f.goal));
    }

    #[test]
    fn member_summary_counts_every_own_posting() {
        let f = fixture();
        let mut postings = vec![posting(f.child_account, TransactionKind::Expense, 700, 3)];
        postings.extend(transfer_pair(f.head_account, f.child_account, 2_000, true));

        let summary = summary(&f.snapshot, &f.child, &postings, date(2025, 3, 15));
        assert_eq!(summary.view, SummaryView::Member);
        assert_eq!(summary.monthly_income_minor, 2_000);
        assert_eq!(summary.monthly_expense_minor, 700);
        assert!(summary.other_accounts.is_empty());
    }

    #[test]
    fn breakdown_rolls_up_to_parent_category() {
        let f = fixture();
        let food = Category {
            id: Uuid::new_v4(),
            family_id: Uuid::nil(),
            name: "Food".to_string(),
            parent_id: None,
            color: Some("#00ff00".to_string()),
            icon: None,
        };
        let groceries = Category {
            id: Uuid::new_v4(),
            name: "Groceries".to_string(),
            parent_id: Some(food.id),
            ..food.clone()
        };
        let mut a = posting(f.head_account, TransactionKind::Expense, 300, 1);
        a.category_id = Some(groceries.id);
        let mut b = posting(f.head_account, TransactionKind::Expense, 200, 2);
        b.category_id = Some(food.id);
        let c = posting(f.head_account, TransactionKind::Expense, 900, 3);
        let postings = vec![a, b, c];
        let scope = AnalyticsScope::for_actor(&f.snapshot, &f.head);
        let categories = vec![food.clone(), groceries.clone()];

        let leaf = category_breakdown(&postings, &scope, &categories, CategoryGrouping::Leaf);
        assert_eq!(leaf.len(), 3);
        assert_eq!(leaf[0].category_id, None);
        assert_eq!(leaf[0].total_minor, 900);

        let rolled = category_breakdown(&postings, &scope, &categories, CategoryGrouping::Parent);
        assert_eq!(rolled.len(), 2);
        assert_eq!(rolled[1].category_id, Some(food.id));
        assert_eq!(rolled[1].total_minor, 500);
    }

    #[test]
    fn trend_buckets_by_month() {
        let f = fixture();
        let scope = AnalyticsScope::for_actor(&f.snapshot, &f.head);
        let months = trailing_months(date(2025, 3, 20), 3);
        assert_eq!(months, vec![date(2025, 1, 1), date(2025, 2, 1), date(2025, 3, 1)]);

        let postings = vec![posting(f.head_account, TransactionKind::Income, 1_000, 5)];
        let trend = monthly_trend(&postings, &scope, &months);
        assert_eq!(trend[0].income_minor, 0);
        assert_eq!(trend[2].savings_minor, 1_000);
    }

    #[test]
    fn forecast_counts_every_occurrence_in_next_month() {
        let f = fixture();
        let mut weekly = rule(
            RuleKind::Expense,
            Some(f.head_account),
            None,
            f.head.user_id,
        );
        weekly.frequency = Frequency::Weekly;
        weekly.start_date = date(2025, 3, 25);
        weekly.next_run_date = date(2025, 3, 25);
        let salary = rule(RuleKind::Income, None, Some(f.head_account), f.head.user_id);
        let allowance = rule(
            RuleKind::Transfer,
            Some(f.head_account),
            Some(f.child_account),
            f.head.user_id,
        );
        let planned = ExpectedExpense {
            id: Uuid::new_v4(),
            family_id: Uuid::nil(),
            owner_id: f.child.user_id,
            description: "Trip".to_string(),
            estimated_amount_minor: 4_000,
            actual_amount_minor: None,
            due_date: date(2025, 4, 20),
            status: ExpenseStatus::Planned,
            priority: Priority::High,
            category_id: None,
            account_id: None,
            transaction_id: None,
        };
        let rules = vec![weekly, salary, allowance];
        let expected = vec![planned];

        let head = forecast(&f.snapshot, &f.head, &rules, &expected, date(2025, 3, 15));
        assert_eq!(head.month, date(2025, 4, 1));
        assert_eq!(head.personal.income_minor, 1_000);
        // Five Tuesdays in April 2025 plus the allowance.
        assert_eq!(head.personal.expense_minor, 6_000);
        let family = head.family.unwrap();
        assert_eq!(family.income_minor, 1_000);
        assert_eq!(family.expense_minor, 5_000 + 1_000 + 4_000);

        let child = forecast(&f.snapshot, &f.child, &rules, &expected, date(2025, 3, 15));
        assert_eq!(child.personal.expense_minor, 4_000);
        assert_eq!(child.personal.income_minor, 0);
        assert!(child.family.is_none());
    }

    #[test]
    fn goal_progress_caps_percent() {
        let mut goal = Account::new(Uuid::nil(), "Bike".to_string(), AccountKind::Goal, None);
        goal.goal_amount_minor = Some(10_000);
        goal.goal_date = Some(date(2025, 4, 1));
        goal.balance_minor = 2_500;
        let progress = goal_progress(&goal, date(2025, 3, 22));
        assert_eq!(progress.percent, Some(25));
        assert_eq!(progress.remaining_minor, Some(7_500));
        assert_eq!(progress.days_left, Some(10));

        goal.balance_minor = 12_000;
        let progress = goal_progress(&goal, date(2025, 3, 22));
        assert_eq!(progress.percent, Some(100));
        assert_eq!(progress.remaining_minor, Some(0));
    }
}
