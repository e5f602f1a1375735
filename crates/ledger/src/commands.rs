//! Command structs for engine operations.
//!
//! These types group parameters for write operations (accounts, postings,
//! transfers, rules, planned expenses), keeping call sites readable and
//! avoiding long argument lists. Each command carries the `Actor` it runs as.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{AccountKind, Actor, Frequency, Priority, RuleKind, TransactionKind};

/// Create an account.
#[derive(Clone, Debug)]
pub struct NewAccountCmd {
    pub actor: Actor,
    pub name: String,
    pub kind: AccountKind,
    /// Defaults to the actor for Personal and Goal accounts; Common accounts
    /// never have an owner.
    pub owner_id: Option<Uuid>,
    pub goal_amount_minor: Option<i64>,
    pub goal_date: Option<NaiveDate>,
    pub shared_with: Vec<Uuid>,
}

impl NewAccountCmd {
    #[must_use]
    pub fn new(actor: Actor, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            actor,
            name: name.into(),
            kind,
            owner_id: None,
            goal_amount_minor: None,
            goal_date: None,
            shared_with: Vec::new(),
        }
    }

    #[must_use]
    pub fn owner(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    #[must_use]
    pub fn goal(mut self, amount_minor: i64, date: Option<NaiveDate>) -> Self {
        self.goal_amount_minor = Some(amount_minor);
        self.goal_date = date;
        self
    }

    #[must_use]
    pub fn share_with(mut self, user_id: Uuid) -> Self {
        self.shared_with.push(user_id);
        self
    }
}

/// Post an income or expense to a single account.
#[derive(Clone, Debug)]
pub struct PostCmd {
    pub actor: Actor,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount_minor: i64,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    /// Stored with the posting; aggregation already counts plain postings.
    pub is_family_expense: bool,
    pub occurred_at: DateTime<Utc>,
}

impl PostCmd {
    #[must_use]
    pub fn new(
        actor: Actor,
        account_id: Uuid,
        kind: TransactionKind,
        amount_minor: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor,
            account_id,
            kind,
            amount_minor,
            description: None,
            category_id: None,
            is_family_expense: false,
            occurred_at,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn family_expense(mut self) -> Self {
        self.is_family_expense = true;
        self
    }
}

/// Patch an existing posting. `None` keeps the current value.
#[derive(Clone, Debug)]
pub struct UpdatePostingCmd {
    pub actor: Actor,
    pub transaction_id: Uuid,
    pub kind: Option<TransactionKind>,
    pub amount_minor: Option<i64>,
    pub description: Option<String>,
    /// `Some(None)` clears the category.
    pub category_id: Option<Option<Uuid>>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl UpdatePostingCmd {
    #[must_use]
    pub fn new(actor: Actor, transaction_id: Uuid) -> Self {
        Self {
            actor,
            transaction_id,
            kind: None,
            amount_minor: None,
            description: None,
            category_id: None,
            occurred_at: None,
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Option<Uuid>) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.amount_minor.is_none()
            && self.description.is_none()
            && self.category_id.is_none()
            && self.occurred_at.is_none()
    }
}

/// Move money between two accounts.
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub actor: Actor,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_minor: i64,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl TransferCmd {
    #[must_use]
    pub fn new(
        actor: Actor,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor,
            from_account_id,
            to_account_id,
            amount_minor,
            description: None,
            category_id: None,
            occurred_at,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

/// Create a recurring rule.
#[derive(Clone, Debug)]
pub struct NewRecurringRuleCmd {
    pub actor: Actor,
    pub description: String,
    pub amount_minor: i64,
    pub kind: RuleKind,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl NewRecurringRuleCmd {
    #[must_use]
    pub fn new(
        actor: Actor,
        description: impl Into<String>,
        kind: RuleKind,
        amount_minor: i64,
        frequency: Frequency,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            actor,
            description: description.into(),
            amount_minor,
            kind,
            from_account_id: None,
            to_account_id: None,
            category_id: None,
            frequency,
            start_date,
            end_date: None,
        }
    }

    #[must_use]
    pub fn from_account(mut self, account_id: Uuid) -> Self {
        self.from_account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn to_account(mut self, account_id: Uuid) -> Self {
        self.to_account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }
}

/// Patch a recurring rule. Accounts and kind are fixed once created.
#[derive(Clone, Debug)]
pub struct UpdateRuleCmd {
    pub actor: Actor,
    pub rule_id: Uuid,
    pub description: Option<String>,
    pub amount_minor: Option<i64>,
    pub category_id: Option<Option<Uuid>>,
    pub frequency: Option<Frequency>,
    pub end_date: Option<Option<NaiveDate>>,
}

impl UpdateRuleCmd {
    #[must_use]
    pub fn new(actor: Actor, rule_id: Uuid) -> Self {
        Self {
            actor,
            rule_id,
            description: None,
            amount_minor: None,
            category_id: None,
            frequency: None,
            end_date: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Option<Uuid>) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    #[must_use]
    pub fn end_date(mut self, end_date: Option<NaiveDate>) -> Self {
        self.end_date = Some(end_date);
        self
    }
}

/// Plan an expense.
#[derive(Clone, Debug)]
pub struct NewExpectedExpenseCmd {
    pub actor: Actor,
    pub description: String,
    pub estimated_amount_minor: i64,
    pub due_date: NaiveDate,
    pub priority: Priority,
    pub category_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
}

impl NewExpectedExpenseCmd {
    #[must_use]
    pub fn new(
        actor: Actor,
        description: impl Into<String>,
        estimated_amount_minor: i64,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            actor,
            description: description.into(),
            estimated_amount_minor,
            due_date,
            priority: Priority::default(),
            category_id: None,
            account_id: None,
        }
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }
}

/// Create or rename a category.
#[derive(Clone, Debug)]
pub struct CategoryCmd {
    pub actor: Actor,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl CategoryCmd {
    #[must_use]
    pub fn new(actor: Actor, name: impl Into<String>) -> Self {
        Self {
            actor,
            name: name.into(),
            parent_id: None,
            color: None,
            icon: None,
        }
    }

    #[must_use]
    pub fn parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}
