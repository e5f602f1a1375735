//! Household ledger engine.
//!
//! Families own users and accounts; postings are the only way balances
//! change; transfers move money between two accounts atomically; recurring
//! rules are fired by a daily scheduler; analytics build role-scoped
//! read-models. Every operation runs as an [`Actor`] supplied by the caller's
//! identity provider and is authorized against a closed [`Role`] table.

pub use accounts::{Account, AccountKind, AccountStatus};
pub use analytics::{
    AccountBalance, AnalyticsScope, CategoryGrouping, CategoryTotal, Forecast, GoalProgress,
    MonthlyTotals, Projection, Summary, SummaryView, Totals,
};
pub use categories::{Category, CategoryNode};
pub use commands::{
    CategoryCmd, NewAccountCmd, NewExpectedExpenseCmd, NewRecurringRuleCmd, PostCmd,
    TransferCmd, UpdatePostingCmd, UpdateRuleCmd,
};
pub use error::EngineError;
pub use expected_expenses::{ExpectedExpense, ExpenseStatus, Priority};
pub use families::Family;
pub use money::MoneyCents;
pub use ops::{BalanceDrift, Engine, EngineBuilder, PostingListFilter, PostingSort};
pub use recurring_rules::{RecurringRule, RuleKind};
pub use roles::{Permission, Role};
pub use schedule::Frequency;
pub use scheduler::{RuleFailure, SchedulerConfig, SchedulerReport, next_wakeup, run_scheduler};
pub use transactions::{Transaction, TransactionKind};
pub use users::{Actor, User};
pub use visibility::{FamilySnapshot, VisibilityIndex};

mod account_visibility;
mod accounts;
mod analytics;
mod categories;
mod commands;
mod error;
mod expected_expenses;
mod families;
mod money;
mod ops;
mod recurring_rules;
mod roles;
mod schedule;
mod scheduler;
mod transactions;
mod users;
mod util;
mod visibility;

pub type ResultEngine<T> = Result<T, EngineError>;
