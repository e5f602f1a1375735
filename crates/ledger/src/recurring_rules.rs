//! Recurring rules: templates the scheduler turns into postings or transfers.

use chrono::{Datelike, NaiveDate};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Frequency, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Income,
    Expense,
    Transfer,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl TryFrom<&str> for RuleKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(EngineError::InvalidValue(format!(
                "invalid rule kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringRule {
    pub id: Uuid,
    pub family_id: Uuid,
    pub owner_id: Uuid,
    pub description: String,
    pub amount_minor: i64,
    pub kind: RuleKind,
    /// Debited account (expense and transfer rules).
    pub from_account_id: Option<Uuid>,
    /// Credited account (income and transfer rules).
    pub to_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_run_date: NaiveDate,
    pub last_run_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl RecurringRule {
    pub fn anchor_day(&self) -> u32 {
        self.start_date.day()
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.is_active && self.next_run_date <= today
    }

    pub fn is_expired(&self) -> bool {
        self.end_date.is_some_and(|end| self.next_run_date > end)
    }

    /// The due date following the current `next_run_date`.
    pub fn following_run_date(&self) -> ResultEngine<NaiveDate> {
        self.frequency
            .next_after(self.next_run_date, self.anchor_day())
            .ok_or_else(|| EngineError::InvalidState("rule schedule overflow".to_string()))
    }

    /// Account whose balance the rule touches for income/expense rules.
    pub fn posting_account(&self) -> Option<Uuid> {
        match self.kind {
            RuleKind::Income => self.to_account_id,
            RuleKind::Expense => self.from_account_id,
            RuleKind::Transfer => None,
        }
    }

    pub(crate) fn validate_shape(&self) -> ResultEngine<()> {
        if self.amount_minor <= 0 {
            return Err(EngineError::InvalidState(
                "amount_minor must be > 0".to_string(),
            ));
        }
        if self.end_date.is_some_and(|end| end < self.start_date) {
            return Err(EngineError::InvalidState(
                "end_date must not precede start_date".to_string(),
            ));
        }
        match self.kind {
            RuleKind::Income if self.to_account_id.is_none() => Err(EngineError::InvalidState(
                "income rules need to_account_id".to_string(),
            )),
            RuleKind::Expense if self.from_account_id.is_none() => Err(
                EngineError::InvalidState("expense rules need from_account_id".to_string()),
            ),
            RuleKind::Transfer => match (self.from_account_id, self.to_account_id) {
                (Some(from), Some(to)) if from != to => Ok(()),
                (Some(_), Some(_)) => Err(EngineError::InvalidState(
                    "from_account_id and to_account_id must differ".to_string(),
                )),
                _ => Err(EngineError::InvalidState(
                    "transfer rules need from_account_id and to_account_id".to_string(),
                )),
            },
            _ => Ok(()),
        }
    }

    pub fn references_account(&self, account_id: Uuid) -> bool {
        self.from_account_id == Some(account_id) || self.to_account_id == Some(account_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "recurring_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub family_id: Uuid,
    pub owner_id: Uuid,
    pub description: String,
    pub amount_minor: i64,
    pub kind: String,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub frequency: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub next_run_date: Date,
    pub last_run_date: Option<Date>,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::OwnerId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Owner,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&RecurringRule> for ActiveModel {
    fn from(rule: &RecurringRule) -> Self {
        Self {
            id: ActiveValue::Set(rule.id),
            family_id: ActiveValue::Set(rule.family_id),
            owner_id: ActiveValue::Set(rule.owner_id),
            description: ActiveValue::Set(rule.description.clone()),
            amount_minor: ActiveValue::Set(rule.amount_minor),
            kind: ActiveValue::Set(rule.kind.as_str().to_string()),
            from_account_id: ActiveValue::Set(rule.from_account_id),
            to_account_id: ActiveValue::Set(rule.to_account_id),
            category_id: ActiveValue::Set(rule.category_id),
            frequency: ActiveValue::Set(rule.frequency.as_str().to_string()),
            start_date: ActiveValue::Set(rule.start_date),
            end_date: ActiveValue::Set(rule.end_date),
            next_run_date: ActiveValue::Set(rule.next_run_date),
            last_run_date: ActiveValue::Set(rule.last_run_date),
            is_active: ActiveValue::Set(rule.is_active),
        }
    }
}

impl TryFrom<Model> for RecurringRule {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            family_id: model.family_id,
            owner_id: model.owner_id,
            description: model.description,
            amount_minor: model.amount_minor,
            kind: RuleKind::try_from(model.kind.as_str())?,
            from_account_id: model.from_account_id,
            to_account_id: model.to_account_id,
            category_id: model.category_id,
            frequency: Frequency::try_from(model.frequency.as_str())?,
            start_date: model.start_date,
            end_date: model.end_date,
            next_run_date: model.next_run_date,
            last_run_date: model.last_run_date,
            is_active: model.is_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(kind: RuleKind) -> RecurringRule {
        RecurringRule {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            description: "Pocket money".to_string(),
            amount_minor: 2_000,
            kind,
            from_account_id: Some(Uuid::new_v4()),
            to_account_id: Some(Uuid::new_v4()),
            category_id: None,
            frequency: Frequency::Monthly,
            start_date: date(2025, 1, 31),
            end_date: None,
            next_run_date: date(2025, 1, 31),
            last_run_date: None,
            is_active: true,
        }
    }

    #[test]
    fn following_run_date_uses_previous_due_date() {
        let rule = rule(RuleKind::Transfer);
        assert_eq!(rule.following_run_date().unwrap(), date(2025, 2, 28));
    }

    #[test]
    fn due_and_expired() {
        let mut rule = rule(RuleKind::Income);
        assert!(rule.is_due(date(2025, 1, 31)));
        assert!(!rule.is_due(date(2025, 1, 30)));
        rule.end_date = Some(date(2025, 1, 15));
        assert!(rule.is_expired());
        rule.is_active = false;
        assert!(!rule.is_due(date(2025, 3, 1)));
    }

    #[test]
    fn shape_validation() {
        let mut transfer = rule(RuleKind::Transfer);
        assert!(transfer.validate_shape().is_ok());
        transfer.to_account_id = transfer.from_account_id;
        assert!(matches!(
            transfer.validate_shape(),
            Err(EngineError::InvalidState(_))
        ));

        let mut income = rule(RuleKind::Income);
        income.to_account_id = None;
        assert!(income.validate_shape().is_err());

        let mut expense = rule(RuleKind::Expense);
        expense.end_date = Some(date(2024, 12, 1));
        assert!(expense.validate_shape().is_err());
    }
}
