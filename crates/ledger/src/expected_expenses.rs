//! Planned expenses: amounts the family expects to pay by a due date.
//!
//! A planned expense does not touch any balance until it is completed, at
//! which point a regular expense posting is created and linked.

use chrono::NaiveDate;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Planned,
    Completed,
    Cancelled,
}

impl ExpenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for ExpenseStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "planned" => Ok(Self::Planned),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::InvalidValue(format!(
                "invalid expense status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl TryFrom<&str> for Priority {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(EngineError::InvalidValue(format!(
                "invalid priority: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedExpense {
    pub id: Uuid,
    pub family_id: Uuid,
    pub owner_id: Uuid,
    pub description: String,
    pub estimated_amount_minor: i64,
    pub actual_amount_minor: Option<i64>,
    pub due_date: NaiveDate,
    pub status: ExpenseStatus,
    pub priority: Priority,
    pub category_id: Option<Uuid>,
    /// Account the expense is expected to be paid from, if known.
    pub account_id: Option<Uuid>,
    /// Posting created on completion.
    pub transaction_id: Option<Uuid>,
}

impl ExpectedExpense {
    pub fn is_planned(&self) -> bool {
        self.status == ExpenseStatus::Planned
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "expected_expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub family_id: Uuid,
    pub owner_id: Uuid,
    pub description: String,
    pub estimated_amount_minor: i64,
    pub actual_amount_minor: Option<i64>,
    pub due_date: Date,
    pub status: String,
    pub priority: String,
    pub category_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
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

impl From<&ExpectedExpense> for ActiveModel {
    fn from(expense: &ExpectedExpense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id),
            family_id: ActiveValue::Set(expense.family_id),
            owner_id: ActiveValue::Set(expense.owner_id),
            description: ActiveValue::Set(expense.description.clone()),
            estimated_amount_minor: ActiveValue::Set(expense.estimated_amount_minor),
            actual_amount_minor: ActiveValue::Set(expense.actual_amount_minor),
            due_date: ActiveValue::Set(expense.due_date),
            status: ActiveValue::Set(expense.status.as_str().to_string()),
            priority: ActiveValue::Set(expense.priority.as_str().to_string()),
            category_id: ActiveValue::Set(expense.category_id),
            account_id: ActiveValue::Set(expense.account_id),
            transaction_id: ActiveValue::Set(expense.transaction_id),
        }
    }
}

impl TryFrom<Model> for ExpectedExpense {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            family_id: model.family_id,
            owner_id: model.owner_id,
            description: model.description,
            estimated_amount_minor: model.estimated_amount_minor,
            actual_amount_minor: model.actual_amount_minor,
            due_date: model.due_date,
            status: ExpenseStatus::try_from(model.status.as_str())?,
            priority: Priority::try_from(model.priority.as_str())?,
            category_id: model.category_id,
            account_id: model.account_id,
            transaction_id: model.transaction_id,
        })
    }
}
