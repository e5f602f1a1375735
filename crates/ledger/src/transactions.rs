//! Posting primitives.
//!
//! A `Transaction` is a single signed entry against one account. It is the
//! only way an account balance changes: income adds `amount_minor`, expense
//! subtracts it. Two postings sharing a `transfer_id` form a transfer.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Balance effect of a posting of `amount_minor` with this kind.
    pub fn signed(self, amount_minor: i64) -> i64 {
        match self {
            Self::Income => amount_minor,
            Self::Expense => -amount_minor,
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(EngineError::InvalidValue(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount_minor: i64,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub created_by: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub transfer_id: Option<Uuid>,
    /// Marks the expense leg of a guardian → child transfer so analytics
    /// count it as a family expense.
    pub is_family_expense: bool,
}

impl Transaction {
    pub fn new(
        account_id: Uuid,
        kind: TransactionKind,
        amount_minor: i64,
        created_by: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if amount_minor <= 0 {
            return Err(EngineError::InvalidState(
                "amount_minor must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount_minor,
            description: None,
            category_id: None,
            created_by,
            occurred_at,
            transfer_id: None,
            is_family_expense: false,
        })
    }

    pub fn signed_amount(&self) -> i64 {
        self.kind.signed(self.amount_minor)
    }

    pub fn is_transfer(&self) -> bool {
        self.transfer_id.is_some()
    }

    /// Whether family-level aggregation counts this posting: plain postings,
    /// or transfer legs explicitly reclassified as family expenses.
    pub fn counts_for_family(&self) -> bool {
        self.transfer_id.is_none() || self.is_family_expense
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: String,
    pub amount_minor: i64,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub created_by: Uuid,
    pub occurred_at: DateTimeUtc,
    pub transfer_id: Option<Uuid>,
    pub is_family_expense: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Account,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id),
            account_id: ActiveValue::Set(tx.account_id),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            description: ActiveValue::Set(tx.description.clone()),
            category_id: ActiveValue::Set(tx.category_id),
            created_by: ActiveValue::Set(tx.created_by),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            transfer_id: ActiveValue::Set(tx.transfer_id),
            is_family_expense: ActiveValue::Set(tx.is_family_expense),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            account_id: model.account_id,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            amount_minor: model.amount_minor,
            description: model.description,
            category_id: model.category_id,
            created_by: model.created_by,
            occurred_at: model.occurred_at,
            transfer_id: model.transfer_id,
            is_family_expense: model.is_family_expense,
        })
    }
}
