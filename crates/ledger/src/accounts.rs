//! The module contains the `Account` struct and its storage model.
//!
//! An account holds money for a family: a member's personal pocket, the
//! common family pot, a savings goal or an emergency reserve. Its stored
//! balance is denormalized and always equals the signed sum of the postings
//! applied to it.

use chrono::NaiveDate;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Personal,
    Common,
    Goal,
    Emergency,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Common => "common",
            Self::Goal => "goal",
            Self::Emergency => "emergency",
        }
    }

    /// Common and Goal accounts are funded through transfers only.
    pub fn accepts_direct_postings(self) -> bool {
        matches!(self, Self::Personal | Self::Emergency)
    }
}

impl TryFrom<&str> for AccountKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "personal" => Ok(Self::Personal),
            "common" => Ok(Self::Common),
            "goal" => Ok(Self::Goal),
            "emergency" => Ok(Self::Emergency),
            other => Err(EngineError::InvalidValue(format!(
                "invalid account kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Archived,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl TryFrom<&str> for AccountStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(EngineError::InvalidValue(format!(
                "invalid account status: {other}"
            ))),
        }
    }
}

/// An account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    /// Balance in minor units. For Common accounts, read-models replace this
    /// with the derived family balance (see `Engine::list_accounts`).
    pub balance_minor: i64,
    /// `None` for ownerless (Common) accounts.
    pub owner_id: Option<Uuid>,
    pub goal_amount_minor: Option<i64>,
    pub goal_date: Option<NaiveDate>,
    pub status: AccountStatus,
}

impl Account {
    pub fn new(family_id: Uuid, name: String, kind: AccountKind, owner_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            family_id,
            name,
            kind,
            balance_minor: 0,
            owner_id,
            goal_amount_minor: None,
            goal_date: None,
            status: AccountStatus::Active,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.status == AccountStatus::Archived
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == Some(user_id)
    }

    pub(crate) fn require_active(&self) -> ResultEngine<()> {
        if self.is_archived() {
            return Err(EngineError::InvalidState(format!(
                "account '{}' is archived",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub kind: String,
    pub balance_minor: i64,
    pub owner_id: Option<Uuid>,
    pub goal_amount_minor: Option<i64>,
    pub goal_date: Option<Date>,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::families::Entity",
        from = "Column::FamilyId",
        to = "super::families::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Family,
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
    #[sea_orm(has_many = "super::account_visibility::Entity")]
    Visibility,
}

impl Related<super::families::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Family.def()
    }
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::account_visibility::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Visibility.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(value: &Account) -> Self {
        Self {
            id: ActiveValue::Set(value.id),
            family_id: ActiveValue::Set(value.family_id),
            name: ActiveValue::Set(value.name.clone()),
            kind: ActiveValue::Set(value.kind.as_str().to_string()),
            balance_minor: ActiveValue::Set(value.balance_minor),
            owner_id: ActiveValue::Set(value.owner_id),
            goal_amount_minor: ActiveValue::Set(value.goal_amount_minor),
            goal_date: ActiveValue::Set(value.goal_date),
            status: ActiveValue::Set(value.status.as_str().to_string()),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            family_id: model.family_id,
            name: model.name,
            kind: AccountKind::try_from(model.kind.as_str())?,
            balance_minor: model.balance_minor,
            owner_id: model.owner_id,
            goal_amount_minor: model.goal_amount_minor,
            goal_date: model.goal_date,
            status: AccountStatus::try_from(model.status.as_str())?,
        })
    }
}
