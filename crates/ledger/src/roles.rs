//! Family roles and the permission table derived from them.

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Role of a family member, supplied by the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    HeadOfFamily,
    Parent,
    Teen,
    Child,
}

/// Capabilities that depend on role alone (ownership checks are applied on
/// top of these by the engine).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    /// Post to any visible Personal/Emergency account of the family.
    PostToAnyAccount,
    /// Update or delete existing postings.
    EditPostings,
    /// Transfer out of accounts the actor does not own.
    TransferFromAnyAccount,
    /// Create Common/Emergency/Personal accounts, archive and delete accounts.
    ManageAccounts,
    /// Create, rename and delete categories.
    ManageCategories,
    /// See every account of the family regardless of edges.
    SeeAllAccounts,
    /// See non-personal accounts and the personal accounts of children.
    SeeFamilyAccounts,
    /// Read family-wide analytics and forecasts.
    FamilyAnalytics,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeadOfFamily => "head_of_family",
            Self::Parent => "parent",
            Self::Teen => "teen",
            Self::Child => "child",
        }
    }

    /// HeadOfFamily and Parent.
    pub fn is_guardian(self) -> bool {
        matches!(self, Self::HeadOfFamily | Self::Parent)
    }

    /// Child and Teen.
    pub fn is_dependent(self) -> bool {
        !self.is_guardian()
    }

    pub fn allows(self, permission: Permission) -> bool {
        use Permission::*;
        match (self, permission) {
            (Self::HeadOfFamily, _) => true,
            (Self::Parent, SeeAllAccounts) => false,
            (Self::Parent, _) => true,
            (Self::Teen | Self::Child, _) => false,
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "head_of_family" => Ok(Self::HeadOfFamily),
            "parent" => Ok(Self::Parent),
            "teen" => Ok(Self::Teen),
            "child" => Ok(Self::Child),
            other => Err(EngineError::InvalidRole(format!("unknown role: {other}"))),
        }
    }
}
