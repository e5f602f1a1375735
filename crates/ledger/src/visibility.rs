//! Who may see which account.
//!
//! Explicit grants live in a bidirectional [`VisibilityIndex`]. Role-derived
//! grants are computed on top of it by [`FamilySnapshot::is_visible`]:
//!
//! - an edge always grants access;
//! - a head of family sees every account of the family;
//! - a parent sees every non-personal account, their own personal account
//!   and the personal accounts of the family's children and teens.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::{Account, AccountKind, Actor, EngineError, Permission, ResultEngine, Role, User};

/// `user -> accounts` and `account -> users` views of the same edge set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibilityIndex {
    by_user: HashMap<Uuid, HashSet<Uuid>>,
    by_account: HashMap<Uuid, HashSet<Uuid>>,
}

impl VisibilityIndex {
    pub fn from_edges(edges: impl IntoIterator<Item = (Uuid, Uuid)>) -> Self {
        let mut index = Self::default();
        for (user_id, account_id) in edges {
            index.share(user_id, account_id);
        }
        index
    }

    /// Adds the edge. Returns `false` if it already existed.
    pub fn share(&mut self, user_id: Uuid, account_id: Uuid) -> bool {
        let inserted = self.by_user.entry(user_id).or_default().insert(account_id);
        self.by_account.entry(account_id).or_default().insert(user_id);
        inserted
    }

    /// Removes the edge. Returns `false` if it did not exist.
    pub fn unshare(&mut self, user_id: Uuid, account_id: Uuid) -> bool {
        let removed = self
            .by_user
            .get_mut(&user_id)
            .is_some_and(|accounts| accounts.remove(&account_id));
        if let Some(users) = self.by_account.get_mut(&account_id) {
            users.remove(&user_id);
        }
        removed
    }

    pub fn has_edge(&self, user_id: Uuid, account_id: Uuid) -> bool {
        self.by_user
            .get(&user_id)
            .is_some_and(|accounts| accounts.contains(&account_id))
    }

    pub fn accounts_of(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.by_user.get(&user_id).into_iter().flatten().copied()
    }

    pub fn users_of(&self, account_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.by_account.get(&account_id).into_iter().flatten().copied()
    }
}

/// Family state loaded inside one database transaction.
#[derive(Clone, Debug, Default)]
pub struct FamilySnapshot {
    pub users: HashMap<Uuid, User>,
    pub accounts: HashMap<Uuid, Account>,
    pub edges: VisibilityIndex,
}

impl FamilySnapshot {
    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        self.users.get(&user_id).map(|user| user.role)
    }

    pub fn owner_role(&self, account: &Account) -> Option<Role> {
        account.owner_id.and_then(|owner| self.role_of(owner))
    }

    pub fn guardian_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.users
            .values()
            .filter(|user| user.role.is_guardian())
            .map(|user| user.id)
    }

    pub fn personal_account_of(&self, user_id: Uuid) -> Option<&Account> {
        self.accounts
            .values()
            .find(|account| account.kind == AccountKind::Personal && account.is_owned_by(user_id))
    }

    pub fn is_visible(&self, actor: &Actor, account: &Account) -> bool {
        if account.family_id != actor.family_id {
            return false;
        }
        if self.edges.has_edge(actor.user_id, account.id) {
            return true;
        }
        if actor.role.allows(Permission::SeeAllAccounts) {
            return true;
        }
        actor.role.allows(Permission::SeeFamilyAccounts)
            && (account.kind != AccountKind::Personal
                || account.is_owned_by(actor.user_id)
                || self.owner_role(account).is_some_and(Role::is_dependent))
    }

    /// The account if it exists and `actor` may see it, `NotFound` otherwise.
    pub fn require_visible(&self, actor: &Actor, account_id: Uuid) -> ResultEngine<&Account> {
        self.accounts
            .get(&account_id)
            .filter(|account| self.is_visible(actor, account))
            .ok_or_else(|| EngineError::NotFound(format!("account {account_id}")))
    }

    /// Sum of every guardian's personal balance, shown as the Common balance.
    pub fn common_balance(&self) -> i64 {
        self.accounts
            .values()
            .filter(|account| {
                account.kind == AccountKind::Personal
                    && self.owner_role(account).is_some_and(Role::is_guardian)
            })
            .map(|account| account.balance_minor)
            .sum()
    }

    /// Replaces the stored balance of a Common account with the derived one.
    pub fn present(&self, account: &Account) -> Account {
        let mut shown = account.clone();
        if shown.kind == AccountKind::Common {
            shown.balance_minor = self.common_balance();
        }
        shown
    }

    /// Visible accounts as read-models, ordered by kind then name.
    pub fn accounts_for(&self, actor: &Actor) -> Vec<Account> {
        let mut out: Vec<Account> = self
            .accounts
            .values()
            .filter(|account| self.is_visible(actor, account))
            .map(|account| self.present(account))
            .collect();
        out.sort_by(|a, b| {
            kind_order(a.kind)
                .cmp(&kind_order(b.kind))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Accounts family-level aggregation runs over: guardians' personal
    /// accounts plus every Common, Goal and Emergency account.
    pub fn guardian_scope(&self) -> HashSet<Uuid> {
        self.accounts
            .values()
            .filter(|account| match account.kind {
                AccountKind::Personal => self.owner_role(account).is_some_and(Role::is_guardian),
                AccountKind::Common | AccountKind::Goal | AccountKind::Emergency => true,
            })
            .map(|account| account.id)
            .collect()
    }
}

fn kind_order(kind: AccountKind) -> u8 {
    match kind {
        AccountKind::Personal => 0,
        AccountKind::Common => 1,
        AccountKind::Emergency => 2,
        AccountKind::Goal => 3,
    }
}
