use sea_orm::{DatabaseTransaction, JoinType, QueryFilter, QuerySelect, prelude::*};
use uuid::Uuid;

use crate::{
    Account, Actor, EngineError, FamilySnapshot, Permission, RecurringRule, ResultEngine,
    Transaction, User, VisibilityIndex, account_visibility, accounts, categories,
    recurring_rules, transactions, users,
};

use super::Engine;

impl Engine {
    /// Loads the actor's family and checks that the actor is a member with
    /// the role it claims.
    pub(super) async fn snapshot_for(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
    ) -> ResultEngine<FamilySnapshot> {
        let snapshot = self.load_snapshot(db, actor.family_id).await?;
        match snapshot.users.get(&actor.user_id) {
            None => Err(EngineError::NotFound(format!("user {}", actor.user_id))),
            Some(user) if user.role != actor.role => Err(EngineError::PermissionDenied(format!(
                "user {} is not {}",
                actor.user_id,
                actor.role.as_str()
            ))),
            Some(_) => Ok(snapshot),
        }
    }

    pub(super) async fn load_snapshot(
        &self,
        db: &DatabaseTransaction,
        family_id: Uuid,
    ) -> ResultEngine<FamilySnapshot> {
        let mut snapshot = FamilySnapshot::default();
        for model in users::Entity::find()
            .filter(users::Column::FamilyId.eq(family_id))
            .all(db)
            .await?
        {
            let user = User::try_from(model)?;
            snapshot.users.insert(user.id, user);
        }
        for model in accounts::Entity::find()
            .filter(accounts::Column::FamilyId.eq(family_id))
            .all(db)
            .await?
        {
            let account = Account::try_from(model)?;
            snapshot.accounts.insert(account.id, account);
        }
        let edges = account_visibility::Entity::find()
            .join(
                JoinType::InnerJoin,
                account_visibility::Relation::Account.def(),
            )
            .filter(accounts::Column::FamilyId.eq(family_id))
            .all(db)
            .await?;
        snapshot.edges =
            VisibilityIndex::from_edges(edges.into_iter().map(|e| (e.user_id, e.account_id)));
        Ok(snapshot)
    }

    pub(super) async fn require_category(
        &self,
        db: &DatabaseTransaction,
        family_id: Uuid,
        category_id: Uuid,
    ) -> ResultEngine<()> {
        let found = categories::Entity::find_by_id(category_id)
            .filter(categories::Column::FamilyId.eq(family_id))
            .one(db)
            .await?;
        if found.is_none() {
            return Err(EngineError::NotFound(format!("category {category_id}")));
        }
        Ok(())
    }

    pub(super) async fn find_transaction(
        &self,
        db: &DatabaseTransaction,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        transactions::Entity::find_by_id(transaction_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("transaction {transaction_id}")))?
            .try_into()
    }

    /// A rule of the actor's family the actor may manage: guardians manage
    /// every rule, other members only their own.
    pub(super) async fn require_rule(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        rule_id: Uuid,
    ) -> ResultEngine<RecurringRule> {
        self.snapshot_for(db, actor).await?;
        let rule: RecurringRule = recurring_rules::Entity::find_by_id(rule_id)
            .filter(recurring_rules::Column::FamilyId.eq(actor.family_id))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("rule {rule_id}")))?
            .try_into()?;
        if rule.owner_id != actor.user_id && !actor.role.is_guardian() {
            return Err(EngineError::NotFound(format!("rule {rule_id}")));
        }
        Ok(rule)
    }
}

pub(super) fn require_permission(actor: &Actor, permission: Permission) -> ResultEngine<()> {
    if !actor.role.allows(permission) {
        return Err(EngineError::PermissionDenied(format!(
            "{} may not {permission:?}",
            actor.role.as_str()
        )));
    }
    Ok(())
}

/// Members of the actor's family; anyone else is reported as missing.
pub(super) fn require_member(snapshot: &FamilySnapshot, user_id: Uuid) -> ResultEngine<&User> {
    snapshot
        .users
        .get(&user_id)
        .ok_or_else(|| EngineError::NotFound(format!("user {user_id}")))
}
