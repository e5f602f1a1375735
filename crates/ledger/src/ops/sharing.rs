use sea_orm::{QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{Account, Actor, EngineError, FamilySnapshot, ResultEngine, account_visibility};

use super::{Engine, access::require_member, families::insert_edge, with_write_tx};

/// The owner manages an account's audience; guardians manage ownerless ones.
fn require_share_rights<'a>(
    snapshot: &'a FamilySnapshot,
    actor: &Actor,
    account_id: Uuid,
) -> ResultEngine<&'a Account> {
    let account = snapshot.require_visible(actor, account_id)?;
    let allowed = match account.owner_id {
        Some(owner) => owner == actor.user_id,
        None => actor.role.is_guardian(),
    };
    if !allowed {
        return Err(EngineError::PermissionDenied(format!(
            "only the owner may share account '{}'",
            account.name
        )));
    }
    Ok(account)
}

impl Engine {
    /// Grants `user_id` visibility of the account. Sharing twice is a no-op.
    pub async fn share_account(
        &self,
        actor: &Actor,
        account_id: Uuid,
        user_id: Uuid,
    ) -> ResultEngine<()> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            require_share_rights(&snapshot, actor, account_id)?;
            require_member(&snapshot, user_id)?;
            if !snapshot.edges.has_edge(user_id, account_id) {
                insert_edge(&db_tx, user_id, account_id).await?;
            }
            Ok(())
        })
    }

    /// Removes an explicit grant. Role-derived visibility is unaffected.
    pub async fn unshare_account(
        &self,
        actor: &Actor,
        account_id: Uuid,
        user_id: Uuid,
    ) -> ResultEngine<()> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let account = require_share_rights(&snapshot, actor, account_id)?;
            require_member(&snapshot, user_id)?;
            if account.is_owned_by(user_id) {
                return Err(EngineError::InvalidState(
                    "the owner's own visibility cannot be removed".to_string(),
                ));
            }
            account_visibility::Entity::delete_many()
                .filter(account_visibility::Column::UserId.eq(user_id))
                .filter(account_visibility::Column::AccountId.eq(account_id))
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }
}
