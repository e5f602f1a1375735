use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Account, AccountKind, Actor, EngineError, Family, ResultEngine, Role, User,
    account_visibility, accounts, families, users,
    util::normalize_required_name,
};

use super::{Engine, with_tx, with_write_tx};

pub(super) async fn insert_edge(
    db: &DatabaseTransaction,
    user_id: Uuid,
    account_id: Uuid,
) -> ResultEngine<()> {
    account_visibility::ActiveModel {
        user_id: ActiveValue::Set(user_id),
        account_id: ActiveValue::Set(account_id),
    }
    .insert(db)
    .await?;
    Ok(())
}

impl Engine {
    /// Creates an empty family.
    pub async fn create_family(&self, name: &str) -> ResultEngine<Family> {
        let name = normalize_required_name(name, "family")?;
        with_write_tx!(self, |db_tx| {
            let model = families::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4()),
                name: ActiveValue::Set(name),
            }
            .insert(&db_tx)
            .await?;
            Ok(Family::from(model))
        })
    }

    /// Adds a member to a family together with their Personal account.
    ///
    /// The owner gets a visibility edge on the new account. For children and
    /// teens every current guardian of the family gets one as well.
    pub async fn create_user(
        &self,
        family_id: Uuid,
        name: &str,
        display_name: &str,
        role: Role,
    ) -> ResultEngine<User> {
        let name = normalize_required_name(name, "user")?;
        let display_name = normalize_required_name(display_name, "display")?;
        with_write_tx!(self, |db_tx| {
            if families::Entity::find_by_id(family_id)
                .one(&db_tx)
                .await?
                .is_none()
            {
                return Err(EngineError::NotFound(format!("family {family_id}")));
            }
            let taken = users::Entity::find()
                .filter(users::Column::FamilyId.eq(family_id))
                .filter(users::Column::Name.eq(name.as_str()))
                .one(&db_tx)
                .await?;
            if taken.is_some() {
                return Err(EngineError::InvalidState(format!(
                    "user name '{name}' already used in this family"
                )));
            }

            let user = User {
                id: Uuid::new_v4(),
                name,
                display_name,
                role,
                family_id,
            };
            users::ActiveModel::from(&user).insert(&db_tx).await?;

            let personal = Account::new(
                family_id,
                format!("{}'s account", user.display_name),
                AccountKind::Personal,
                Some(user.id),
            );
            accounts::ActiveModel::from(&personal).insert(&db_tx).await?;
            insert_edge(&db_tx, user.id, personal.id).await?;

            if role.is_dependent() {
                let guardians = users::Entity::find()
                    .filter(users::Column::FamilyId.eq(family_id))
                    .filter(users::Column::Role.is_in([
                        Role::HeadOfFamily.as_str(),
                        Role::Parent.as_str(),
                    ]))
                    .all(&db_tx)
                    .await?;
                for guardian in guardians {
                    insert_edge(&db_tx, guardian.id, personal.id).await?;
                }
            }
            tracing::info!(user_id = %user.id, role = role.as_str(), "user created");
            Ok(user)
        })
    }

    /// Resolves the identity triple of a stored user.
    pub async fn actor(&self, user_id: Uuid) -> ResultEngine<Actor> {
        with_tx!(self, |db_tx| {
            let user: User = users::Entity::find_by_id(user_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("user {user_id}")))?
                .try_into()?;
            Ok(user.actor())
        })
    }

    pub async fn family_members(&self, actor: &Actor) -> ResultEngine<Vec<User>> {
        with_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            users::Entity::find()
                .filter(users::Column::FamilyId.eq(actor.family_id))
                .order_by_asc(users::Column::Name)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(User::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}
