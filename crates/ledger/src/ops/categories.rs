use std::collections::HashMap;

use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Actor, Category, CategoryCmd, CategoryNode, EngineError, Permission, ResultEngine,
    categories, expected_expenses, recurring_rules, transactions,
    util::{normalize_optional_text, normalize_required_name},
};

use super::{Engine, access::require_permission, with_tx, with_write_tx};

async fn family_categories(
    db: &DatabaseTransaction,
    family_id: Uuid,
) -> ResultEngine<Vec<Category>> {
    Ok(categories::Entity::find()
        .filter(categories::Column::FamilyId.eq(family_id))
        .order_by_asc(categories::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(Category::from)
        .collect())
}

/// Whether making `parent_id` the parent of `category_id` closes a cycle.
fn creates_cycle(categories: &[Category], category_id: Uuid, parent_id: Uuid) -> bool {
    let parents: HashMap<Uuid, Option<Uuid>> =
        categories.iter().map(|c| (c.id, c.parent_id)).collect();
    let mut current = Some(parent_id);
    for _ in 0..=categories.len() {
        match current {
            Some(id) if id == category_id => return true,
            Some(id) => current = parents.get(&id).copied().flatten(),
            None => return false,
        }
    }
    true
}

impl Engine {
    pub async fn create_category(&self, cmd: CategoryCmd) -> ResultEngine<Category> {
        require_permission(&cmd.actor, Permission::ManageCategories)?;
        let category = Category {
            id: Uuid::new_v4(),
            family_id: cmd.actor.family_id,
            name: normalize_required_name(&cmd.name, "category")?,
            parent_id: cmd.parent_id,
            color: normalize_optional_text(cmd.color.as_deref()),
            icon: normalize_optional_text(cmd.icon.as_deref()),
        };
        with_write_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, &cmd.actor).await?;
            if let Some(parent_id) = category.parent_id {
                self.require_category(&db_tx, category.family_id, parent_id)
                    .await?;
            }
            categories::ActiveModel::from(&category)
                .insert(&db_tx)
                .await?;
            Ok(category)
        })
    }

    /// Replaces name, parent, color and icon of a category.
    pub async fn update_category(
        &self,
        category_id: Uuid,
        cmd: CategoryCmd,
    ) -> ResultEngine<Category> {
        require_permission(&cmd.actor, Permission::ManageCategories)?;
        let name = normalize_required_name(&cmd.name, "category")?;
        with_write_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, &cmd.actor).await?;
            let all = family_categories(&db_tx, cmd.actor.family_id).await?;
            let Some(existing) = all.iter().find(|c| c.id == category_id) else {
                return Err(EngineError::NotFound(format!("category {category_id}")));
            };
            if let Some(parent_id) = cmd.parent_id {
                if !all.iter().any(|c| c.id == parent_id) {
                    return Err(EngineError::NotFound(format!("category {parent_id}")));
                }
                if creates_cycle(&all, category_id, parent_id) {
                    return Err(EngineError::InvalidState(format!(
                        "category {parent_id} cannot be the parent of {category_id}"
                    )));
                }
            }
            let category = Category {
                id: existing.id,
                family_id: existing.family_id,
                name,
                parent_id: cmd.parent_id,
                color: normalize_optional_text(cmd.color.as_deref()),
                icon: normalize_optional_text(cmd.icon.as_deref()),
            };
            categories::ActiveModel::from(&category)
                .update(&db_tx)
                .await?;
            Ok(category)
        })
    }

    /// Deletes a leaf category and clears every reference to it.
    pub async fn delete_category(&self, actor: &Actor, category_id: Uuid) -> ResultEngine<()> {
        require_permission(actor, Permission::ManageCategories)?;
        with_write_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            self.require_category(&db_tx, actor.family_id, category_id)
                .await?;
            let has_children = categories::Entity::find()
                .filter(categories::Column::ParentId.eq(category_id))
                .one(&db_tx)
                .await?
                .is_some();
            if has_children {
                return Err(EngineError::DependencyConflict(format!(
                    "category {category_id} has subcategories"
                )));
            }

            transactions::Entity::update_many()
                .col_expr(transactions::Column::CategoryId, Expr::value(Option::<Uuid>::None))
                .filter(transactions::Column::CategoryId.eq(category_id))
                .exec(&db_tx)
                .await?;
            recurring_rules::Entity::update_many()
                .col_expr(
                    recurring_rules::Column::CategoryId,
                    Expr::value(Option::<Uuid>::None),
                )
                .filter(recurring_rules::Column::CategoryId.eq(category_id))
                .exec(&db_tx)
                .await?;
            expected_expenses::Entity::update_many()
                .col_expr(
                    expected_expenses::Column::CategoryId,
                    Expr::value(Option::<Uuid>::None),
                )
                .filter(expected_expenses::Column::CategoryId.eq(category_id))
                .exec(&db_tx)
                .await?;
            categories::Entity::delete_by_id(category_id)
                .exec(&db_tx)
                .await?;
            tracing::info!(%category_id, "category deleted");
            Ok(())
        })
    }

    /// Flat list of the family's categories, ordered by name.
    pub async fn list_categories(&self, actor: &Actor) -> ResultEngine<Vec<Category>> {
        with_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            family_categories(&db_tx, actor.family_id).await
        })
    }

    pub async fn category_tree(&self, actor: &Actor) -> ResultEngine<Vec<CategoryNode>> {
        let flat = self.list_categories(actor).await?;
        Ok(categories::build_tree(flat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent_id: Option<Uuid>) -> Category {
        Category {
            id: Uuid::new_v4(),
            family_id: Uuid::nil(),
            name: name.to_string(),
            parent_id,
            color: None,
            icon: None,
        }
    }

    #[test]
    fn reparenting_under_a_descendant_is_a_cycle() {
        let home = category("Home", None);
        let utilities = category("Utilities", Some(home.id));
        let power = category("Power", Some(utilities.id));
        let food = category("Food", None);
        let all = vec![home.clone(), utilities.clone(), power.clone(), food.clone()];

        assert!(creates_cycle(&all, home.id, power.id));
        assert!(creates_cycle(&all, home.id, home.id));
        assert!(!creates_cycle(&all, power.id, food.id));
        assert!(!creates_cycle(&all, food.id, utilities.id));
    }
}
