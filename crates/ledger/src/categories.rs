//! Category registry per family.
//!
//! Categories are stored flat with an optional `parent_id`; tree views are
//! built in a single pass over that arena.

use std::collections::HashMap;

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// A category with its children, as returned by `Engine::category_tree`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Builds the forest of categories. Roots are categories without a parent
/// or whose parent is not in `categories`. Siblings are sorted by name.
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let known: std::collections::HashSet<Uuid> = categories.iter().map(|c| c.id).collect();
    let mut children: HashMap<Option<Uuid>, Vec<Category>> = HashMap::new();
    for category in categories {
        let parent = category.parent_id.filter(|id| known.contains(id));
        children.entry(parent).or_default().push(category);
    }
    attach(None, &mut children)
}

fn attach(
    parent: Option<Uuid>,
    children: &mut HashMap<Option<Uuid>, Vec<Category>>,
) -> Vec<CategoryNode> {
    let mut level = children.remove(&parent).unwrap_or_default();
    level.sort_by(|a, b| a.name.cmp(&b.name));
    level
        .into_iter()
        .map(|category| {
            let nested = attach(Some(category.id), children);
            CategoryNode {
                category,
                children: nested,
            }
        })
        .collect()
}

/// Maps each category id to its top-level ancestor.
pub(crate) fn root_index(categories: &[Category]) -> HashMap<Uuid, Uuid> {
    let parents: HashMap<Uuid, Option<Uuid>> =
        categories.iter().map(|c| (c.id, c.parent_id)).collect();
    let mut out = HashMap::with_capacity(categories.len());
    for category in categories {
        let mut current = category.id;
        // Bounded walk so a corrupted cycle cannot loop forever.
        for _ in 0..categories.len() {
            match parents.get(&current).copied().flatten() {
                Some(parent) if parents.contains_key(&parent) => current = parent,
                _ => break,
            }
        }
        out.insert(category.id, current);
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub color: Option<String>,
    pub icon: Option<String>,
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
}

impl Related<super::families::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Family.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Category> for ActiveModel {
    fn from(category: &Category) -> Self {
        Self {
            id: ActiveValue::Set(category.id),
            family_id: ActiveValue::Set(category.family_id),
            name: ActiveValue::Set(category.name.clone()),
            parent_id: ActiveValue::Set(category.parent_id),
            color: ActiveValue::Set(category.color.clone()),
            icon: ActiveValue::Set(category.icon.clone()),
        }
    }
}

impl From<Model> for Category {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            family_id: model.family_id,
            name: model.name,
            parent_id: model.parent_id,
            color: model.color,
            icon: model.icon,
        }
    }
}
