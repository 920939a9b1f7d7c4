//! Entity definition commands.
//!
//! - `create_entity`: register an entity with its system properties and, when
//!   it has a workflow, the default workflow
//! - `update_entity`: change presentation, features and flags
//! - `delete_entity`: remove an entity, blocked or cascading per [`DeletePolicy`]
//! - `get_entity` / `list_entities`
//!
//! Name, slug, prefix and order are unique across entities. The name doubles
//! as the static-column namespace and is frozen once the entity has rows.

use crate::catalog::default_properties;
use crate::error::{Result, RowkeepError};
use crate::model::{Entity, EntityFeatures, EntityId, RowId, VisibilityClass};
use crate::store::{DataStore, Tables};
use crate::workflow::default_workflow;
use tracing::info;

/// What to do with an entity's rows when it is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Refuse while the entity has rows.
    #[default]
    Block,
    /// Delete the rows and everything they own.
    Cascade,
}

#[derive(Debug, Clone, Default)]
pub struct EntityUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub title_plural: Option<String>,
    pub prefix: Option<String>,
    pub order: Option<i32>,
    pub features: Option<EntityFeatures>,
    pub default_visibility: Option<VisibilityClass>,
    pub active: Option<bool>,
}

/// Register `entity`. An order of 0 is replaced by the next free order.
pub fn create_entity<S: DataStore>(store: &S, entity: Entity) -> Result<Entity> {
    let created = store.transaction(|tables| {
        let mut entity = entity.clone();
        if entity.order == 0 {
            entity.order = tables.entities.values().map(|e| e.order).max().unwrap_or(0) + 1;
        }
        check_identity(tables, &entity)?;

        for property in default_properties(entity.id) {
            tables.properties.insert(property.id, property);
        }
        if entity.features.has_workflow {
            bootstrap_workflow(tables, entity.id);
        }
        tables.entities.insert(entity.id, entity.clone());
        Ok(entity)
    })?;

    info!(target: "rowkeep::entities", entity = %created.name, prefix = %created.prefix, "Entity created");
    Ok(created)
}

pub fn update_entity<S: DataStore>(store: &S, entity_id: EntityId, update: &EntityUpdate) -> Result<Entity> {
    store.transaction(|tables| {
        let mut entity = tables.entity(entity_id)?.clone();

        if let Some(name) = &update.name {
            if *name != entity.name && tables.rows_of(entity_id).next().is_some() {
                return Err(RowkeepError::Definition(format!(
                    "entity '{}' has rows; its name cannot change",
                    entity.name
                )));
            }
            entity.name = name.clone();
        }
        if let Some(slug) = &update.slug {
            entity.slug = slug.clone();
        }
        if let Some(title) = &update.title {
            entity.title = title.clone();
        }
        if let Some(plural) = &update.title_plural {
            entity.title_plural = plural.clone();
        }
        if let Some(prefix) = &update.prefix {
            entity.prefix = prefix.clone();
        }
        if let Some(order) = update.order {
            entity.order = order;
        }
        if let Some(visibility) = update.default_visibility {
            entity.default_visibility = visibility;
        }
        if let Some(active) = update.active {
            entity.active = active;
        }
        if let Some(features) = update.features {
            if features.has_workflow && tables.states_of(entity_id).is_empty() {
                bootstrap_workflow(tables, entity_id);
            }
            entity.features = features;
        }

        check_identity(tables, &entity)?;
        tables.entities.insert(entity.id, entity.clone());
        Ok(entity)
    })
}

pub fn delete_entity<S: DataStore>(store: &S, entity_id: EntityId, policy: DeletePolicy) -> Result<Entity> {
    let (entity, rows) = store.transaction(|tables| {
        let entity = tables.entity(entity_id)?.clone();
        let own: Vec<_> = tables.properties_of(entity_id).iter().map(|p| p.id).collect();
        if let Some(referencing) = tables
            .properties
            .values()
            .find(|p| p.entity_id != entity_id && p.parent_id.is_some_and(|id| own.contains(&id)))
        {
            return Err(RowkeepError::Definition(format!(
                "entity '{}' is referenced by property '{}'",
                entity.name, referencing.name
            )));
        }

        let roots: Vec<RowId> = tables
            .rows_of(entity_id)
            .filter(|r| !r.is_detail())
            .map(|r| r.id)
            .collect();
        if !roots.is_empty() && policy == DeletePolicy::Block {
            return Err(RowkeepError::Definition(format!(
                "entity '{}' still has {} row(s)",
                entity.name,
                roots.len()
            )));
        }
        let removed: usize = roots
            .into_iter()
            .map(|id| tables.remove_row_cascade(id).len())
            .sum();

        tables.properties.retain(|_, p| p.entity_id != entity_id);
        tables.workflow_states.retain(|_, s| s.entity_id != entity_id);
        tables.workflow_steps.retain(|_, s| s.entity_id != entity_id);
        tables.tags.retain(|_, t| t.entity_id != entity_id);
        tables.logs.retain(|l| l.entity_id != entity_id);
        tables.entities.remove(&entity_id);
        Ok((entity, removed))
    })?;

    info!(target: "rowkeep::entities", entity = %entity.name, rows, "Entity deleted");
    Ok(entity)
}

pub fn get_entity<S: DataStore>(store: &S, entity_id: EntityId) -> Result<Entity> {
    store.read(|tables| tables.entity(entity_id).cloned())
}

/// All entities by order, then name.
pub fn list_entities<S: DataStore>(store: &S) -> Result<Vec<Entity>> {
    store.read(|tables| {
        let mut entities: Vec<Entity> = tables.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(entities)
    })
}

fn bootstrap_workflow(tables: &mut Tables, entity_id: EntityId) {
    let (states, steps) = default_workflow(entity_id);
    tables
        .workflow_states
        .extend(states.into_iter().map(|s| (s.id, s)));
    tables
        .workflow_steps
        .extend(steps.into_iter().map(|s| (s.id, s)));
}

fn check_identity(tables: &Tables, entity: &Entity) -> Result<()> {
    let mut issues = Vec::new();
    if entity.name.is_empty() {
        issues.push("entity name cannot be empty".to_string());
    } else if entity.name.contains(|c: char| c.is_whitespace() || c == '-') {
        issues.push(format!(
            "entity name '{}' cannot contain spaces or hyphens",
            entity.name
        ));
    }
    if entity.title.trim().is_empty() {
        issues.push("entity title cannot be empty".to_string());
    }
    if entity.prefix.is_empty() || !entity.prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        issues.push(format!("invalid folio prefix '{}'", entity.prefix));
    }

    for other in tables.entities.values().filter(|e| e.id != entity.id) {
        if other.name == entity.name {
            issues.push(format!("duplicate entity name '{}'", entity.name));
        }
        if other.slug == entity.slug {
            issues.push(format!("duplicate entity slug '{}'", entity.slug));
        }
        if other.prefix.eq_ignore_ascii_case(&entity.prefix) {
            issues.push(format!("duplicate folio prefix '{}'", entity.prefix));
        }
        if other.order == entity.order {
            issues.push(format!("duplicate entity order {}", entity.order));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(RowkeepError::Definition(issues.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Property, PropertyType};
    use crate::codec::TypedValue;
    use crate::commands::create::{self, NewRow};
    use crate::permission::Requester;
    use crate::store::memory::InMemoryStore;
    use uuid::Uuid;

    fn workflow_entity(name: &str, prefix: &str) -> Entity {
        let mut entity = Entity::new(name, prefix);
        entity.features.has_workflow = true;
        entity
    }

    #[test]
    fn bootstraps_defaults() {
        let store = InMemoryStore::new();
        let entity = create_entity(&store, workflow_entity("invoice", "INV")).unwrap();
        store
            .read(|t| {
                let names: Vec<_> = t.properties_of(entity.id).iter().map(|p| p.name.clone()).collect();
                assert_eq!(names, ["folio", "createdAt", "createdBy"]);
                assert_eq!(t.states_of(entity.id).len(), 3);
                assert_eq!(t.steps_of(entity.id).len(), 3);
                Ok(())
            })
            .unwrap();
        assert_eq!(entity.order, 1);
    }

    #[test]
    fn no_workflow_without_feature() {
        let store = InMemoryStore::new();
        let entity = create_entity(&store, Entity::new("note", "NOTE")).unwrap();
        assert!(store.read(|t| Ok(t.states_of(entity.id).is_empty())).unwrap());
    }

    #[test]
    fn identity_is_unique() {
        let store = InMemoryStore::new();
        create_entity(&store, Entity::new("invoice", "INV")).unwrap();

        let err = create_entity(&store, Entity::new("invoice", "BIL")).unwrap_err();
        assert!(err.to_string().contains("duplicate entity name"));

        let err = create_entity(&store, Entity::new("bill", "inv")).unwrap_err();
        assert!(err.to_string().contains("duplicate folio prefix"));

        let err = create_entity(&store, Entity::new("due date", "DUE")).unwrap_err();
        assert!(matches!(err, RowkeepError::Definition(_)));
    }

    #[test]
    fn name_is_frozen_once_rows_exist() {
        let store = InMemoryStore::new();
        let entity = create_entity(&store, Entity::new("invoice", "INV")).unwrap();
        let rename = EntityUpdate {
            name: Some("bill".into()),
            ..Default::default()
        };
        let renamed = update_entity(&store, entity.id, &rename).unwrap();
        assert_eq!(renamed.name, "bill");

        create::run(&store, &Requester::user(Uuid::new_v4()), &NewRow::new(entity.id)).unwrap();
        let back = EntityUpdate {
            name: Some("invoice".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_entity(&store, entity.id, &back),
            Err(RowkeepError::Definition(_))
        ));

        let retitle = EntityUpdate {
            title: Some("Bill".into()),
            ..Default::default()
        };
        assert_eq!(update_entity(&store, entity.id, &retitle).unwrap().title, "Bill");
    }

    #[test]
    fn enabling_workflow_bootstraps_it_once() {
        let store = InMemoryStore::new();
        let entity = create_entity(&store, Entity::new("task", "TSK")).unwrap();
        let enable = EntityUpdate {
            features: Some(EntityFeatures {
                has_workflow: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        update_entity(&store, entity.id, &enable).unwrap();
        update_entity(&store, entity.id, &enable).unwrap();
        assert_eq!(store.read(|t| Ok(t.states_of(entity.id).len())).unwrap(), 3);
    }

    #[test]
    fn delete_policy_blocks_or_cascades() {
        let store = InMemoryStore::new();
        let entity = create_entity(&store, Entity::new("invoice", "INV")).unwrap();
        let amount = Property::new(entity.id, "amount", "Amount", PropertyType::Number).with_order(1);
        store
            .transaction(|t| {
                t.properties.insert(amount.id, amount.clone());
                Ok(())
            })
            .unwrap();
        let input = NewRow::new(entity.id).value("amount", TypedValue::Number(3.0));
        create::run(&store, &Requester::user(Uuid::new_v4()), &input).unwrap();

        assert!(matches!(
            delete_entity(&store, entity.id, DeletePolicy::Block),
            Err(RowkeepError::Definition(_))
        ));
        delete_entity(&store, entity.id, DeletePolicy::Cascade).unwrap();
        store
            .read(|t| {
                assert!(t.entities.is_empty());
                assert!(t.rows.is_empty());
                assert!(t.values.is_empty());
                assert!(t.properties.is_empty());
                assert!(t.logs.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn referenced_entity_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let customer = create_entity(&store, Entity::new("customer", "CUS")).unwrap();
        let invoice = create_entity(&store, Entity::new("invoice", "INV")).unwrap();
        let folio = store
            .read(|t| Ok(t.properties_of(customer.id)[0].id))
            .unwrap();
        let reference = Property::new(invoice.id, "customer", "Customer", PropertyType::Entity)
            .with_order(1)
            .with_parent(folio);
        store
            .transaction(|t| {
                t.properties.insert(reference.id, reference.clone());
                Ok(())
            })
            .unwrap();
        let err = delete_entity(&store, customer.id, DeletePolicy::Cascade).unwrap_err();
        assert!(err.to_string().contains("referenced by property 'customer'"));
    }

    #[test]
    fn lists_by_order() {
        let store = InMemoryStore::new();
        let mut b = Entity::new("b", "B");
        b.order = 2;
        let mut a = Entity::new("a", "A");
        a.order = 5;
        create_entity(&store, a).unwrap();
        create_entity(&store, b).unwrap();
        let names: Vec<_> = list_entities(&store).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
