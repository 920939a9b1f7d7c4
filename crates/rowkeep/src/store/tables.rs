//! Persisted state layout.
//!
//! One [`Tables`] value is the whole database: every table of the data model,
//! keyed by id, plus a `generation` counter bumped on each commit. Backends
//! persist it as a unit, so a commit is all-or-nothing.
//!
//! Lookup helpers return records pre-sorted by their stored `order` (or folio),
//! so nothing downstream re-sorts for presentation.

use crate::catalog::Property;
use crate::error::{Result, RowkeepError};
use crate::model::{
    Entity, EntityId, LinkStatus, LinkedAccount, LinkedAccountId, PropertyId, Row, RowComment,
    RowId, RowLog, RowTag, StateId, StepId, Tag, TagId, TenantId, Value, ValueId,
};
use crate::workflow::{RowWorkflowTransition, WorkflowState, WorkflowStep};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tables {
    pub generation: u64,
    pub entities: BTreeMap<EntityId, Entity>,
    pub properties: BTreeMap<PropertyId, Property>,
    pub rows: BTreeMap<RowId, Row>,
    pub values: BTreeMap<ValueId, Value>,
    pub workflow_states: BTreeMap<StateId, WorkflowState>,
    pub workflow_steps: BTreeMap<StepId, WorkflowStep>,
    pub transitions: Vec<RowWorkflowTransition>,
    pub tags: BTreeMap<TagId, Tag>,
    pub row_tags: Vec<RowTag>,
    pub comments: Vec<RowComment>,
    pub logs: Vec<RowLog>,
    pub linked_accounts: BTreeMap<LinkedAccountId, LinkedAccount>,
}

impl Tables {
    // --- Entities & properties ---

    pub fn entity(&self, id: EntityId) -> Result<&Entity> {
        self.entities
            .get(&id)
            .ok_or_else(|| RowkeepError::not_found("Entity", id))
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.values().find(|e| e.name == name)
    }

    pub fn property(&self, id: PropertyId) -> Result<&Property> {
        self.properties
            .get(&id)
            .ok_or_else(|| RowkeepError::not_found("Property", id))
    }

    /// Properties of an entity ordered by `order`, then name.
    pub fn properties_of(&self, entity_id: EntityId) -> Vec<&Property> {
        let mut props: Vec<&Property> = self
            .properties
            .values()
            .filter(|p| p.entity_id == entity_id)
            .collect();
        props.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        props
    }

    // --- Rows & values ---

    pub fn row(&self, id: RowId) -> Result<&Row> {
        self.rows
            .get(&id)
            .ok_or_else(|| RowkeepError::not_found("Row", id))
    }

    pub fn row_mut(&mut self, id: RowId) -> Result<&mut Row> {
        self.rows
            .get_mut(&id)
            .ok_or_else(|| RowkeepError::not_found("Row", id))
    }

    pub fn rows_of(&self, entity_id: EntityId) -> impl Iterator<Item = &Row> {
        self.rows.values().filter(move |r| r.entity_id == entity_id)
    }

    /// Detail rows of a parent, ordered by folio.
    pub fn detail_rows_of(&self, parent: RowId) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self
            .rows
            .values()
            .filter(|r| r.parent_row_id == Some(parent))
            .collect();
        rows.sort_by_key(|r| r.folio);
        rows
    }

    pub fn values_of(&self, row_id: RowId) -> impl Iterator<Item = &Value> {
        self.values.values().filter(move |v| v.row_id == row_id)
    }

    pub fn value_for(&self, row_id: RowId, property_id: PropertyId) -> Option<&Value> {
        self.values
            .values()
            .find(|v| v.row_id == row_id && v.property_id == property_id)
    }

    pub fn value_for_mut(&mut self, row_id: RowId, property_id: PropertyId) -> Option<&mut Value> {
        self.values
            .values_mut()
            .find(|v| v.row_id == row_id && v.property_id == property_id)
    }

    /// Next folio in the `(tenant, entity, parent)` scope: max + 1, starting at 1.
    pub fn next_folio(
        &self,
        tenant: Option<TenantId>,
        entity: EntityId,
        parent: Option<RowId>,
    ) -> u32 {
        self.rows
            .values()
            .filter(|r| r.tenant_id == tenant && r.entity_id == entity && r.parent_row_id == parent)
            .map(|r| r.folio)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// `None` selects global rows. `Some(t)` selects rows of `t` and rows
    /// attached to a `Linked` account with `t` on either side.
    pub fn in_tenant_scope(&self, row: &Row, scope: Option<TenantId>) -> bool {
        match scope {
            None => row.tenant_id.is_none(),
            Some(tenant) => {
                row.tenant_id == Some(tenant)
                    || row
                        .linked_account_id
                        .and_then(|id| self.linked_accounts.get(&id))
                        .is_some_and(|link| link.status == LinkStatus::Linked && link.involves(tenant))
            }
        }
    }

    /// Remove a row with everything it owns: values, tags, comments, logs,
    /// transitions and detail rows (recursively). Returns the removed rows.
    pub fn remove_row_cascade(&mut self, row_id: RowId) -> Vec<Row> {
        let mut removed = Vec::new();
        let mut pending = vec![row_id];
        while let Some(id) = pending.pop() {
            let Some(row) = self.rows.remove(&id) else {
                continue;
            };
            pending.extend(
                self.rows
                    .values()
                    .filter(|r| r.parent_row_id == Some(id))
                    .map(|r| r.id),
            );
            removed.push(row);
        }

        let ids: HashSet<RowId> = removed.iter().map(|r| r.id).collect();
        self.values.retain(|_, v| !ids.contains(&v.row_id));
        self.row_tags.retain(|t| !ids.contains(&t.row_id));
        self.comments.retain(|c| !ids.contains(&c.row_id));
        self.logs
            .retain(|l| l.row_id.map_or(true, |r| !ids.contains(&r)));
        self.transitions.retain(|t| !ids.contains(&t.row_id));
        removed
    }

    // --- Workflow ---

    /// States of an entity ordered by `order`.
    pub fn states_of(&self, entity_id: EntityId) -> Vec<&WorkflowState> {
        let mut states: Vec<&WorkflowState> = self
            .workflow_states
            .values()
            .filter(|s| s.entity_id == entity_id)
            .collect();
        states.sort_by_key(|s| s.order);
        states
    }

    pub fn steps_of(&self, entity_id: EntityId) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self
            .workflow_steps
            .values()
            .filter(|s| s.entity_id == entity_id)
            .collect();
        steps.sort_by(|a, b| a.action.cmp(&b.action));
        steps
    }

    pub fn state_of_row(&self, row: &Row) -> Option<&WorkflowState> {
        row.workflow_state_id
            .and_then(|id| self.workflow_states.get(&id))
    }

    // --- Tags ---

    pub fn tags_of_row(&self, row_id: RowId) -> Vec<&Tag> {
        let mut tags: Vec<&Tag> = self
            .row_tags
            .iter()
            .filter(|rt| rt.row_id == row_id)
            .filter_map(|rt| self.tags.get(&rt.tag_id))
            .collect();
        tags.sort_by(|a, b| a.value.cmp(&b.value));
        tags
    }

    pub fn tag_by_value(&self, entity_id: EntityId, value: &str) -> Option<&Tag> {
        self.tags
            .values()
            .find(|t| t.entity_id == entity_id && t.value == value)
    }

    // --- Integrity ---

    /// Verify the constraints every commit must satisfy.
    ///
    /// A duplicate `(tenant, entity, parent, folio)` is reported as a
    /// concurrency conflict so the transaction can be retried on fresh state.
    pub fn check_constraints(&self) -> Result<()> {
        let mut folios = HashSet::new();
        for row in self.rows.values() {
            if !folios.insert((row.tenant_id, row.entity_id, row.parent_row_id, row.folio)) {
                return Err(RowkeepError::Concurrency(format!(
                    "folio {} already taken in its scope",
                    row.folio
                )));
            }
            if !self.entities.contains_key(&row.entity_id) {
                return Err(RowkeepError::Store(format!(
                    "row {} references missing entity {}",
                    row.id, row.entity_id
                )));
            }
            if let Some(parent) = row.parent_row_id {
                if !self.rows.contains_key(&parent) {
                    return Err(RowkeepError::Store(format!(
                        "row {} references missing parent {}",
                        row.id, parent
                    )));
                }
            }
        }

        let mut pairs = HashSet::new();
        for value in self.values.values() {
            if !pairs.insert((value.row_id, value.property_id)) {
                return Err(RowkeepError::Store(format!(
                    "row {} has more than one value for property {}",
                    value.row_id, value.property_id
                )));
            }
            if !self.rows.contains_key(&value.row_id) || !self.properties.contains_key(&value.property_id) {
                return Err(RowkeepError::Store(format!(
                    "value {} is orphaned",
                    value.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PropertyType;
    use crate::codec::StorageSlots;
    use crate::model::Actor;
    use chrono::Utc;
    use uuid::Uuid;

    fn with_entity() -> (Tables, Entity) {
        let mut tables = Tables::default();
        let entity = Entity::new("invoice", "INV");
        tables.entities.insert(entity.id, entity.clone());
        (tables, entity)
    }

    fn add_row(tables: &mut Tables, entity: EntityId, tenant: Option<TenantId>, parent: Option<RowId>) -> RowId {
        let mut row = Row::new(entity, tables.next_folio(tenant, entity, parent));
        row.tenant_id = tenant;
        row.parent_row_id = parent;
        let id = row.id;
        tables.rows.insert(id, row);
        id
    }

    #[test]
    fn folios_are_scoped() {
        let (mut tables, entity) = with_entity();
        let tenant = Some(Uuid::new_v4());

        let first = add_row(&mut tables, entity.id, tenant, None);
        add_row(&mut tables, entity.id, tenant, None);
        add_row(&mut tables, entity.id, None, None);
        let detail = add_row(&mut tables, entity.id, tenant, Some(first));

        assert_eq!(tables.next_folio(tenant, entity.id, None), 3);
        assert_eq!(tables.next_folio(None, entity.id, None), 2);
        assert_eq!(tables.rows[&detail].folio, 1);
        assert!(tables.check_constraints().is_ok());
    }

    #[test]
    fn duplicate_folio_is_a_conflict() {
        let (mut tables, entity) = with_entity();
        add_row(&mut tables, entity.id, None, None);
        let dup = Row::new(entity.id, 1);
        tables.rows.insert(dup.id, dup);
        assert!(tables.check_constraints().unwrap_err().is_conflict());
    }

    #[test]
    fn tenant_scope_follows_accepted_links() {
        let (mut tables, entity) = with_entity();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let link = LinkedAccount {
            id: Uuid::new_v4(),
            account_id: a,
            linked_account_id: b,
            status: LinkStatus::Pending,
            created_by: None,
            created_at: Utc::now(),
        };
        tables.linked_accounts.insert(link.id, link.clone());

        let row_id = add_row(&mut tables, entity.id, Some(a), None);
        tables.rows.get_mut(&row_id).unwrap().linked_account_id = Some(link.id);
        let row = tables.rows[&row_id].clone();

        assert!(tables.in_tenant_scope(&row, Some(a)));
        assert!(!tables.in_tenant_scope(&row, Some(b)));
        assert!(!tables.in_tenant_scope(&row, None));

        tables.linked_accounts.get_mut(&link.id).unwrap().status = LinkStatus::Linked;
        assert!(tables.in_tenant_scope(&row, Some(b)));
    }

    #[test]
    fn cascade_removes_owned_records() {
        let (mut tables, entity) = with_entity();
        let prop = Property::new(entity.id, "amount", "Amount", PropertyType::Number);
        tables.properties.insert(prop.id, prop.clone());

        let parent = add_row(&mut tables, entity.id, None, None);
        let child = add_row(&mut tables, entity.id, None, Some(parent));
        let grandchild = add_row(&mut tables, entity.id, None, Some(child));
        let other = add_row(&mut tables, entity.id, None, None);

        for row in [parent, child, grandchild, other] {
            let v = Value::new(row, prop.id, StorageSlots::default());
            tables.values.insert(v.id, v);
        }
        tables.comments.push(RowComment {
            id: Uuid::new_v4(),
            row_id: child,
            actor: Actor::User(Uuid::new_v4()),
            body: "hi".into(),
            created_at: Utc::now(),
        });

        let removed = tables.remove_row_cascade(parent);
        assert_eq!(removed.len(), 3);
        assert_eq!(tables.rows.len(), 1);
        assert_eq!(tables.values.len(), 1);
        assert!(tables.comments.is_empty());
        assert!(tables.check_constraints().is_ok());
    }

    #[test]
    fn duplicate_value_pair_is_rejected() {
        let (mut tables, entity) = with_entity();
        let prop = Property::new(entity.id, "amount", "Amount", PropertyType::Number);
        tables.properties.insert(prop.id, prop.clone());
        let row = add_row(&mut tables, entity.id, None, None);
        for _ in 0..2 {
            let v = Value::new(row, prop.id, StorageSlots::default());
            tables.values.insert(v.id, v);
        }
        assert!(matches!(tables.check_constraints(), Err(RowkeepError::Store(_))));
    }

    #[test]
    fn properties_come_back_ordered() {
        let (mut tables, entity) = with_entity();
        for (name, order) in [("c", 3), ("a", 1), ("b", 2)] {
            let p = Property::new(entity.id, name, name, PropertyType::Text).with_order(order);
            tables.properties.insert(p.id, p);
        }
        let names: Vec<_> = tables
            .properties_of(entity.id)
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
