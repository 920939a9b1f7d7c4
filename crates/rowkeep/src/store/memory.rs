use super::mem_backend::MemBackend;
use super::Store;

pub type InMemoryStore = Store<MemBackend>;

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Store::with_backend(MemBackend::new())
    }
}

// --- Test Fixtures ---

#[cfg(any(test, feature = "test_utils"))]
pub mod fixtures {
    use super::*;
    use crate::catalog::{default_properties, Property, PropertyType};
    use crate::commands::create::NewRow;
    use crate::commands::get::RowsQuery;
    use crate::codec::TypedValue;
    use crate::model::{
        Entity, LinkStatus, LinkedAccount, LinkedAccountId, RowId, Tag, TenantId, UserId,
        VisibilityClass,
    };
    use crate::permission::Requester;
    use crate::store::DataStore;
    use crate::workflow::{default_workflow, WorkflowState, WorkflowStep};
    use chrono::Utc;
    use uuid::Uuid;

    /// An `invoice` entity with `amount` and `status`, owned by one user of one tenant.
    pub struct StoreFixture {
        pub store: InMemoryStore,
        pub entity: Entity,
        pub tenant: TenantId,
        pub owner_id: UserId,
    }

    impl StoreFixture {
        pub fn invoices() -> Self {
            let store = InMemoryStore::new();
            let mut entity = Entity::new("invoice", "INV");
            entity.default_visibility = VisibilityClass::Tenant;
            entity.features.has_tags = true;
            entity.features.has_comments = true;

            let mut properties = default_properties(entity.id);
            properties.push(
                Property::new(entity.id, "amount", "Amount", PropertyType::Number)
                    .required()
                    .with_order(1),
            );
            properties.push(
                Property::new(entity.id, "status", "Status", PropertyType::Select)
                    .with_order(2)
                    .with_options([("To Paid", None), ("Paid", None)]),
            );

            store
                .transaction(|t| {
                    t.entities.insert(entity.id, entity.clone());
                    for p in &properties {
                        t.properties.insert(p.id, p.clone());
                    }
                    Ok(())
                })
                .unwrap();

            Self {
                store,
                entity,
                tenant: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
            }
        }

        /// Adds a detail `line` text property.
        pub fn with_lines(self) -> Self {
            self.add_property(
                Property::new(self.entity.id, "line", "Line", PropertyType::Text)
                    .with_order(10)
                    .detail(),
            );
            self
        }

        /// Turns the workflow on with the default pending/completed/cancelled states.
        pub fn with_workflow(mut self) -> Self {
            self.entity.features.has_workflow = true;
            let entity = self.entity.clone();
            let (states, steps) = default_workflow(entity.id);
            self.store
                .transaction(|t| {
                    t.entities.insert(entity.id, entity.clone());
                    for s in &states {
                        t.workflow_states.insert(s.id, s.clone());
                    }
                    for s in &steps {
                        t.workflow_steps.insert(s.id, s.clone());
                    }
                    Ok(())
                })
                .unwrap();
            self
        }

        pub fn with_tags(self, values: &[&str]) -> Self {
            let entity_id = self.entity.id;
            self.store
                .transaction(|t| {
                    for value in values {
                        let tag = Tag {
                            id: Uuid::new_v4(),
                            entity_id,
                            value: value.to_string(),
                            color: None,
                            created_at: Utc::now(),
                        };
                        t.tags.insert(tag.id, tag);
                    }
                    Ok(())
                })
                .unwrap();
            self
        }

        pub fn owner(&self) -> Requester {
            Requester::user(self.owner_id).in_tenant(self.tenant)
        }

        pub fn invoice(&self, amount: f64, status: &str) -> NewRow {
            NewRow::new(self.entity.id)
                .in_tenant(self.tenant)
                .value("amount", TypedValue::Number(amount))
                .value("status", TypedValue::Select(status.to_string()))
        }

        pub fn query(&self) -> RowsQuery {
            RowsQuery::new(self.entity.id).in_tenant(self.tenant)
        }

        /// Inserts a property without going through the catalog checks.
        pub fn add_property(&self, property: Property) {
            self.store
                .transaction(|t| {
                    t.properties.insert(property.id, property.clone());
                    Ok(())
                })
                .unwrap();
        }

        pub fn property(&self, name: &str) -> Property {
            let entity_id = self.entity.id;
            self.store
                .read(|t| {
                    Ok(t.properties_of(entity_id)
                        .into_iter()
                        .find(|p| p.name == name)
                        .cloned())
                })
                .unwrap()
                .unwrap_or_else(|| panic!("no property named {}", name))
        }

        pub fn row_count(&self) -> usize {
            self.store.read(|t| Ok(t.rows.len())).unwrap()
        }

        pub fn state(&self, name: &str) -> WorkflowState {
            let entity_id = self.entity.id;
            self.store
                .read(|t| {
                    Ok(t.states_of(entity_id)
                        .into_iter()
                        .find(|s| s.name == name)
                        .cloned())
                })
                .unwrap()
                .unwrap_or_else(|| panic!("no state named {}", name))
        }

        pub fn step(&self, action: &str) -> WorkflowStep {
            let entity_id = self.entity.id;
            self.store
                .read(|t| {
                    Ok(t.steps_of(entity_id)
                        .into_iter()
                        .find(|s| s.action == action)
                        .cloned())
                })
                .unwrap()
                .unwrap_or_else(|| panic!("no step named {}", action))
        }

        /// Puts a row straight into a state, bypassing steps.
        pub fn move_to_state(&self, row_id: RowId, name: &str) {
            let state = self.state(name);
            self.store
                .transaction(|t| {
                    t.row_mut(row_id)?.workflow_state_id = Some(state.id);
                    Ok(())
                })
                .unwrap();
        }

        /// An accepted link from the fixture tenant to `partner`.
        pub fn accepted_link(&self, partner: TenantId) -> LinkedAccountId {
            let link = LinkedAccount {
                id: Uuid::new_v4(),
                account_id: self.tenant,
                linked_account_id: partner,
                status: LinkStatus::Linked,
                created_by: None,
                created_at: Utc::now(),
            };
            self.store
                .transaction(|t| {
                    t.linked_accounts.insert(link.id, link.clone());
                    Ok(())
                })
                .unwrap();
            link.id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::StoreFixture;
    use super::*;
    use crate::store::DataStore;

    #[test]
    fn new_store_is_empty() {
        let store = InMemoryStore::default();
        let (generation, rows) = store.read(|t| Ok((t.generation, t.rows.len()))).unwrap();
        assert_eq!(generation, 0);
        assert_eq!(rows, 0);
    }

    #[test]
    fn fixtures_build_a_usable_entity() {
        let fx = StoreFixture::invoices()
            .with_lines()
            .with_workflow()
            .with_tags(&["urgent"]);

        let names: Vec<_> = fx
            .store
            .read(|t| {
                Ok(t.properties_of(fx.entity.id)
                    .into_iter()
                    .map(|p| p.name.clone())
                    .collect())
            })
            .unwrap();
        assert_eq!(
            names,
            ["folio", "createdAt", "createdBy", "amount", "status", "line"]
        );
        assert!(fx.property("line").is_detail);
        assert_eq!(fx.state("pending").order, 1);
        assert_eq!(fx.step("complete").to_state_id, fx.state("completed").id);
        assert!(fx
            .store
            .read(|t| Ok(t.entity(fx.entity.id)?.features.has_workflow))
            .unwrap());
        assert!(fx
            .store
            .read(|t| Ok(t.tag_by_value(fx.entity.id, "urgent").is_some()))
            .unwrap());
    }
}
