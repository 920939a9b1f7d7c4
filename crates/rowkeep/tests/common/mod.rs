#![allow(dead_code)]

use rowkeep::catalog::{Property, PropertyType};
use rowkeep::codec::TypedValue;
use rowkeep::commands::create::NewRow;
use rowkeep::commands::{entities, properties};
use rowkeep::model::{Entity, TenantId, VisibilityClass};
use rowkeep::permission::Requester;
use rowkeep::store::DataStore;
use uuid::Uuid;

/// The `invoice` entity: `amount` (required number) and `status` (select).
pub struct Invoices<'a, S: DataStore> {
    pub store: &'a S,
    pub entity: Entity,
    pub tenant: TenantId,
    pub owner: Requester,
}

pub fn invoices<S: DataStore>(store: &S, has_workflow: bool) -> Invoices<'_, S> {
    let mut entity = Entity::new("invoice", "INV");
    entity.default_visibility = VisibilityClass::Tenant;
    entity.features.has_workflow = has_workflow;
    let entity = entities::create_entity(store, entity).unwrap();

    properties::add_property(
        store,
        Property::new(entity.id, "amount", "Amount", PropertyType::Number).required(),
    )
    .unwrap();
    properties::add_property(
        store,
        Property::new(entity.id, "status", "Status", PropertyType::Select)
            .with_options([("To Paid", None), ("Paid", None)]),
    )
    .unwrap();

    let tenant = Uuid::new_v4();
    Invoices {
        store,
        entity,
        tenant,
        owner: Requester::user(Uuid::new_v4()).in_tenant(tenant),
    }
}

impl<S: DataStore> Invoices<'_, S> {
    pub fn invoice(&self, amount: f64, status: &str) -> NewRow {
        NewRow::new(self.entity.id)
            .in_tenant(self.tenant)
            .value("amount", TypedValue::Number(amount))
            .value("status", TypedValue::Select(status.to_string()))
    }

    pub fn member(&self) -> Requester {
        Requester::user(Uuid::new_v4()).in_tenant(self.tenant)
    }

    pub fn property(&self, name: &str) -> Property {
        properties::get_properties(self.store, self.entity.id)
            .unwrap()
            .into_iter()
            .find(|p| p.name == name)
            .unwrap()
    }
}
