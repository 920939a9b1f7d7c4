mod common;

use rowkeep::catalog::{Property, PropertyType};
use rowkeep::codec::TypedValue;
use rowkeep::commands::create::NewRow;
use rowkeep::commands::update::RowUpdate;
use rowkeep::commands::{create, get, properties, update};
use rowkeep::error::RowkeepError;
use rowkeep::store::memory::InMemoryStore;
use rowkeep::store::DataStore;

#[test]
fn create_then_update_keeps_identity() {
    let store = InMemoryStore::new();
    let inv = common::invoices(&store, false);

    let created = create::run(&store, &inv.owner, &inv.invoice(500.0, "To Paid")).unwrap();
    assert_eq!(created.folio, "INV-0001");

    let status = inv.property("status");
    let value_id = |row_id| {
        store
            .read(|t| Ok(t.value_for(row_id, status.id).map(|v| v.id)))
            .unwrap()
    };
    let before = value_id(created.row.id);
    assert!(before.is_some());

    let updated = update::run(
        &store,
        &inv.owner,
        created.row.id,
        &RowUpdate::default().set("status", TypedValue::Select("Paid".into())),
    )
    .unwrap();

    assert_eq!(updated.row.id, created.row.id);
    assert_eq!(updated.folio, "INV-0001");
    assert_eq!(updated.value("status"), Some(&TypedValue::Select("Paid".into())));
    assert_eq!(updated.value("amount"), Some(&TypedValue::Number(500.0)));
    assert_eq!(value_id(created.row.id), before);
}

#[test]
fn missing_required_value_names_the_property() {
    let store = InMemoryStore::new();
    let inv = common::invoices(&store, false);
    let input = NewRow::new(inv.entity.id)
        .in_tenant(inv.tenant)
        .value("status", TypedValue::Select("Paid".into()));

    match create::run(&store, &inv.owner, &input) {
        Err(RowkeepError::Validation { property, .. }) => assert_eq!(property, "amount"),
        other => panic!("expected a validation error, got {:?}", other.map(|v| v.folio)),
    }
    assert_eq!(store.read(|t| Ok(t.rows.len())).unwrap(), 0);
}

#[test]
fn property_names_reject_spaces_and_hyphens() {
    let store = InMemoryStore::new();
    let inv = common::invoices(&store, false);
    for name in ["due date", "due-date"] {
        let result = properties::add_property(
            &store,
            Property::new(inv.entity.id, name, name, PropertyType::Date),
        );
        assert!(matches!(result, Err(RowkeepError::Definition(_))), "{}", name);
    }
}

#[test]
fn folios_are_scoped_per_tenant() {
    let store = InMemoryStore::new();
    let inv = common::invoices(&store, false);
    create::run(&store, &inv.owner, &inv.invoice(1.0, "Paid")).unwrap();
    let second = create::run(&store, &inv.owner, &inv.invoice(2.0, "Paid")).unwrap();
    assert_eq!(second.folio, "INV-0002");

    let other_tenant = uuid::Uuid::new_v4();
    let other = rowkeep::permission::Requester::user(uuid::Uuid::new_v4()).in_tenant(other_tenant);
    let first_elsewhere = create::run(
        &store,
        &other,
        &NewRow::new(inv.entity.id)
            .in_tenant(other_tenant)
            .value("amount", TypedValue::Number(3.0)),
    )
    .unwrap();
    assert_eq!(first_elsewhere.folio, "INV-0001");

    let page = get::get_rows(
        &store,
        &inv.owner,
        &get::RowsQuery::new(inv.entity.id).in_tenant(inv.tenant),
    )
    .unwrap();
    assert_eq!(page.total, 2);
}
