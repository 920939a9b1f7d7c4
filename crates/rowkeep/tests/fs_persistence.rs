mod common;

use rowkeep::codec::TypedValue;
use rowkeep::commands::update::RowUpdate;
use rowkeep::commands::{create, delete, get, update};
use rowkeep::store::fs::FileStore;
use rowkeep::store::DataStore;
use std::fs;

fn leftover_tmp_files(dir: &std::path::Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

#[test]
fn rows_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path());
    let inv = common::invoices(&store, true);

    let row = create::run(&store, &inv.owner, &inv.invoice(500.0, "To Paid")).unwrap();
    update::run(
        &store,
        &inv.owner,
        row.row.id,
        &RowUpdate::default().set("status", TypedValue::Select("Paid".into())),
    )
    .unwrap();

    let reopened = FileStore::open(dir.path());
    let view = get::get_row(&reopened, &inv.owner, row.row.id, Some(inv.tenant)).unwrap();
    assert_eq!(view.folio, "INV-0001");
    assert_eq!(view.value("status"), Some(&TypedValue::Select("Paid".into())));
    assert_eq!(view.workflow_state.map(|s| s.name), Some("pending".to_string()));

    assert!(dir.path().join("rowkeep.json").exists());
    assert!(leftover_tmp_files(dir.path()).is_empty());
}

#[test]
fn deletes_are_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path());
    let inv = common::invoices(&store, false);

    let keep = create::run(&store, &inv.owner, &inv.invoice(1.0, "Paid")).unwrap();
    let gone = create::run(&store, &inv.owner, &inv.invoice(2.0, "Paid")).unwrap();
    delete::run(&store, &inv.owner, gone.row.id).unwrap();

    let reopened = FileStore::open(dir.path());
    let ids: Vec<_> = reopened
        .read(|t| Ok(t.rows.keys().copied().collect()))
        .unwrap();
    assert_eq!(ids, vec![keep.row.id]);
    let values_left = reopened
        .read(|t| Ok(t.values.values().all(|v| v.row_id == keep.row.id)))
        .unwrap();
    assert!(values_left);
    assert!(leftover_tmp_files(dir.path()).is_empty());
}

#[test]
fn failed_writes_leave_the_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path());
    let inv = common::invoices(&store, false);
    let before = fs::read_to_string(dir.path().join("rowkeep.json")).unwrap();

    assert!(create::run(&store, &inv.owner, &inv.invoice(1.0, "Void")).is_err());

    let after = fs::read_to_string(dir.path().join("rowkeep.json")).unwrap();
    assert_eq!(before, after);
}
