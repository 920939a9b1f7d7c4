use super::helpers::log;
use crate::catalog::Schema;
use crate::error::Result;
use crate::model::{RowAction, RowId};
use crate::permission::{effective_access, Requester, Right};
use crate::store::DataStore;
use crate::view::RowView;
use tracing::info;

/// Delete a row with its values, detail rows, tags, comments, logs and
/// transition history. Returns the row as it was before deletion.
///
/// The cascade happens in one transaction; a failure anywhere leaves the row
/// and all of its children in place.
pub fn run<S: DataStore>(store: &S, requester: &Requester, row_id: RowId) -> Result<RowView> {
    let (view, removed) = store.transaction(|tables| {
        let row = tables.row(row_id)?.clone();
        let schema = Schema::load(tables, row.entity_id)?;
        effective_access(&row, tables.state_of_row(&row), requester).require(Right::Delete, &row)?;

        let view = RowView::build(tables, &schema, &row, requester);
        let removed = tables.remove_row_cascade(row.id).len();
        log(
            tables,
            row.entity_id,
            None,
            requester.actor,
            RowAction::Deleted,
            Some(view.folio.clone()),
        );
        Ok((view, removed))
    })?;

    info!(
        target: "rowkeep::rows",
        row_id = %view.row.id,
        folio = %view.folio,
        removed_rows = removed,
        "Row deleted"
    );
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TypedValue;
    use crate::commands::create::{self, NewDetailRow};
    use crate::error::RowkeepError;
    use crate::model::RowGrants;
    use crate::store::memory::fixtures::StoreFixture;
    use uuid::Uuid;

    #[test]
    fn cascades_to_everything_the_row_owns() {
        let fx = StoreFixture::invoices().with_lines().with_tags(&["urgent"]);
        let input = fx
            .invoice(1.0, "Paid")
            .tag("urgent")
            .detail(NewDetailRow::default().value("line", TypedValue::Text("a".into())));
        let created = create::run(&fx.store, &fx.owner(), &input).unwrap();
        let keep = create::run(&fx.store, &fx.owner(), &fx.invoice(2.0, "Paid")).unwrap();

        let deleted = run(&fx.store, &fx.owner(), created.row.id).unwrap();
        assert_eq!(deleted.folio, "INV-0001");
        assert_eq!(deleted.details.len(), 1);

        fx.store
            .read(|t| {
                assert_eq!(t.rows.len(), 1);
                assert!(t.rows.contains_key(&keep.row.id));
                assert!(t.values.values().all(|v| v.row_id == keep.row.id));
                assert!(t.row_tags.is_empty());
                assert!(t.logs.iter().all(|l| l.row_id != Some(created.row.id)));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn deletion_leaves_an_entity_level_log() {
        let fx = StoreFixture::invoices();
        let created = create::run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Paid")).unwrap();
        run(&fx.store, &fx.owner(), created.row.id).unwrap();
        let logs = fx.store.read(|t| Ok(t.logs.clone())).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, RowAction::Deleted);
        assert_eq!(logs[0].row_id, None);
        assert_eq!(logs[0].details.as_deref(), Some("INV-0001"));
    }

    #[test]
    fn requires_delete_right() {
        let fx = StoreFixture::invoices();
        let created = create::run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Paid")).unwrap();
        let colleague = Requester::user(Uuid::new_v4()).in_tenant(fx.tenant);
        assert!(matches!(
            run(&fx.store, &colleague, created.row.id),
            Err(RowkeepError::Unauthorized(_))
        ));
        let stranger = Requester::user(Uuid::new_v4());
        assert!(matches!(
            run(&fx.store, &stranger, created.row.id),
            Err(RowkeepError::NotFound { .. })
        ));
        assert_eq!(fx.row_count(), 1);
    }

    #[test]
    fn granted_reader_may_delete() {
        let fx = StoreFixture::invoices();
        let input = fx.invoice(1.0, "Paid").granting(RowGrants {
            can_delete: true,
            ..Default::default()
        });
        let created = create::run(&fx.store, &fx.owner(), &input).unwrap();
        let colleague = Requester::user(Uuid::new_v4()).in_tenant(fx.tenant);
        run(&fx.store, &colleague, created.row.id).unwrap();
        assert_eq!(fx.row_count(), 0);
    }

    #[test]
    fn cancelled_rows_may_be_deleted_completed_may_not() {
        let fx = StoreFixture::invoices().with_workflow();
        let a = create::run(&fx.store, &fx.owner(), &fx.invoice(1.0, "Paid")).unwrap();
        let b = create::run(&fx.store, &fx.owner(), &fx.invoice(2.0, "Paid")).unwrap();
        fx.move_to_state(a.row.id, "completed");
        fx.move_to_state(b.row.id, "cancelled");
        assert!(matches!(
            run(&fx.store, &fx.owner(), a.row.id),
            Err(RowkeepError::Unauthorized(_))
        ));
        run(&fx.store, &fx.owner(), b.row.id).unwrap();
    }

    #[test]
    fn missing_row_is_not_found() {
        let fx = StoreFixture::invoices();
        assert!(matches!(
            run(&fx.store, &fx.owner(), Uuid::new_v4()),
            Err(RowkeepError::NotFound { .. })
        ));
    }
}
