use super::create::NewDetailRow;
use super::helpers::{
    check_names, clear_value, create_detail_rows, log, remove_detail_rows, resolve_tags,
    set_row_tags, store_value,
};
use crate::catalog::Schema;
use crate::codec::{MediaDescriptor, TypedValue};
use crate::error::{Result, RowkeepError};
use crate::model::{RowAction, RowGrants, RowId, Visibility};
use crate::permission::{can_change_visibility, effective_access, Requester, Right};
use crate::store::DataStore;
use crate::view::RowView;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::info;

/// Changes to apply to an existing row. Every field left at its default
/// leaves the row untouched.
#[derive(Debug, Clone, Default)]
pub struct RowUpdate {
    /// `Some` upserts the value, `None` clears it.
    pub values: BTreeMap<String, Option<TypedValue>>,
    /// `None` keeps the detail rows; `Some` replaces all of them, so
    /// `Some(vec![])` removes every detail row.
    pub details: Option<Vec<NewDetailRow>>,
    pub visibility: Option<Visibility>,
    pub grants: Option<RowGrants>,
    /// `Some` replaces the row's tag set.
    pub tags: Option<Vec<String>>,
}

impl RowUpdate {
    pub fn set(mut self, name: &str, value: TypedValue) -> Self {
        self.values.insert(name.to_string(), Some(value));
        self
    }

    pub fn clear(mut self, name: &str) -> Self {
        self.values.insert(name.to_string(), None);
        self
    }

    pub fn replace_details(mut self, details: Vec<NewDetailRow>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn visible_to(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn granting(mut self, grants: RowGrants) -> Self {
        self.grants = Some(grants);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    fn changes_visibility(&self) -> bool {
        self.visibility.is_some() || self.grants.is_some()
    }
}

pub fn run<S: DataStore>(
    store: &S,
    requester: &Requester,
    row_id: RowId,
    update: &RowUpdate,
) -> Result<RowView> {
    let view = store.transaction(|tables| {
        let mut row = tables.row(row_id)?.clone();
        let schema = Schema::load(tables, row.entity_id)?;
        effective_access(&row, tables.state_of_row(&row), requester).require(Right::Update, &row)?;

        if update.changes_visibility() && !can_change_visibility(&row, requester) {
            return Err(RowkeepError::Unauthorized(format!(
                "only the creator may change the visibility of row {}",
                row.id
            )));
        }
        if update.details.is_some() && row.is_detail() {
            return Err(RowkeepError::validation(
                "details",
                "detail rows cannot own detail rows",
            ));
        }
        check_names(&schema, update.values.keys(), row.is_detail())?;
        let tag_ids = match &update.tags {
            Some(tags) => Some(resolve_tags(tables, &schema.entity, tags)?),
            None => None,
        };

        for (name, value) in &update.values {
            let property = schema
                .property(name)
                .ok_or_else(|| RowkeepError::validation(name, "unknown property"))?;
            match value {
                Some(v) => store_value(tables, &schema, &mut row, property, v)?,
                None => clear_value(tables, &schema, &mut row, property)?,
            }
        }

        if let Some(visibility) = &update.visibility {
            row.visibility = visibility.clone();
        }
        if let Some(grants) = update.grants {
            row.grants = grants;
        }
        row.updated_at = Utc::now();
        tables.rows.insert(row.id, row.clone());

        match &update.details {
            Some(details) => {
                remove_detail_rows(tables, row.id);
                create_detail_rows(tables, &schema, &row, details)?;
            }
            None if update.changes_visibility() => {
                for detail in tables.rows.values_mut().filter(|r| r.parent_row_id == Some(row.id)) {
                    detail.visibility = row.visibility.clone();
                    detail.grants = row.grants;
                }
            }
            None => {}
        }
        if let Some(ids) = &tag_ids {
            set_row_tags(tables, row.id, ids);
        }

        let changed: Vec<&str> = update.values.keys().map(String::as_str).collect();
        let details = (!changed.is_empty()).then(|| changed.join(", "));
        log(tables, row.entity_id, Some(row.id), requester.actor, RowAction::Updated, details);

        Ok(RowView::build(tables, &schema, &row, requester))
    })?;

    info!(
        target: "rowkeep::rows",
        row_id = %view.row.id,
        folio = %view.folio,
        values = update.values.len(),
        details_replaced = update.details.is_some(),
        "Row updated"
    );
    Ok(view)
}

/// Swap the media of already-written values for externally stored copies.
/// Used after a committed write; the view of `row_id` is rebuilt for `requester`.
pub fn store_media_refs<S: DataStore>(
    store: &S,
    requester: &Requester,
    row_id: RowId,
    media: &[(RowId, String, Vec<MediaDescriptor>)],
) -> Result<RowView> {
    store.transaction(|tables| {
        let top = tables.row(row_id)?.clone();
        let schema = Schema::load(tables, top.entity_id)?;
        for (target, name, descriptors) in media {
            let mut row = tables.row(*target)?.clone();
            let property = schema
                .property(name)
                .ok_or_else(|| RowkeepError::validation(name, "unknown property"))?;
            store_value(tables, &schema, &mut row, property, &TypedValue::Media(descriptors.clone()))?;
            tables.rows.insert(row.id, row);
        }
        let top = tables.row(row_id)?;
        Ok(RowView::build(tables, &schema, top, requester))
    })
}
