//! Read projection of a row.
//!
//! [`RowView`] is what every row operation returns: the stored [`Row`] plus
//! its values resolved by property name, its workflow state, tags, detail
//! rows, and the requester's effective rights. [`RowView::to_json`] is the
//! API/webhook payload.

use crate::catalog::Schema;
use crate::codec::{to_json, TypedValue};
use crate::model::Row;
use crate::permission::{effective_access, Access, Requester};
use crate::store::Tables;
use crate::workflow::WorkflowState;
use serde_json::{json, Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub row: Row,
    /// Rendered folio, e.g. `INV-0001`.
    pub folio: String,
    /// Values keyed by property name; unset properties are absent.
    pub values: BTreeMap<String, TypedValue>,
    pub hidden: BTreeSet<String>,
    pub workflow_state: Option<WorkflowState>,
    pub tags: Vec<String>,
    pub details: Vec<RowView>,
    pub access: Access,
}

impl RowView {
    pub fn build(tables: &Tables, schema: &Schema, row: &Row, requester: &Requester) -> Self {
        let state = tables.state_of_row(row).cloned();
        let mut values = BTreeMap::new();
        let mut hidden = BTreeSet::new();
        for property in schema
            .properties
            .iter()
            .filter(|p| p.is_default || p.is_detail == row.is_detail())
        {
            if property.is_hidden {
                hidden.insert(property.name.clone());
            }
            if let Some(value) = schema.read_value(tables, row, property) {
                values.insert(property.name.clone(), value);
            }
        }

        let details = tables
            .detail_rows_of(row.id)
            .into_iter()
            .map(|d| RowView::build(tables, schema, d, requester))
            .collect();

        Self {
            folio: schema.entity.folio_string(row.folio),
            access: effective_access(row, state.as_ref(), requester),
            tags: tables
                .tags_of_row(row.id)
                .into_iter()
                .map(|t| t.value.clone())
                .collect(),
            row: row.clone(),
            values,
            hidden,
            workflow_state: state,
            details,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.row.id
    }

    pub fn value(&self, name: &str) -> Option<&TypedValue> {
        self.values.get(name)
    }

    /// `{ id, folio, createdAt, workflowState, <property>: value, details, tags }`.
    /// Hidden properties are left out.
    pub fn to_json(&self) -> Json {
        let mut obj = Map::new();
        obj.insert("id".into(), json!(self.row.id));
        obj.insert("folio".into(), json!(self.folio));
        obj.insert("createdAt".into(), json!(self.row.created_at.to_rfc3339()));
        obj.insert(
            "workflowState".into(),
            self.workflow_state
                .as_ref()
                .map_or(Json::Null, |s| json!(s.name)),
        );
        for (name, value) in &self.values {
            if self.hidden.contains(name) || obj.contains_key(name) {
                continue;
            }
            obj.insert(name.clone(), to_json(value));
        }
        if !self.row.is_detail() {
            obj.insert(
                "details".into(),
                Json::Array(self.details.iter().map(RowView::to_json).collect()),
            );
            obj.insert("tags".into(), json!(self.tags));
        }
        Json::Object(obj)
    }
}
