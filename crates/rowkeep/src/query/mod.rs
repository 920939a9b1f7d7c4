//! # Query/Filter Builder
//!
//! Turns declarative list parameters into a [`RowCondition`] the row scan
//! applies, and orders the survivors.
//!
//! ## Resolution
//!
//! Each [`Filter`] names a field. [`build_condition`] resolves it once:
//!
//! - `workflowState` / `workflowStateId`: the row's current state
//! - a property name: its static column or dynamic value, via the [`Schema`]
//! - anything else: ignored (logged at debug level), never an error
//!
//! ## Matching
//!
//! A row matches when every filter matches, it carries every requested tag,
//! and the search text (if any) appears in its rendered folio or in the
//! display form of a non-hidden property value. Search is a scan, not an
//! index lookup.

mod filter;
mod sort;

pub use filter::{Filter, FilterOp, FilterTarget, ResolvedFilter};
pub use sort::{sort_rows, SortDirection, SortSpec};

use crate::catalog::{FieldBinding, Schema};
use crate::codec::display;
use crate::model::Row;
use crate::store::Tables;
use crate::view::RowView;
use tracing::debug;

/// Compiled list condition for one entity.
#[derive(Debug, Clone, Default)]
pub struct RowCondition {
    pub filters: Vec<ResolvedFilter>,
    /// The row must carry all of these.
    pub tags: Vec<String>,
    /// Lower-cased search text.
    pub search: Option<String>,
}

pub fn build_condition(
    schema: &Schema,
    filters: &[Filter],
    tags: &[String],
    search: Option<&str>,
) -> RowCondition {
    let filters = filters
        .iter()
        .filter_map(|f| {
            let (target, property) = match f.field.as_str() {
                "workflowState" => (FilterTarget::WorkflowState, None),
                "workflowStateId" => (FilterTarget::WorkflowStateId, None),
                name => match (schema.property(name), schema.binding(name)) {
                    (Some(p), Some(FieldBinding::Static(field))) => {
                        (FilterTarget::Static(field.clone()), Some(p.clone()))
                    }
                    (Some(p), Some(FieldBinding::Dynamic(id))) => {
                        (FilterTarget::Dynamic(*id), Some(p.clone()))
                    }
                    _ => {
                        debug!(
                            target: "rowkeep::query",
                            entity = %schema.entity.name,
                            field = %name,
                            "Ignoring unknown filter field"
                        );
                        return None;
                    }
                },
            };
            Some(ResolvedFilter {
                target,
                property,
                op: f.op,
                operand: f.value.clone(),
            })
        })
        .collect();

    RowCondition {
        filters,
        tags: tags.to_vec(),
        search: search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase),
    }
}

impl RowCondition {
    pub fn matches(&self, tables: &Tables, schema: &Schema, row: &Row) -> bool {
        let filters_ok = self.filters.iter().all(|f| match &f.property {
            Some(p) => f.matches_value(schema.read_value(tables, row, p).as_ref()),
            None => f.matches_state(tables.state_of_row(row)),
        });
        if !filters_ok {
            return false;
        }

        if !self.tags.is_empty() {
            let carried = tables.tags_of_row(row.id);
            if !self
                .tags
                .iter()
                .all(|wanted| carried.iter().any(|t| &t.value == wanted))
            {
                return false;
            }
        }

        match &self.search {
            None => true,
            Some(needle) => {
                schema
                    .entity
                    .folio_string(row.folio)
                    .to_lowercase()
                    .contains(needle)
                    || schema.properties.iter().filter(|p| !p.is_hidden).any(|p| {
                        schema
                            .read_value(tables, row, p)
                            .is_some_and(|v| display(&v).to_lowercase().contains(needle))
                    })
            }
        }
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub page_size: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 25,
        }
    }
}

impl Page {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone)]
pub struct RowPage {
    pub rows: Vec<RowView>,
    /// Matching rows across all pages.
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl RowPage {
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Property, PropertyType};
    use crate::model::Entity;

    fn schema() -> Schema {
        let entity = Entity::new("invoice", "INV");
        let amount = Property::new(entity.id, "amount", "Amount", PropertyType::Number);
        let mut props = crate::catalog::default_properties(entity.id);
        props.push(amount);
        Schema::new(entity, props)
    }

    #[test]
    fn offsets_saturate() {
        assert_eq!(Page::new(3, 25).offset(), 50);
        assert_eq!(Page::new(0, 25).offset(), 0);
        assert_eq!(Page::new(usize::MAX, 100).offset(), usize::MAX);
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let s = schema();
        let cond = build_condition(
            &s,
            &[
                Filter::equals("amount", "5"),
                Filter::equals("nope", "x"),
                Filter::equals("workflowState", "pending"),
                Filter::equals("folio", "INV-0001"),
            ],
            &[],
            None,
        );
        assert_eq!(cond.filters.len(), 3);
        assert!(matches!(cond.filters[0].target, FilterTarget::Dynamic(_)));
        assert_eq!(cond.filters[1].target, FilterTarget::WorkflowState);
        assert!(matches!(
            cond.filters[2].target,
            FilterTarget::Static(crate::catalog::StaticField::Folio)
        ));
    }

    #[test]
    fn blank_search_is_no_search() {
        let cond = build_condition(&schema(), &[], &[], Some("   "));
        assert!(cond.search.is_none());
        let cond = build_condition(&schema(), &[], &[], Some(" INV "));
        assert_eq!(cond.search.as_deref(), Some("inv"));
    }

    #[test]
    fn page_math() {
        assert_eq!(Page::new(0, 0), Page::new(1, 1));
        assert_eq!(Page::new(3, 10).offset(), 20);
        let page = RowPage {
            rows: vec![],
            total: 21,
            page: 1,
            page_size: 10,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
