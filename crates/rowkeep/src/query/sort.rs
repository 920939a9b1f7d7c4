use crate::catalog::Schema;
use crate::codec::{display, TypedValue};
use crate::model::Row;
use crate::store::Tables;
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Sort by each resolvable spec in turn, then by creation time and folio,
/// newest first. Unresolvable field names are skipped.
pub fn sort_rows(tables: &Tables, schema: &Schema, rows: &mut [&Row], specs: &[SortSpec]) {
    let resolved: Vec<(&SortSpec, Option<&crate::catalog::Property>)> = specs
        .iter()
        .filter_map(|spec| {
            if spec.field == "workflowState" {
                return Some((spec, None));
            }
            match schema.property(&spec.field) {
                Some(p) => Some((spec, Some(p))),
                None => {
                    debug!(target: "rowkeep::query", field = %spec.field, "Ignoring unknown sort field");
                    None
                }
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        for (spec, property) in &resolved {
            let ord = match property {
                Some(p) => compare_values(
                    schema.read_value(tables, a, p).as_ref(),
                    schema.read_value(tables, b, p).as_ref(),
                ),
                None => {
                    let order = |r: &Row| tables.state_of_row(r).map(|s| s.order);
                    order(*a).cmp(&order(*b))
                }
            };
            let ord = match spec.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.folio.cmp(&a.folio))
    });
}

/// Missing values sort first in ascending order.
fn compare_values(a: Option<&TypedValue>, b: Option<&TypedValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(TypedValue::Number(x)), Some(TypedValue::Number(y))) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Some(TypedValue::Date(x)), Some(TypedValue::Date(y))) => x.cmp(y),
        (Some(TypedValue::Boolean(x)), Some(TypedValue::Boolean(y))) => x.cmp(y),
        (Some(x), Some(y)) => display(x).to_lowercase().cmp(&display(y).to_lowercase()),
    }
}
