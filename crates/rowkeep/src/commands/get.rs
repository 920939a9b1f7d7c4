//! Row reads: single fetch, paginated listing and counting.
//!
//! Every read takes a tenant scope. `None` selects global rows; `Some(t)`
//! selects the rows of `t` plus rows shared with `t` through an accepted
//! linked account. Listing applies, in order: the scope, the requester's
//! [`VisibilityPredicate`], the compiled [`RowCondition`], sorting, and the
//! page window. Only top-level rows are listed; detail rows come back inside
//! their parent's view.
//!
//! [`row_logs`] returns a row's audit trail, scoped to the requester's own
//! tenant.

use super::helpers::readable_row;
use crate::catalog::Schema;
use crate::error::{Result, RowkeepError};
use crate::model::{EntityId, Row, RowId, RowLog, TenantId};
use crate::permission::{Requester, VisibilityPredicate};
use crate::query::{build_condition, sort_rows, Filter, Page, RowPage, SortSpec};
use crate::store::{DataStore, Tables};
use crate::view::RowView;

#[derive(Debug, Clone, Default)]
pub struct RowsQuery {
    pub entity_id: EntityId,
    pub scope: Option<TenantId>,
    pub filters: Vec<Filter>,
    pub tags: Vec<String>,
    pub search: Option<String>,
    pub sort: Vec<SortSpec>,
    pub page: Page,
}

impl RowsQuery {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            ..Default::default()
        }
    }

    pub fn in_tenant(mut self, tenant: TenantId) -> Self {
        self.scope = Some(tenant);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    pub fn sort_by(mut self, spec: SortSpec) -> Self {
        self.sort.push(spec);
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

/// Fetch one row. Rows outside the scope or invisible to the requester are
/// reported as not found.
pub fn get_row<S: DataStore>(
    store: &S,
    requester: &Requester,
    row_id: RowId,
    scope: Option<TenantId>,
) -> Result<RowView> {
    store.read(|tables| {
        let row = tables.row(row_id)?;
        if !tables.in_tenant_scope(row, scope) {
            return Err(RowkeepError::not_found("Row", row_id));
        }
        let schema = Schema::load(tables, row.entity_id)?;
        let view = RowView::build(tables, &schema, row, requester);
        if !view.access.can_read {
            return Err(RowkeepError::not_found("Row", row_id));
        }
        Ok(view)
    })
}

pub fn get_rows<S: DataStore>(store: &S, requester: &Requester, query: &RowsQuery) -> Result<RowPage> {
    store.read(|tables| {
        let schema = Schema::load(tables, query.entity_id)?;
        let mut rows = matching(tables, &schema, requester, query);
        sort_rows(tables, &schema, &mut rows, &query.sort);

        let total = rows.len();
        let views = rows
            .into_iter()
            .skip(query.page.offset())
            .take(query.page.page_size)
            .map(|row| RowView::build(tables, &schema, row, requester))
            .collect();
        Ok(RowPage {
            rows: views,
            total,
            page: query.page.page,
            page_size: query.page.page_size,
        })
    })
}

/// Number of rows `get_rows` would return across all pages.
pub fn count_rows<S: DataStore>(store: &S, requester: &Requester, query: &RowsQuery) -> Result<usize> {
    store.read(|tables| {
        let schema = Schema::load(tables, query.entity_id)?;
        Ok(matching(tables, &schema, requester, query).len())
    })
}

/// Audit entries of a row, oldest first.
pub fn row_logs<S: DataStore>(store: &S, requester: &Requester, row_id: RowId) -> Result<Vec<RowLog>> {
    store.read(|tables| {
        readable_row(tables, requester, row_id)?;
        Ok(tables
            .logs
            .iter()
            .filter(|l| l.row_id == Some(row_id))
            .cloned()
            .collect())
    })
}

fn matching<'a>(
    tables: &'a Tables,
    schema: &Schema,
    requester: &Requester,
    query: &RowsQuery,
) -> Vec<&'a Row> {
    let predicate = VisibilityPredicate::for_requester(requester);
    let condition = build_condition(schema, &query.filters, &query.tags, query.search.as_deref());
    tables
        .rows_of(query.entity_id)
        .filter(|r| !r.is_detail())
        .filter(|r| tables.in_tenant_scope(r, query.scope))
        .filter(|r| predicate.matches(r))
        .filter(|r| condition.matches(tables, schema, r))
        .collect()
}
