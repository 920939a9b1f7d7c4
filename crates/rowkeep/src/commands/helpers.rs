//! Shared pieces of the row commands. Everything here runs inside a store
//! read or transaction and only touches the [`Tables`] it is handed.

use super::create::NewDetailRow;
use crate::catalog::{FieldBinding, Property, Schema, StaticField};
use crate::codec::{check_constraints, parse_raw, to_storage_slots, TypedValue};
use crate::error::{Result, RowkeepError};
use crate::model::{
    Actor, Entity, EntityId, LinkStatus, LinkedAccountId, Row, RowAction, RowId, RowLog, RowTag,
    TagId, TenantId, Value, Visibility, VisibilityClass,
};
use crate::permission::{evaluate, Requester, Right};
use crate::store::Tables;
use chrono::Utc;
use std::collections::BTreeMap;

/// A row the requester can read from their own tenant scope. Superusers read
/// across scopes; anything else reads as not found.
pub fn readable_row<'a>(tables: &'a Tables, requester: &Requester, row_id: RowId) -> Result<&'a Row> {
    let row = tables.row(row_id)?;
    if !requester.is_superuser && !tables.in_tenant_scope(row, requester.tenant_id) {
        return Err(RowkeepError::not_found("Row", row_id));
    }
    evaluate(row, requester).require(Right::Read, row)?;
    Ok(row)
}

/// Reject names that are unknown, system-owned, or in the wrong row group.
pub fn check_names<'a>(
    schema: &Schema,
    names: impl IntoIterator<Item = &'a String>,
    detail: bool,
) -> Result<()> {
    for name in names {
        match schema.property(name) {
            None => return Err(RowkeepError::validation(name, "unknown property")),
            Some(p) if p.is_default => return Err(RowkeepError::validation(name, "is read-only")),
            Some(p) if p.is_detail && !detail => {
                return Err(RowkeepError::validation(name, "belongs to detail rows"))
            }
            Some(p) if !p.is_detail && detail => {
                return Err(RowkeepError::validation(name, "is not a detail property"))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

pub fn default_for(property: &Property) -> Result<Option<TypedValue>> {
    property
        .default_value
        .as_deref()
        .map(|raw| parse_raw(property.property_type, raw).map_err(|e| e.for_property(&property.name)))
        .transpose()
}

/// Populate a new row: supplied values, then defaults; a required property
/// with neither fails.
pub fn apply_new_values(
    tables: &mut Tables,
    schema: &Schema,
    row: &mut Row,
    values: &BTreeMap<String, TypedValue>,
) -> Result<()> {
    check_names(schema, values.keys(), row.is_detail())?;
    for property in schema.writable(row.is_detail()) {
        let value = match values.get(&property.name) {
            Some(v) => Some(v.clone()),
            None => default_for(property)?,
        };
        match value {
            Some(v) => store_value(tables, schema, row, property, &v)?,
            None if property.is_required => {
                return Err(RowkeepError::validation(&property.name, "is required"))
            }
            None => {}
        }
    }
    Ok(())
}

/// Validate and write one value through the property's binding. Existing
/// dynamic values are updated in place and keep their id.
pub fn store_value(
    tables: &mut Tables,
    schema: &Schema,
    row: &mut Row,
    property: &Property,
    value: &TypedValue,
) -> Result<()> {
    check_constraints(property, value)?;
    if let TypedValue::Entity(target) = value {
        check_reference(tables, schema, property, *target)?;
    }
    let slots = to_storage_slots(property.property_type, value)
        .map_err(|e| e.for_property(&property.name))?;

    match schema.binding(&property.name) {
        Some(FieldBinding::Static(StaticField::Column(column))) => {
            row.columns.insert(column.clone(), slots);
        }
        Some(FieldBinding::Dynamic(property_id)) => {
            match tables.value_for_mut(row.id, *property_id) {
                Some(existing) => {
                    existing.slots = slots;
                    existing.updated_at = Utc::now();
                }
                None => {
                    let v = Value::new(row.id, *property_id, slots);
                    tables.values.insert(v.id, v);
                }
            }
        }
        _ => return Err(RowkeepError::validation(&property.name, "is read-only")),
    }
    Ok(())
}

pub fn clear_value(tables: &mut Tables, schema: &Schema, row: &mut Row, property: &Property) -> Result<()> {
    if property.is_required {
        return Err(RowkeepError::validation(&property.name, "is required"));
    }
    match schema.binding(&property.name) {
        Some(FieldBinding::Static(StaticField::Column(column))) => {
            row.columns.remove(column);
        }
        Some(FieldBinding::Dynamic(property_id)) => {
            let row_id = row.id;
            tables
                .values
                .retain(|_, v| !(v.row_id == row_id && v.property_id == *property_id));
        }
        _ => return Err(RowkeepError::validation(&property.name, "is read-only")),
    }
    Ok(())
}

fn check_reference(tables: &Tables, schema: &Schema, property: &Property, target: RowId) -> Result<()> {
    let referenced = tables
        .rows
        .get(&target)
        .ok_or_else(|| RowkeepError::validation(&property.name, format!("row {} does not exist", target)))?;
    if let Some(entity) = schema.related_entity(tables, property) {
        if referenced.entity_id != entity {
            return Err(RowkeepError::validation(
                &property.name,
                format!("row {} belongs to another entity", target),
            ));
        }
    }
    Ok(())
}

/// Create detail rows under `parent`; their folios restart at 1.
pub fn create_detail_rows(
    tables: &mut Tables,
    schema: &Schema,
    parent: &Row,
    details: &[NewDetailRow],
) -> Result<()> {
    for detail in details {
        let folio = tables.next_folio(parent.tenant_id, parent.entity_id, Some(parent.id));
        let mut row = Row::new(parent.entity_id, folio);
        row.tenant_id = parent.tenant_id;
        row.creator = parent.creator;
        row.linked_account_id = parent.linked_account_id;
        row.parent_row_id = Some(parent.id);
        row.visibility = parent.visibility.clone();
        row.grants = parent.grants;
        apply_new_values(tables, schema, &mut row, &detail.values)?;
        tables.rows.insert(row.id, row);
    }
    Ok(())
}

/// Remove every detail row of `parent` with what they own.
pub fn remove_detail_rows(tables: &mut Tables, parent: RowId) -> usize {
    let children: Vec<RowId> = tables.detail_rows_of(parent).iter().map(|r| r.id).collect();
    children
        .into_iter()
        .map(|id| tables.remove_row_cascade(id).len())
        .sum()
}

/// Visibility for a row created without an explicit one, derived from the
/// entity's default class.
pub fn default_visibility(entity: &Entity, tenant: Option<TenantId>, requester: &Requester) -> Visibility {
    match entity.default_visibility {
        VisibilityClass::Private => Visibility::Private,
        VisibilityClass::Public => Visibility::Public,
        VisibilityClass::Tenant => match tenant.or(requester.tenant_id) {
            Some(t) => Visibility::Tenant(t),
            None => Visibility::Private,
        },
        VisibilityClass::Groups => Visibility::Groups(requester.group_ids.clone()),
        VisibilityClass::Users => match requester.user_id() {
            Some(u) => Visibility::Users(vec![u]),
            None => Visibility::Private,
        },
    }
}

/// A row's link account must be accepted and involve the row's tenant.
pub fn check_link(
    tables: &Tables,
    entity: &Entity,
    tenant: Option<TenantId>,
    link: Option<LinkedAccountId>,
) -> Result<()> {
    let Some(link_id) = link else {
        if entity.features.requires_linked_accounts {
            return Err(RowkeepError::validation("linkedAccount", "is required"));
        }
        return Ok(());
    };
    let link = tables
        .linked_accounts
        .get(&link_id)
        .ok_or_else(|| RowkeepError::validation("linkedAccount", format!("{} does not exist", link_id)))?;
    if link.status != LinkStatus::Linked {
        return Err(RowkeepError::validation("linkedAccount", "has not been accepted"));
    }
    if let Some(t) = tenant {
        if !link.involves(t) {
            return Err(RowkeepError::validation(
                "linkedAccount",
                "does not involve the row's tenant",
            ));
        }
    }
    Ok(())
}

pub fn resolve_tags(tables: &Tables, entity: &Entity, values: &[String]) -> Result<Vec<TagId>> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    if !entity.features.has_tags {
        return Err(RowkeepError::validation(
            "tags",
            format!("entity '{}' does not use tags", entity.name),
        ));
    }
    let mut ids = Vec::new();
    for value in values {
        let tag = tables
            .tag_by_value(entity.id, value)
            .ok_or_else(|| RowkeepError::validation("tags", format!("unknown tag '{}'", value)))?;
        if !ids.contains(&tag.id) {
            ids.push(tag.id);
        }
    }
    Ok(ids)
}

pub fn set_row_tags(tables: &mut Tables, row_id: RowId, tag_ids: &[TagId]) {
    tables.row_tags.retain(|rt| rt.row_id != row_id);
    tables
        .row_tags
        .extend(tag_ids.iter().map(|&tag_id| RowTag { row_id, tag_id }));
}

pub fn log(
    tables: &mut Tables,
    entity_id: EntityId,
    row_id: Option<RowId>,
    actor: Actor,
    action: RowAction,
    details: Option<String>,
) {
    tables
        .logs
        .push(RowLog::new(entity_id, row_id, Some(actor), action, details));
}
