//! Property definition commands.
//!
//! Definitions are validated as a whole before anything is stored: name rules,
//! uniqueness of name, title and order within the entity, a compilable
//! pattern, a sane range, a resolvable ENTITY reference, and a default that
//! satisfies the property's own constraints. Every problem is a
//! `DefinitionError`.
//!
//! System properties (`is_default`) are read-only here: they cannot be
//! edited or deleted.

use crate::catalog::{self, ensure_valid_definition, Property, PropertyOption, PropertyType};
use crate::codec::{check_constraints, parse_raw};
use crate::error::{Result, RowkeepError};
use crate::model::{EntityId, PropertyId};
use crate::store::{DataStore, Tables};
use crate::tags::validate_color;
use regex::Regex;
use tracing::info;

/// Changes to a property. Outer `None` keeps the field; for the optional
/// constraints, `Some(None)` removes them.
#[derive(Debug, Clone, Default)]
pub struct PropertyUpdate {
    pub name: Option<String>,
    pub title: Option<String>,
    pub order: Option<i32>,
    pub is_required: Option<bool>,
    pub is_hidden: Option<bool>,
    pub min: Option<Option<f64>>,
    pub max: Option<Option<f64>>,
    pub pattern: Option<Option<String>>,
    pub default_value: Option<Option<String>>,
}

/// Add a property to its entity. An order of 0 is replaced by the next free
/// order after the existing properties.
pub fn add_property<S: DataStore>(store: &S, property: Property) -> Result<Property> {
    let added = store.transaction(|tables| {
        tables.entity(property.entity_id)?;
        let existing = catalog::get_properties(tables, property.entity_id);

        let mut property = property.clone();
        property.is_default = false;
        if property.order == 0 {
            property.order = existing.iter().map(|p| p.order).max().unwrap_or(0).max(0) + 1;
        }
        ensure_valid_definition(&property.name, &property.title, Some(property.order), &existing)?;
        check_shape(tables, &property)?;
        check_required(tables, &property)?;

        tables.properties.insert(property.id, property.clone());
        Ok(property)
    })?;

    info!(
        target: "rowkeep::catalog",
        property = %added.name,
        property_type = %added.property_type,
        "Property added"
    );
    Ok(added)
}

pub fn update_property<S: DataStore>(
    store: &S,
    property_id: PropertyId,
    update: &PropertyUpdate,
) -> Result<Property> {
    store.transaction(|tables| {
        let current = tables.property(property_id)?.clone();
        if current.is_default {
            return Err(RowkeepError::Definition(format!(
                "system property '{}' cannot be edited",
                current.name
            )));
        }

        let mut property = current.clone();
        if let Some(name) = &update.name {
            property.name = name.clone();
        }
        if let Some(title) = &update.title {
            property.title = title.clone();
        }
        if let Some(order) = update.order {
            property.order = order;
        }
        if let Some(required) = update.is_required {
            property.is_required = required;
        }
        if let Some(hidden) = update.is_hidden {
            property.is_hidden = hidden;
        }
        if let Some(min) = update.min {
            property.min = min;
        }
        if let Some(max) = update.max {
            property.max = max;
        }
        if let Some(pattern) = &update.pattern {
            property.pattern = pattern.clone();
        }
        if let Some(default) = &update.default_value {
            property.default_value = default.clone();
        }

        let others: Vec<Property> = catalog::get_properties(tables, property.entity_id)
            .into_iter()
            .filter(|p| p.id != property_id)
            .collect();
        ensure_valid_definition(&property.name, &property.title, Some(property.order), &others)?;
        check_shape(tables, &property)?;

        if !property.is_dynamic && property.name != current.name {
            for row in tables.rows.values_mut().filter(|r| r.entity_id == property.entity_id) {
                if let Some(slots) = row.columns.remove(&current.name) {
                    row.columns.insert(property.name.clone(), slots);
                }
            }
        }
        check_required(tables, &property)?;
        tables.properties.insert(property.id, property.clone());
        Ok(property)
    })
}

/// A required property without a default cannot leave stored rows empty.
fn check_required(tables: &Tables, property: &Property) -> Result<()> {
    if !property.is_required || property.default_value.is_some() {
        return Ok(());
    }
    let missing = tables
        .rows_of(property.entity_id)
        .filter(|r| r.is_detail() == property.is_detail)
        .any(|r| {
            if property.is_dynamic {
                !tables.values_of(r.id).any(|v| v.property_id == property.id)
            } else {
                !r.columns.contains_key(&property.name)
            }
        });
    if missing {
        return Err(RowkeepError::Definition(format!(
            "required property '{}' needs a default while rows lack a value",
            property.name
        )));
    }
    Ok(())
}

/// Delete a property and every value stored for it. Rows are kept.
pub fn delete_property<S: DataStore>(store: &S, property_id: PropertyId) -> Result<Property> {
    let (property, removed) = store.transaction(|tables| {
        let property = tables.property(property_id)?.clone();
        if property.is_default {
            return Err(RowkeepError::Definition(format!(
                "system property '{}' cannot be deleted",
                property.name
            )));
        }
        if let Some(child) = tables
            .properties
            .values()
            .find(|p| p.parent_id == Some(property_id))
        {
            return Err(RowkeepError::Definition(format!(
                "property '{}' is referenced by '{}'",
                property.name, child.name
            )));
        }

        let before = tables.values.len();
        tables.values.retain(|_, v| v.property_id != property_id);
        let mut removed = before - tables.values.len();
        if !property.is_dynamic {
            for row in tables.rows.values_mut().filter(|r| r.entity_id == property.entity_id) {
                removed += usize::from(row.columns.remove(&property.name).is_some());
            }
        }
        tables.properties.remove(&property_id);
        Ok((property, removed))
    })?;

    info!(
        target: "rowkeep::catalog",
        property = %property.name,
        values = removed,
        "Property deleted"
    );
    Ok(property)
}

/// Replace the options of a SELECT property.
pub fn set_options<S: DataStore>(
    store: &S,
    property_id: PropertyId,
    options: &[(String, Option<String>)],
) -> Result<Vec<PropertyOption>> {
    store.transaction(|tables| {
        let property = tables.property(property_id)?;
        if property.property_type != PropertyType::Select {
            return Err(RowkeepError::Definition(format!(
                "property '{}' is not a SELECT",
                property.name
            )));
        }
        for (value, color) in options {
            if value.trim().is_empty() {
                return Err(RowkeepError::Definition("option value cannot be empty".into()));
            }
            if let Some(color) = color {
                validate_color(color).map_err(|e| RowkeepError::Definition(e.to_string()))?;
            }
        }
        catalog::set_options(tables, property_id, options)
    })
}

pub fn get_properties<S: DataStore>(store: &S, entity_id: EntityId) -> Result<Vec<Property>> {
    store.read(|tables| {
        tables.entity(entity_id)?;
        Ok(catalog::get_properties(tables, entity_id))
    })
}

fn check_shape(tables: &Tables, property: &Property) -> Result<()> {
    let definition = |msg: String| RowkeepError::Definition(format!("property '{}': {}", property.name, msg));

    if let (Some(min), Some(max)) = (property.min, property.max) {
        if min > max {
            return Err(definition(format!("min {} exceeds max {}", min, max)));
        }
    }
    if let Some(pattern) = &property.pattern {
        Regex::new(pattern).map_err(|e| definition(format!("invalid pattern: {}", e)))?;
    }
    match (property.property_type, property.parent_id) {
        (PropertyType::Entity, None) => {
            return Err(definition("ENTITY properties need a referenced property".into()))
        }
        (_, Some(parent)) if !tables.properties.contains_key(&parent) => {
            return Err(definition(format!("referenced property {} does not exist", parent)))
        }
        _ => {}
    }
    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = property.options.iter().find(|o| !seen.insert(o.value.as_str())) {
        return Err(definition(format!("duplicate option '{}'", dup.value)));
    }
    if let Some(raw) = &property.default_value {
        let value = parse_raw(property.property_type, raw)
            .map_err(|e| definition(format!("invalid default: {}", e)))?;
        check_constraints(property, &value)
            .map_err(|e| definition(format!("invalid default: {}", e)))?;
    }
    Ok(())
}
