//! Tag registry commands.
//!
//! - `list_tags`: tags of an entity, by value
//! - `create_tag`: register a tag
//! - `rename_tag`: change a tag's value; rows keep carrying it
//! - `delete_tag`: remove a tag (cascades to rows)
//! - `set_row_tags`: replace the tags a row carries

use super::helpers::{resolve_tags, set_row_tags as write_row_tags};
use crate::catalog::Schema;
use crate::error::{Result, RowkeepError};
use crate::model::{Entity, EntityId, RowId, Tag};
use crate::permission::{effective_access, Requester, Right};
use crate::store::DataStore;
use crate::tags::{validate_color, validate_tag_value};
use crate::view::RowView;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

pub fn list_tags<S: DataStore>(store: &S, entity_id: EntityId) -> Result<Vec<Tag>> {
    store.read(|tables| {
        tables.entity(entity_id)?;
        let mut tags: Vec<Tag> = tables
            .tags
            .values()
            .filter(|t| t.entity_id == entity_id)
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.value.cmp(&b.value));
        Ok(tags)
    })
}

/// Register a tag. Fails if the value is invalid or already registered.
pub fn create_tag<S: DataStore>(
    store: &S,
    entity_id: EntityId,
    value: &str,
    color: Option<&str>,
) -> Result<Tag> {
    validate_tag_value(value).map_err(|e| RowkeepError::validation("tag", e.to_string()))?;
    if let Some(color) = color {
        validate_color(color).map_err(|e| RowkeepError::validation("color", e.to_string()))?;
    }

    store.transaction(|tables| {
        let entity = tables.entity(entity_id)?;
        check_tags_enabled(entity)?;
        if tables.tag_by_value(entity_id, value).is_some() {
            return Err(RowkeepError::validation(
                "tag",
                format!("'{}' already exists", value),
            ));
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            entity_id,
            value: value.to_string(),
            color: color.map(str::to_string),
            created_at: Utc::now(),
        };
        tables.tags.insert(tag.id, tag.clone());
        Ok(tag)
    })
}

pub fn rename_tag<S: DataStore>(store: &S, entity_id: EntityId, old: &str, new: &str) -> Result<Tag> {
    validate_tag_value(new).map_err(|e| RowkeepError::validation("tag", e.to_string()))?;

    store.transaction(|tables| {
        if tables.tag_by_value(entity_id, new).is_some() {
            return Err(RowkeepError::validation("tag", format!("'{}' already exists", new)));
        }
        let id = tables
            .tag_by_value(entity_id, old)
            .map(|t| t.id)
            .ok_or_else(|| RowkeepError::not_found("Tag", old))?;
        let tag = tables
            .tags
            .get_mut(&id)
            .ok_or_else(|| RowkeepError::not_found("Tag", old))?;
        tag.value = new.to_string();
        Ok(tag.clone())
    })
}

/// Delete a tag and strip it from every row that carries it.
pub fn delete_tag<S: DataStore>(store: &S, entity_id: EntityId, value: &str) -> Result<Tag> {
    let (tag, affected) = store.transaction(|tables| {
        let tag = tables
            .tag_by_value(entity_id, value)
            .cloned()
            .ok_or_else(|| RowkeepError::not_found("Tag", value))?;
        let before = tables.row_tags.len();
        tables.row_tags.retain(|rt| rt.tag_id != tag.id);
        let affected = before - tables.row_tags.len();
        tables.tags.remove(&tag.id);
        Ok((tag, affected))
    })?;

    info!(target: "rowkeep::tags", tag = %tag.value, rows = affected, "Tag deleted");
    Ok(tag)
}

/// Replace the tags of a row. Needs the update right on the row.
pub fn set_row_tags<S: DataStore>(
    store: &S,
    requester: &Requester,
    row_id: RowId,
    values: &[String],
) -> Result<RowView> {
    store.transaction(|tables| {
        let row = tables.row(row_id)?.clone();
        effective_access(&row, tables.state_of_row(&row), requester).require(Right::Update, &row)?;
        let schema = Schema::load(tables, row.entity_id)?;
        let ids = resolve_tags(tables, &schema.entity, values)?;
        write_row_tags(tables, row.id, &ids);
        Ok(RowView::build(tables, &schema, &row, requester))
    })
}

fn check_tags_enabled(entity: &Entity) -> Result<()> {
    if entity.features.has_tags {
        Ok(())
    } else {
        Err(RowkeepError::validation(
            "tags",
            format!("entity '{}' does not use tags", entity.name),
        ))
    }
}
