//! # Property Catalog
//!
//! The typed schema attached to an [`Entity`]. Each [`Property`] is one field;
//! its [`PropertyType`] decides which storage slot the [`crate::codec`] uses and
//! which constraints apply.
//!
//! ## Static and dynamic fields
//!
//! A property is stored in one of two places:
//!
//! | Binding | Storage | Examples |
//! |---------|---------|----------|
//! | [`FieldBinding::Static`] | a column of the row record | `folio`, `createdAt`, static columns |
//! | [`FieldBinding::Dynamic`] | one [`crate::model::Value`] per row | most user-defined fields |
//!
//! The binding is resolved once when a [`Schema`] is loaded. Callers route
//! reads and writes through the schema instead of inspecting flags per access.
//!
//! ## System properties
//!
//! Every entity receives the [`DEFAULT_PROPERTIES`] at creation. They are
//! static, flagged `is_default`, and cannot be deleted.
//!
//! ## Entity references
//!
//! An `ENTITY` property points at the entity it references through `parent_id`,
//! the id of a property on the target entity. The target is resolved lazily via
//! [`Schema::related_entity`] so properties never hold pointers to each other.

mod validation;

pub use validation::{validate_definition, validate_property_name, DefinitionIssue};

use crate::codec::{from_storage_slots, TypedValue};
use crate::error::{Result, RowkeepError};
use crate::model::{Entity, EntityId, PropertyId, Row};
use crate::store::Tables;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyType {
    Text,
    Number,
    Date,
    Boolean,
    Select,
    Id,
    User,
    Role,
    Entity,
    Media,
    Formula,
}

impl PropertyType {
    pub const ALL: [PropertyType; 11] = [
        PropertyType::Text,
        PropertyType::Number,
        PropertyType::Date,
        PropertyType::Boolean,
        PropertyType::Select,
        PropertyType::Id,
        PropertyType::User,
        PropertyType::Role,
        PropertyType::Entity,
        PropertyType::Media,
        PropertyType::Formula,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Text => "TEXT",
            PropertyType::Number => "NUMBER",
            PropertyType::Date => "DATE",
            PropertyType::Boolean => "BOOLEAN",
            PropertyType::Select => "SELECT",
            PropertyType::Id => "ID",
            PropertyType::User => "USER",
            PropertyType::Role => "ROLE",
            PropertyType::Entity => "ENTITY",
            PropertyType::Media => "MEDIA",
            PropertyType::Formula => "FORMULA",
        }
    }

    /// Types whose values compare as strings.
    pub fn is_text_like(&self) -> bool {
        matches!(
            self,
            PropertyType::Text
                | PropertyType::Select
                | PropertyType::Id
                | PropertyType::Role
                | PropertyType::Formula
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = RowkeepError;

    fn from_str(s: &str) -> Result<Self> {
        PropertyType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| RowkeepError::Definition(format!("unknown property type '{}'", s)))
    }
}

/// One selectable value of a `SELECT` property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyOption {
    pub id: Uuid,
    pub order: i32,
    pub value: String,
    pub color: Option<String>,
}

impl PropertyOption {
    pub fn new(order: i32, value: impl Into<String>, color: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order,
            value: value.into(),
            color: color.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: PropertyId,
    pub entity_id: EntityId,
    pub name: String,
    pub title: String,
    pub property_type: PropertyType,
    pub order: i32,
    /// Stored in the Value table rather than a row column.
    pub is_dynamic: bool,
    /// System-supplied.
    pub is_default: bool,
    pub is_required: bool,
    pub is_hidden: bool,
    /// Belongs to the nested detail-row group.
    pub is_detail: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<String>,
    /// Raw default, parsed with [`crate::codec::parse_raw`] when a row omits the value.
    pub default_value: Option<String>,
    /// For `ENTITY` properties: a property of the referenced entity.
    pub parent_id: Option<PropertyId>,
    #[serde(default)]
    pub options: Vec<PropertyOption>,
}

impl Property {
    /// A dynamic, optional, visible property with order 0.
    pub fn new(
        entity_id: EntityId,
        name: impl Into<String>,
        title: impl Into<String>,
        property_type: PropertyType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            name: name.into(),
            title: title.into(),
            property_type,
            order: 0,
            is_dynamic: true,
            is_default: false,
            is_required: false,
            is_hidden: false,
            is_detail: false,
            min: None,
            max: None,
            pattern: None,
            default_value: None,
            parent_id: None,
            options: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    pub fn detail(mut self) -> Self {
        self.is_detail = true;
        self
    }

    /// Store as a row column instead of a Value.
    pub fn static_column(mut self) -> Self {
        self.is_dynamic = false;
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_default(mut self, raw: impl Into<String>) -> Self {
        self.default_value = Some(raw.into());
        self
    }

    pub fn with_parent(mut self, parent: PropertyId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_options<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<&'static str>)>,
        S: Into<String>,
    {
        self.options = values
            .into_iter()
            .enumerate()
            .map(|(i, (value, color))| PropertyOption::new(i as i32 + 1, value, color))
            .collect();
        self
    }

    pub fn binding(&self) -> FieldBinding {
        if self.is_dynamic {
            return FieldBinding::Dynamic(self.id);
        }
        let field = DEFAULT_PROPERTIES
            .iter()
            .find(|d| self.is_default && d.name == self.name)
            .map(|d| d.field.clone())
            .unwrap_or_else(|| StaticField::Column(self.name.clone()));
        FieldBinding::Static(field)
    }

    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value == value)
    }
}

/// A row attribute stored on the row record itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StaticField {
    Folio,
    CreatedAt,
    CreatedBy,
    /// Entity-defined static column, keyed by property name.
    Column(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldBinding {
    Static(StaticField),
    Dynamic(PropertyId),
}

pub struct DefaultProperty {
    pub name: &'static str,
    pub title: &'static str,
    pub property_type: PropertyType,
    pub field: StaticField,
}

/// System properties created for every entity.
pub const DEFAULT_PROPERTIES: &[DefaultProperty] = &[
    DefaultProperty {
        name: "folio",
        title: "Folio",
        property_type: PropertyType::Id,
        field: StaticField::Folio,
    },
    DefaultProperty {
        name: "createdAt",
        title: "Created at",
        property_type: PropertyType::Date,
        field: StaticField::CreatedAt,
    },
    DefaultProperty {
        name: "createdBy",
        title: "Created by",
        property_type: PropertyType::User,
        field: StaticField::CreatedBy,
    },
];

/// Instantiate [`DEFAULT_PROPERTIES`] for an entity, ordered before user fields.
pub fn default_properties(entity_id: EntityId) -> Vec<Property> {
    DEFAULT_PROPERTIES
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let mut p = Property::new(entity_id, d.name, d.title, d.property_type)
                .with_order(-(DEFAULT_PROPERTIES.len() as i32) + i as i32)
                .static_column();
            p.is_default = true;
            p
        })
        .collect()
}

/// Fail with a `DefinitionError` listing every issue, if any.
pub fn ensure_valid_definition(
    name: &str,
    title: &str,
    order: Option<i32>,
    existing: &[Property],
) -> Result<()> {
    let issues = validate_definition(name, title, order, existing);
    if issues.is_empty() {
        return Ok(());
    }
    let joined: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
    Err(RowkeepError::Definition(joined.join("; ")))
}

/// Properties of an entity, ordered.
pub fn get_properties(tables: &Tables, entity_id: EntityId) -> Vec<Property> {
    tables.properties_of(entity_id).into_iter().cloned().collect()
}

/// Replace a property's options wholesale. Existing options get discarded and
/// the new set is re-numbered in the given order with fresh ids.
pub fn set_options(
    tables: &mut Tables,
    property_id: PropertyId,
    options: &[(String, Option<String>)],
) -> Result<Vec<PropertyOption>> {
    let property = tables
        .properties
        .get_mut(&property_id)
        .ok_or_else(|| RowkeepError::not_found("Property", property_id))?;

    let mut seen = std::collections::HashSet::new();
    for (value, _) in options {
        if !seen.insert(value.as_str()) {
            return Err(RowkeepError::Definition(format!(
                "duplicate option '{}' on property '{}'",
                value, property.name
            )));
        }
    }

    property.options = options
        .iter()
        .enumerate()
        .map(|(i, (value, color))| PropertyOption {
            id: Uuid::new_v4(),
            order: i as i32 + 1,
            value: value.clone(),
            color: color.clone(),
        })
        .collect();
    Ok(property.options.clone())
}

/// An entity with its properties and their resolved bindings.
#[derive(Debug, Clone)]
pub struct Schema {
    pub entity: Entity,
    /// Ordered by `order`.
    pub properties: Vec<Property>,
    bindings: BTreeMap<String, FieldBinding>,
}

impl Schema {
    pub fn load(tables: &Tables, entity_id: EntityId) -> Result<Self> {
        let entity = tables.entity(entity_id)?.clone();
        let properties = get_properties(tables, entity_id);
        Ok(Self::new(entity, properties))
    }

    pub fn new(entity: Entity, properties: Vec<Property>) -> Self {
        let bindings = properties
            .iter()
            .map(|p| (p.name.clone(), p.binding()))
            .collect();
        Self {
            entity,
            properties,
            bindings,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_by_id(&self, id: PropertyId) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    pub fn binding(&self, name: &str) -> Option<&FieldBinding> {
        self.bindings.get(name)
    }

    /// User-writable properties of the header row (`detail == false`) or the detail group.
    pub fn writable(&self, detail: bool) -> impl Iterator<Item = &Property> {
        self.properties
            .iter()
            .filter(move |p| !p.is_default && p.is_detail == detail)
    }

    /// Properties paired with their resolved bindings, in order.
    pub fn fields(&self) -> impl Iterator<Item = (&Property, &FieldBinding)> {
        self.properties
            .iter()
            .filter_map(move |p| self.bindings.get(&p.name).map(|b| (p, b)))
    }

    /// Current value of `property` on `row`, read through its binding.
    pub fn read_value(&self, tables: &Tables, row: &Row, property: &Property) -> Option<TypedValue> {
        match self.bindings.get(&property.name)? {
            FieldBinding::Static(StaticField::Folio) => {
                Some(TypedValue::Id(self.entity.folio_string(row.folio)))
            }
            FieldBinding::Static(StaticField::CreatedAt) => Some(TypedValue::Date(row.created_at)),
            FieldBinding::Static(StaticField::CreatedBy) => {
                row.creator.and_then(|a| a.user_id()).map(TypedValue::User)
            }
            FieldBinding::Static(StaticField::Column(name)) => row
                .columns
                .get(name)
                .and_then(|slots| from_storage_slots(property.property_type, slots)),
            FieldBinding::Dynamic(id) => tables
                .value_for(row.id, *id)
                .and_then(|v| from_storage_slots(property.property_type, &v.slots)),
        }
    }

    /// Entity referenced by an `ENTITY` property, resolved through its parent property.
    pub fn related_entity(&self, tables: &Tables, property: &Property) -> Option<EntityId> {
        let parent = property.parent_id?;
        tables.properties.get(&parent).map(|p| p.entity_id)
    }
}
