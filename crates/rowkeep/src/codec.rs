//! Value codec.
//!
//! Converts between the runtime [`TypedValue`] of a property and the
//! [`StorageSlots`] persisted for it. Exactly one slot is populated per type:
//!
//! | Type | Slot |
//! |------|------|
//! | TEXT, SELECT, ROLE, FORMULA | `text` |
//! | NUMBER | `number` |
//! | DATE | `date` |
//! | BOOLEAN | `boolean` |
//! | ID, USER | `id` |
//! | ENTITY | `related_row_id` |
//! | MEDIA | `media` |
//!
//! [`from_storage_slots`] is the exact inverse of [`to_storage_slots`].

use crate::catalog::{Property, PropertyType};
use crate::error::{Result, RowkeepError};
use crate::model::RowId;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

static DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=]*)$")
        .expect("data url pattern is valid")
});

/// Property patterns, compiled once per distinct pattern string.
static PATTERNS: Lazy<RwLock<HashMap<String, Regex>>> = Lazy::new(Default::default);

fn compiled_pattern(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    if let Some(re) = PATTERNS.read().get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    PATTERNS.write().insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// Runtime value of a property, one variant per [`PropertyType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum TypedValue {
    Text(String),
    Number(f64),
    Date(DateTime<Utc>),
    Boolean(bool),
    Select(String),
    Id(String),
    User(Uuid),
    Role(String),
    Entity(RowId),
    Media(Vec<MediaDescriptor>),
    Formula(String),
}

impl TypedValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            TypedValue::Text(_) => PropertyType::Text,
            TypedValue::Number(_) => PropertyType::Number,
            TypedValue::Date(_) => PropertyType::Date,
            TypedValue::Boolean(_) => PropertyType::Boolean,
            TypedValue::Select(_) => PropertyType::Select,
            TypedValue::Id(_) => PropertyType::Id,
            TypedValue::User(_) => PropertyType::User,
            TypedValue::Role(_) => PropertyType::Role,
            TypedValue::Entity(_) => PropertyType::Entity,
            TypedValue::Media(_) => PropertyType::Media,
            TypedValue::Formula(_) => PropertyType::Formula,
        }
    }

    /// String content of text-like values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s)
            | TypedValue::Select(s)
            | TypedValue::Id(s)
            | TypedValue::Role(s)
            | TypedValue::Formula(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            TypedValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MediaContent {
    /// `data:<mime>;base64,<payload>`
    Inline { data: String },
    /// Reference returned by a blob storage provider.
    Stored { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    pub name: String,
    pub title: String,
    pub mime_type: String,
    pub content: MediaContent,
}

impl MediaDescriptor {
    pub fn inline(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        let name = name.into();
        let mime_type = mime_type.into();
        Self {
            title: name.clone(),
            content: MediaContent::Inline {
                data: format!("data:{};base64,{}", mime_type, BASE64.encode(bytes)),
            },
            name,
            mime_type,
        }
    }

    pub fn stored(name: impl Into<String>, mime_type: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            mime_type: mime_type.into(),
            content: MediaContent::Stored { url: url.into() },
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.content, MediaContent::Inline { .. })
    }

    /// Payload of inline content; `None` for stored references.
    pub fn decoded_bytes(&self) -> std::result::Result<Option<Vec<u8>>, CodecError> {
        let MediaContent::Inline { data } = &self.content else {
            return Ok(None);
        };
        let caps = DATA_URL
            .captures(data)
            .ok_or_else(|| CodecError::InvalidMedia(format!("'{}' is not a base64 data url", self.name)))?;
        let bytes = BASE64
            .decode(&caps[2])
            .map_err(|e| CodecError::InvalidMedia(format!("'{}': {}", self.name, e)))?;
        Ok(Some(bytes))
    }
}

/// Persisted form of a value. Exactly one slot is meaningful per property type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_row_id: Option<RowId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("expected a {expected} value, got {found}")]
    TypeMismatch {
        expected: PropertyType,
        found: PropertyType,
    },
    #[error("number must be finite")]
    NonFiniteNumber,
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
    #[error("'{0}' is not a date (expected RFC 3339 or YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("'{0}' is not a boolean")]
    InvalidBoolean(String),
    #[error("'{0}' is not a valid id")]
    InvalidReference(String),
    #[error("invalid media: {0}")]
    InvalidMedia(String),
}

impl CodecError {
    /// Attach the offending property, producing a `ValidationError`.
    pub fn for_property(self, property: &str) -> RowkeepError {
        RowkeepError::validation(property, self.to_string())
    }
}

pub fn to_storage_slots(
    property_type: PropertyType,
    value: &TypedValue,
) -> std::result::Result<StorageSlots, CodecError> {
    if value.property_type() != property_type {
        return Err(CodecError::TypeMismatch {
            expected: property_type,
            found: value.property_type(),
        });
    }

    let mut slots = StorageSlots::default();
    match value {
        TypedValue::Text(s) | TypedValue::Select(s) | TypedValue::Role(s) | TypedValue::Formula(s) => {
            slots.text = Some(s.clone())
        }
        TypedValue::Number(n) => {
            if !n.is_finite() {
                return Err(CodecError::NonFiniteNumber);
            }
            slots.number = Some(*n)
        }
        TypedValue::Date(d) => slots.date = Some(*d),
        TypedValue::Boolean(b) => slots.boolean = Some(*b),
        TypedValue::Id(s) => slots.id = Some(s.clone()),
        TypedValue::User(u) => slots.id = Some(u.to_string()),
        TypedValue::Entity(r) => slots.related_row_id = Some(*r),
        TypedValue::Media(list) => {
            for m in list {
                m.decoded_bytes()?;
            }
            slots.media = list.clone()
        }
    }
    Ok(slots)
}

/// Inverse of [`to_storage_slots`]. `None` when the type's slot is empty.
pub fn from_storage_slots(property_type: PropertyType, slots: &StorageSlots) -> Option<TypedValue> {
    match property_type {
        PropertyType::Text => slots.text.clone().map(TypedValue::Text),
        PropertyType::Select => slots.text.clone().map(TypedValue::Select),
        PropertyType::Role => slots.text.clone().map(TypedValue::Role),
        PropertyType::Formula => slots.text.clone().map(TypedValue::Formula),
        PropertyType::Number => slots.number.map(TypedValue::Number),
        PropertyType::Date => slots.date.map(TypedValue::Date),
        PropertyType::Boolean => slots.boolean.map(TypedValue::Boolean),
        PropertyType::Id => slots.id.clone().map(TypedValue::Id),
        PropertyType::User => slots
            .id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(TypedValue::User),
        PropertyType::Entity => slots.related_row_id.map(TypedValue::Entity),
        PropertyType::Media => Some(TypedValue::Media(slots.media.clone())),
    }
}

/// Parse declarative string input (defaults, filter operands).
pub fn parse_raw(
    property_type: PropertyType,
    raw: &str,
) -> std::result::Result<TypedValue, CodecError> {
    let trimmed = raw.trim();
    Ok(match property_type {
        PropertyType::Text => TypedValue::Text(raw.to_string()),
        PropertyType::Select => TypedValue::Select(trimmed.to_string()),
        PropertyType::Role => TypedValue::Role(trimmed.to_string()),
        PropertyType::Formula => TypedValue::Formula(raw.to_string()),
        PropertyType::Id => TypedValue::Id(trimmed.to_string()),
        PropertyType::Number => {
            let n: f64 = trimmed
                .parse()
                .map_err(|_| CodecError::InvalidNumber(raw.to_string()))?;
            if !n.is_finite() {
                return Err(CodecError::NonFiniteNumber);
            }
            TypedValue::Number(n)
        }
        PropertyType::Date => TypedValue::Date(parse_date(trimmed)?),
        PropertyType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => TypedValue::Boolean(true),
            "false" | "0" | "no" => TypedValue::Boolean(false),
            _ => return Err(CodecError::InvalidBoolean(raw.to_string())),
        },
        PropertyType::User => TypedValue::User(parse_uuid(trimmed)?),
        PropertyType::Entity => TypedValue::Entity(parse_uuid(trimmed)?),
        PropertyType::Media => {
            let list: Vec<MediaDescriptor> = serde_json::from_str(trimmed)
                .map_err(|e| CodecError::InvalidMedia(e.to_string()))?;
            TypedValue::Media(list)
        }
    })
}

fn parse_date(s: &str) -> std::result::Result<DateTime<Utc>, CodecError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CodecError::InvalidDate(s.to_string()))
}

fn parse_uuid(s: &str) -> std::result::Result<Uuid, CodecError> {
    Uuid::parse_str(s).map_err(|_| CodecError::InvalidReference(s.to_string()))
}

/// Enforce the property's declared constraints on a value.
///
/// `min`/`max` bound the number itself, the character length of text-like
/// values, and the attachment count of media.
pub fn check_constraints(property: &Property, value: &TypedValue) -> Result<()> {
    if value.property_type() != property.property_type {
        return Err(CodecError::TypeMismatch {
            expected: property.property_type,
            found: value.property_type(),
        }
        .for_property(&property.name));
    }

    let (measure, unit) = match value {
        TypedValue::Number(n) => (Some(*n), "value"),
        TypedValue::Media(list) => (Some(list.len() as f64), "media count"),
        other => (other.as_text().map(|s| s.chars().count() as f64), "length"),
    };
    if let Some(m) = measure {
        if let Some(min) = property.min {
            if m < min {
                return Err(RowkeepError::validation(
                    &property.name,
                    format!("{} {} is below the minimum {}", unit, m, min),
                ));
            }
        }
        if let Some(max) = property.max {
            if m > max {
                return Err(RowkeepError::validation(
                    &property.name,
                    format!("{} {} exceeds the maximum {}", unit, m, max),
                ));
            }
        }
    }

    if let (Some(pattern), Some(text)) = (&property.pattern, value.as_text()) {
        let re = compiled_pattern(pattern).map_err(|e| {
            RowkeepError::Definition(format!("invalid pattern on '{}': {}", property.name, e))
        })?;
        if !re.is_match(text) {
            return Err(RowkeepError::validation(
                &property.name,
                format!("'{}' does not match pattern {}", text, pattern),
            ));
        }
    }

    if let TypedValue::Select(choice) = value {
        if !property.options.is_empty() && !property.has_option(choice) {
            return Err(RowkeepError::validation(
                &property.name,
                format!("'{}' is not one of the options", choice),
            ));
        }
    }

    Ok(())
}

/// JSON/API projection of a value.
pub fn to_json(value: &TypedValue) -> serde_json::Value {
    use serde_json::Value as J;
    match value {
        TypedValue::Text(s)
        | TypedValue::Select(s)
        | TypedValue::Id(s)
        | TypedValue::Role(s)
        | TypedValue::Formula(s) => J::String(s.clone()),
        TypedValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(J::Number)
            .unwrap_or(J::Null),
        TypedValue::Date(d) => J::String(d.to_rfc3339()),
        TypedValue::Boolean(b) => J::Bool(*b),
        TypedValue::User(u) | TypedValue::Entity(u) => J::String(u.to_string()),
        TypedValue::Media(list) => serde_json::to_value(list).unwrap_or(J::Null),
    }
}

/// Locale-neutral presentation. Number and date formatting are left plain.
pub fn display(value: &TypedValue) -> String {
    match value {
        TypedValue::Number(n) => n.to_string(),
        TypedValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        TypedValue::Boolean(true) => "Yes".to_string(),
        TypedValue::Boolean(false) => "No".to_string(),
        TypedValue::User(u) | TypedValue::Entity(u) => u.to_string(),
        TypedValue::Media(list) => list
            .iter()
            .map(|m| m.title.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.as_text().unwrap_or_default().to_string(),
    }
}
