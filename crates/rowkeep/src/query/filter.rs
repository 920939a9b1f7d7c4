//! Field filters.
//!
//! A [`Filter`] is declarative input: a field name, an operator name and a raw
//! operand string. [`super::build_condition`] resolves it against the schema
//! into a [`ResolvedFilter`] whose [`FilterTarget`] says where the value lives.

use crate::catalog::{Property, PropertyType, StaticField};
use crate::codec::{display, parse_raw, TypedValue};
use crate::error::{Result, RowkeepError};
use crate::model::PropertyId;
use crate::workflow::WorkflowState;
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equals,
    Contains,
    Lt,
    Lte,
    Gt,
    Gte,
    StartsWith,
    EndsWith,
    /// Operand is a comma-separated list.
    In,
    NotIn,
}

impl FromStr for FilterOp {
    type Err = RowkeepError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "equals" => FilterOp::Equals,
            "contains" => FilterOp::Contains,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "startsWith" => FilterOp::StartsWith,
            "endsWith" => FilterOp::EndsWith,
            "in" => FilterOp::In,
            "notIn" => FilterOp::NotIn,
            other => {
                return Err(RowkeepError::validation(
                    "filter",
                    format!("unknown condition '{}'", other),
                ))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOp::Equals, value)
    }

    /// Parse `(field, condition name, value)` as it arrives from a request.
    pub fn parse(field: &str, condition: &str, value: &str) -> Result<Self> {
        Ok(Self::new(field, condition.parse()?, value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterTarget {
    Static(StaticField),
    Dynamic(PropertyId),
    /// Matches the current state's name or title.
    WorkflowState,
    WorkflowStateId,
}

#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    pub target: FilterTarget,
    /// The filtered property; `None` for workflow pseudo-fields.
    pub property: Option<Property>,
    pub op: FilterOp,
    pub operand: String,
}

impl ResolvedFilter {
    /// Apply to a property value. Missing values only satisfy `notIn`.
    pub fn matches_value(&self, value: Option<&TypedValue>) -> bool {
        let Some(value) = value else {
            return self.op == FilterOp::NotIn;
        };
        let text = display(value).to_lowercase();
        let needle = self.operand.to_lowercase();

        match self.op {
            FilterOp::Equals => equals(value, &self.operand),
            FilterOp::Contains => text.contains(&needle),
            FilterOp::StartsWith => text.starts_with(&needle),
            FilterOp::EndsWith => text.ends_with(&needle),
            FilterOp::In => split(&self.operand).any(|item| equals(value, item)),
            FilterOp::NotIn => !split(&self.operand).any(|item| equals(value, item)),
            FilterOp::Lt => compare(value, &self.operand) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(value, &self.operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => compare(value, &self.operand) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(value, &self.operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }

    /// Apply to a workflow pseudo-field.
    pub fn matches_state(&self, state: Option<&WorkflowState>) -> bool {
        let Some(state) = state else {
            return self.op == FilterOp::NotIn;
        };
        let labels = match self.target {
            FilterTarget::WorkflowStateId => vec![state.id.to_string()],
            _ => vec![state.name.clone(), state.title.clone()],
        };
        let probe = |label: &String| self.matches_value(Some(&TypedValue::Text(label.clone())));
        if self.op == FilterOp::NotIn {
            labels.iter().all(probe)
        } else {
            labels.iter().any(probe)
        }
    }
}

fn split(operand: &str) -> impl Iterator<Item = &str> {
    operand.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn equals(value: &TypedValue, raw: &str) -> bool {
    if let TypedValue::Date(d) = value {
        // A bare date matches the whole day.
        if raw.trim().len() == 10 {
            if let Ok(TypedValue::Date(day)) = parse_raw(PropertyType::Date, raw) {
                return d.date_naive() == day.date_naive();
            }
        }
    }
    compare(value, raw) == Some(Ordering::Equal)
}

fn compare(value: &TypedValue, raw: &str) -> Option<Ordering> {
    match value {
        TypedValue::Number(n) => match parse_raw(PropertyType::Number, raw).ok()? {
            TypedValue::Number(other) => n.partial_cmp(&other),
            _ => None,
        },
        TypedValue::Date(d) => match parse_raw(PropertyType::Date, raw).ok()? {
            TypedValue::Date(other) => Some(d.cmp(&other)),
            _ => None,
        },
        TypedValue::Boolean(b) => match parse_raw(PropertyType::Boolean, raw).ok()? {
            TypedValue::Boolean(other) => Some(b.cmp(&other)),
            _ => None,
        },
        _ => Some(
            display(value)
                .to_lowercase()
                .cmp(&raw.trim().to_lowercase()),
        ),
    }
}
