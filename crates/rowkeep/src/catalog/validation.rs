//! Property definition validation.
//!
//! Valid property names:
//! - Non-empty
//! - Start with a letter or underscore
//! - Contain no whitespace and no hyphen (`-`)
//!
//! Within one entity, names, titles and order values are unique.

use super::Property;
use std::fmt;

/// Validates a property name.
///
/// # Examples
/// ```
/// use rowkeep::catalog::validate_property_name;
///
/// assert!(validate_property_name("amount").is_ok());
/// assert!(validate_property_name("dueDate").is_ok());
/// assert!(validate_property_name("_internal").is_ok());
///
/// assert!(validate_property_name("").is_err());
/// assert!(validate_property_name("due date").is_err());
/// assert!(validate_property_name("due-date").is_err());
/// assert!(validate_property_name("1st").is_err());
/// ```
pub fn validate_property_name(name: &str) -> Result<(), DefinitionIssue> {
    let Some(first) = name.chars().next() else {
        return Err(DefinitionIssue::EmptyName);
    };
    if !(first.is_alphabetic() || first == '_') {
        return Err(DefinitionIssue::InvalidStart(first));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(DefinitionIssue::ContainsWhitespace(name.to_string()));
    }
    if name.contains('-') {
        return Err(DefinitionIssue::ContainsHyphen(name.to_string()));
    }
    Ok(())
}

/// Collects every problem with a prospective property definition.
///
/// `existing` holds the entity's current properties; pass the list without the
/// property being edited when validating an update.
pub fn validate_definition(
    name: &str,
    title: &str,
    order: Option<i32>,
    existing: &[Property],
) -> Vec<DefinitionIssue> {
    let mut issues = Vec::new();

    if let Err(issue) = validate_property_name(name) {
        issues.push(issue);
    }
    if title.trim().is_empty() {
        issues.push(DefinitionIssue::EmptyTitle);
    }
    if existing.iter().any(|p| p.name == name) {
        issues.push(DefinitionIssue::DuplicateName(name.to_string()));
    }
    if existing
        .iter()
        .any(|p| p.title.eq_ignore_ascii_case(title.trim()))
    {
        issues.push(DefinitionIssue::DuplicateTitle(title.to_string()));
    }
    if let Some(order) = order {
        if existing.iter().any(|p| p.order == order) {
            issues.push(DefinitionIssue::DuplicateOrder(order));
        }
    }

    issues
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionIssue {
    EmptyName,
    InvalidStart(char),
    ContainsWhitespace(String),
    ContainsHyphen(String),
    EmptyTitle,
    DuplicateName(String),
    DuplicateTitle(String),
    DuplicateOrder(i32),
}

impl fmt::Display for DefinitionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionIssue::EmptyName => write!(f, "property name cannot be empty"),
            DefinitionIssue::InvalidStart(c) => {
                write!(f, "property name must start with a letter or '_', found '{}'", c)
            }
            DefinitionIssue::ContainsWhitespace(n) => {
                write!(f, "property name '{}' cannot contain spaces", n)
            }
            DefinitionIssue::ContainsHyphen(n) => {
                write!(f, "property name '{}' cannot contain hyphens", n)
            }
            DefinitionIssue::EmptyTitle => write!(f, "property title cannot be empty"),
            DefinitionIssue::DuplicateName(n) => write!(f, "duplicate property name '{}'", n),
            DefinitionIssue::DuplicateTitle(t) => write!(f, "duplicate property title '{}'", t),
            DefinitionIssue::DuplicateOrder(o) => write!(f, "duplicate property order {}", o),
        }
    }
}

impl std::error::Error for DefinitionIssue {}
