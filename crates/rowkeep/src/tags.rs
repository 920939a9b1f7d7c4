//! Tag registry rules.
//!
//! Each entity with `has_tags` keeps its own registry of [`crate::model::Tag`]s.
//! A tag must be registered before a row can carry it, so deleting a tag is a
//! single cascade over the row associations.
//!
//! Valid tag values:
//! - ASCII letters, digits, `_` and `-`
//! - Start with a letter
//! - No `--`, no trailing `-`
//! - At most [`MAX_TAG_LEN`] characters
//!
//! Colors are either `#rrggbb` or a lowercase color name (`green`, `slate`).

use std::fmt;

pub const MAX_TAG_LEN: usize = 64;

/// # Examples
/// ```
/// use rowkeep::tags::validate_tag_value;
///
/// assert!(validate_tag_value("urgent").is_ok());
/// assert!(validate_tag_value("q3-review").is_ok());
/// assert!(validate_tag_value("needs_po").is_ok());
///
/// assert!(validate_tag_value("").is_err());
/// assert!(validate_tag_value("3rd").is_err());
/// assert!(validate_tag_value("late-").is_err());
/// assert!(validate_tag_value("a--b").is_err());
/// ```
pub fn validate_tag_value(value: &str) -> Result<(), TagIssue> {
    let Some(first) = value.chars().next() else {
        return Err(TagIssue::Empty);
    };
    if !first.is_ascii_alphabetic() {
        return Err(TagIssue::InvalidStart(first));
    }
    if value.len() > MAX_TAG_LEN {
        return Err(TagIssue::TooLong(value.len()));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(TagIssue::InvalidCharacter(bad));
    }
    if value.contains("--") {
        return Err(TagIssue::ConsecutiveHyphens);
    }
    if value.ends_with('-') {
        return Err(TagIssue::EndsWithHyphen);
    }
    Ok(())
}

pub fn validate_color(color: &str) -> Result<(), TagIssue> {
    let ok = match color.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !color.is_empty() && color.chars().all(|c| c.is_ascii_lowercase()),
    };
    if ok {
        Ok(())
    } else {
        Err(TagIssue::InvalidColor(color.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagIssue {
    Empty,
    InvalidStart(char),
    TooLong(usize),
    InvalidCharacter(char),
    ConsecutiveHyphens,
    EndsWithHyphen,
    InvalidColor(String),
}

impl fmt::Display for TagIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagIssue::Empty => write!(f, "tag cannot be empty"),
            TagIssue::InvalidStart(c) => write!(f, "tag must start with a letter, found '{}'", c),
            TagIssue::TooLong(n) => {
                write!(f, "tag is {} characters long (max {})", n, MAX_TAG_LEN)
            }
            TagIssue::InvalidCharacter(c) => write!(
                f,
                "tag contains invalid character '{}' (only alphanumeric, underscore, and hyphen allowed)",
                c
            ),
            TagIssue::ConsecutiveHyphens => write!(f, "tag cannot contain consecutive hyphens"),
            TagIssue::EndsWithHyphen => write!(f, "tag cannot end with a hyphen"),
            TagIssue::InvalidColor(c) => write!(f, "'{}' is not a color", c),
        }
    }
}

impl std::error::Error for TagIssue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_registry_style_values() {
        for v in ["urgent", "q3-review", "needs_po", "f80-3_x", "A1"] {
            assert!(validate_tag_value(v).is_ok(), "{v}");
        }
    }

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(validate_tag_value(""), Err(TagIssue::Empty));
        assert_eq!(validate_tag_value("_x"), Err(TagIssue::InvalidStart('_')));
        assert_eq!(validate_tag_value("a b"), Err(TagIssue::InvalidCharacter(' ')));
        assert_eq!(validate_tag_value("a--b"), Err(TagIssue::ConsecutiveHyphens));
        assert_eq!(validate_tag_value("ab-"), Err(TagIssue::EndsWithHyphen));
        assert_eq!(
            validate_tag_value(&"a".repeat(MAX_TAG_LEN + 1)),
            Err(TagIssue::TooLong(MAX_TAG_LEN + 1))
        );
    }

    #[test]
    fn colors() {
        assert!(validate_color("#1a2B3c").is_ok());
        assert!(validate_color("green").is_ok());
        assert!(validate_color("#12345").is_err());
        assert!(validate_color("Green").is_err());
        assert!(validate_color("").is_err());
    }
}
