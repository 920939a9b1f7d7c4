use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RowkeepError {
    /// Invalid entity, property or workflow definition.
    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Validation error on '{property}': {reason}")]
    Validation { property: String, reason: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(
        "Invalid transition for step {step}: expected state {}, row is in {}",
        fmt_state(.expected),
        fmt_state(.actual)
    )]
    InvalidTransition {
        step: Uuid,
        expected: Option<Uuid>,
        actual: Option<Uuid>,
    },

    /// Folio collision or concurrent writer; retryable until the retry budget is spent.
    #[error("Concurrency conflict: {0}")]
    Concurrency(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] confique::Error),

    #[error("Store error: {0}")]
    Store(String),
}

fn fmt_state(state: &Option<Uuid>) -> String {
    match state {
        Some(id) => id.to_string(),
        None => "<none>".to_string(),
    }
}

impl RowkeepError {
    pub fn validation(property: impl Into<String>, reason: impl Into<String>) -> Self {
        RowkeepError::Validation {
            property: property.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        RowkeepError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for errors a transaction may recover from by running again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RowkeepError::Concurrency(_))
    }

    /// True when the caller may retry the whole request later.
    pub fn is_transient(&self) -> bool {
        matches!(self, RowkeepError::Concurrency(_) | RowkeepError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, RowkeepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_both_states() {
        let expected = Uuid::new_v4();
        let err = RowkeepError::InvalidTransition {
            step: Uuid::new_v4(),
            expected: Some(expected),
            actual: None,
        };
        let msg = err.to_string();
        assert!(msg.contains(&expected.to_string()));
        assert!(msg.contains("<none>"));
    }

    #[test]
    fn only_concurrency_is_a_conflict() {
        assert!(RowkeepError::Concurrency("folio".into()).is_conflict());
        assert!(!RowkeepError::Definition("x".into()).is_conflict());
        assert!(!RowkeepError::validation("amount", "required").is_conflict());
    }

    #[test]
    fn validation_message_names_property() {
        let err = RowkeepError::validation("amount", "is required");
        assert_eq!(err.to_string(), "Validation error on 'amount': is required");
    }
}
