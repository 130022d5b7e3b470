use std::time::Duration;

use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid {field}: `{value}`")]
    Validation { field: &'static str, value: String },

    #[error("referential integrity violation: {detail}")]
    Constraint { detail: String },

    #[error("traversal exceeded {budget:?} after expanding {expanded} entities")]
    Timeout { budget: Duration, expanded: usize },

    #[error("storage temporarily unavailable: {0}")]
    Transient(#[source] rusqlite::Error),

    #[error("storage error: {0}")]
    Store(#[source] rusqlite::Error),
}

impl EngineError {
    pub fn validation(field: &'static str, value: impl Into<String>) -> Self {
        Self::Validation {
            field,
            value: value.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Constraint { .. } => "constraint_error",
            Self::Timeout { .. } => "timeout_error",
            Self::Transient(_) => "transient_store_error",
            Self::Store(_) => "store_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::Transient(err),
                ErrorCode::ConstraintViolation => Self::Constraint {
                    detail: message
                        .clone()
                        .unwrap_or_else(|| "constraint violated".to_string()),
                },
                _ => Self::Store(err),
            },
            _ => Self::Store(err),
        }
    }
}
