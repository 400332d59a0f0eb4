//! Core error types for dreamgoal-core.
//!
//! Every engine operation returns `Result<T, CoreError>`. Collaborator
//! failures arrive as [`StoreError`], rule violations as [`GoalError`], and
//! bad input is rejected with a [`ValidationError`] before any store call.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for dreamgoal-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence collaborator errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Goal state machine violations
    #[error("Goal error: {0}")]
    Goal(#[from] GoalError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Errors reported by an [`ItemStore`](crate::store::ItemStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend answered but refused the write.
    #[error("store rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    /// Non-success HTTP status from the item service.
    #[error("item service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport-level failure talking to the item service.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Malformed base URL or path segment.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Local SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database is locked by another writer.
    #[error("database is locked")]
    Locked,

    /// Failed to open the local database file.
    #[error("failed to open database at {path}: {message}")]
    OpenFailed { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response envelope was `success: true` but carried no data.
    #[error("item service response for {0} had no data")]
    MissingData(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to locate or create the data directory
    #[error("data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors. All of these short-circuit before persistence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user id is required")]
    MissingUserId,

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("deadline goals require a target date")]
    MissingTargetDate,

    #[error("invalid ISO week identifier: {0}")]
    InvalidWeekId(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Goal lifecycle rule violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GoalError {
    #[error("dream not found: {0}")]
    DreamNotFound(String),

    #[error("goal not found: {0}")]
    GoalNotFound(String),

    #[error("no template for goal {0}")]
    TemplateNotFound(String),

    #[error("goal {0} is not a recurring goal")]
    NotRecurring(String),

    #[error("goal {0} is not a consistency goal")]
    NotConsistency(String),

    #[error("goal {0} is not a deadline goal")]
    NotDeadline(String),

    #[error("goal {0} repeats monthly; use increment instead of toggle")]
    MonthlyRequiresIncrement(String),

    #[error("goal {0} repeats weekly; increments only apply to monthly goals")]
    NotMonthly(String),

    #[error("goal {goal_id} already reached its frequency of {frequency} for {month}")]
    FrequencyReached {
        goal_id: String,
        frequency: u32,
        month: String,
    },

    #[error("goal {0} is already completed")]
    AlreadyCompleted(String),

    #[error("goal {0} is not active")]
    Inactive(String),

    #[error("dream {0} is already completed")]
    DreamAlreadyCompleted(String),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_into_core_error() {
        let err: CoreError = ValidationError::EmptyTitle.into();
        assert!(matches!(err, CoreError::Validation(ValidationError::EmptyTitle)));
        assert_eq!(err.to_string(), "Validation error: title must not be empty");
    }

    #[test]
    fn frequency_reached_message_names_the_month() {
        let err = GoalError::FrequencyReached {
            goal_id: "g1".into(),
            frequency: 2,
            month: "2025-10".into(),
        };
        assert_eq!(
            err.to_string(),
            "goal g1 already reached its frequency of 2 for 2025-10"
        );
    }
}
