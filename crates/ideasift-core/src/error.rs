//! Error types for ideasift operations.
//!
//! Errors carry a structured [`ErrorCode`] for programmatic handling and, where
//! it helps the caller, a suggestion for resolution. Only operator actions and
//! writes the caller asked for surface these; read paths in the recommendation
//! pipeline log store failures and degrade to "no data" instead.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for ideasift operations.
pub type SiftResult<T> = Result<T, SiftError>;

/// Main error type for all ideasift operations.
#[derive(Error, Debug)]
pub enum SiftError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
        suggestion: Option<String>,
    },

    /// A referenced entity does not exist.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        entity_id: Option<String>,
    },

    /// An experiment lifecycle edge that the state machine does not allow.
    #[error("Invalid transition: {message}")]
    InvalidTransition {
        message: String,
        code: ErrorCode,
        from: String,
        to: String,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValOutOfRange,

    // Lookup (NF_xxx)
    NotFoundItem,
    NotFoundExperiment,
    NotFoundUser,

    // Experiments (EXP_xxx)
    ExpInvalidTransition,
    ExpNotActive,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,
    DbCorruptRow,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseInvalidValue,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValOutOfRange => "VAL_003",
            ErrorCode::NotFoundItem => "NF_001",
            ErrorCode::NotFoundExperiment => "NF_002",
            ErrorCode::NotFoundUser => "NF_003",
            ErrorCode::ExpInvalidTransition => "EXP_001",
            ErrorCode::ExpNotActive => "EXP_002",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::DbCorruptRow => "DB_003",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseInvalidValue => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl SiftError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create an out-of-range validation error for a named field.
    pub fn out_of_range(field: &str, value: f64, range: &str) -> Self {
        let mut details = HashMap::new();
        details.insert("field".to_string(), field.to_string());
        details.insert("value".to_string(), value.to_string());
        Self::Validation {
            message: format!("{} must be in {}, got {}", field, range, value),
            code: ErrorCode::ValOutOfRange,
            details,
            suggestion: Some(format!("Pick a value for {} in {}", field, range)),
        }
    }

    /// Create a missing field validation error.
    pub fn missing_field(field: &str) -> Self {
        let mut details = HashMap::new();
        details.insert("field".to_string(), field.to_string());
        Self::Validation {
            message: format!("{} is required", field),
            code: ErrorCode::ValMissingField,
            details,
            suggestion: None,
        }
    }

    /// Create a not found error for an item.
    pub fn item_not_found(item_id: impl Into<String>) -> Self {
        let id = item_id.into();
        Self::NotFound {
            message: format!("Item with id '{}' not found", id),
            code: ErrorCode::NotFoundItem,
            entity_id: Some(id),
        }
    }

    /// Create a not found error for an experiment.
    pub fn experiment_not_found(experiment_id: impl Into<String>) -> Self {
        let id = experiment_id.into();
        Self::NotFound {
            message: format!("Experiment with id '{}' not found", id),
            code: ErrorCode::NotFoundExperiment,
            entity_id: Some(id),
        }
    }

    /// Create an invalid lifecycle transition error.
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self::InvalidTransition {
            message: format!("cannot move an experiment from {} to {}", from, to),
            code: ErrorCode::ExpInvalidTransition,
            from,
            to,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidValue,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::InvalidTransition { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::NotFound { .. } => Some("Please check the id and ensure it exists"),
            Self::InvalidTransition { .. } => Some(
                "Experiments move draft -> active -> paused/completed -> archived; \
                 a paused experiment must be resumed before it can complete",
            ),
            Self::Database { .. } => Some("Please check the data store path and permissions"),
            _ => None,
        }
    }

    /// Whether this error is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for SiftError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}
