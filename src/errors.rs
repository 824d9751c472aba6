// Copyright 2025 Cowboy AI, LLC.

//! Error types for weaving operations
//!
//! These errors are internal plumbing: the engine propagates them with `?`
//! while it mutates a module, and the orchestrator turns any that escape
//! into an internal-error [`Message`](crate::messages::Message). User-facing
//! problems (conflicts, rejected roles, ...) are never `WeaveError`s, they
//! are accumulated as messages instead.

use thiserror::Error;

/// Errors that can occur while reading or mutating a module
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WeaveError {
    /// Type not present in the module
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// Type declared twice in the same module
    #[error("Duplicate type: {0}")]
    DuplicateType(String),

    /// Method not present on a type
    #[error("Method not found: {type_name}::{method}")]
    MethodNotFound {
        /// Type that was searched
        type_name: String,
        /// Method that was searched for
        method: String,
    },

    /// Field not present on a type
    #[error("Field not found: {type_name}::{field}")]
    FieldNotFound {
        /// Type that was searched
        type_name: String,
        /// Field that was searched for
        field: String,
    },

    /// Module model is inconsistent
    #[error("Invalid module: {0}")]
    InvalidModule(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for weaving operations
pub type WeaveResult<T> = Result<T, WeaveError>;

impl From<serde_json::Error> for WeaveError {
    fn from(err: serde_json::Error) -> Self {
        WeaveError::SerializationError(err.to_string())
    }
}

impl WeaveError {
    /// Create an invalid-module error
    pub fn invalid(msg: impl Into<String>) -> Self {
        WeaveError::InvalidModule(msg.into())
    }

    /// Check if this is a lookup failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WeaveError::TypeNotFound(_)
                | WeaveError::MethodNotFound { .. }
                | WeaveError::FieldNotFound { .. }
        )
    }
}
