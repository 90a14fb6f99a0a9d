//! # Error Types
//!
//! Domain-specific error types for herald-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  herald-core errors (this file)                                        │
//! │  ├── CoreError        - Record rule violations                         │
//! │  ├── PayloadError     - Malformed push payloads                        │
//! │  └── ValidationError  - Invalid metric input                           │
//! │                                                                         │
//! │  herald-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  herald-sdk errors                                                     │
//! │  └── SdkError         - What the host application sees                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::RegistrationState;

// =============================================================================
// Core Error
// =============================================================================

/// Registration record rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The registration state may only move forward.
    ///
    /// ## When This Occurs
    /// - A step tries to write a state lower than the stored one
    /// - Only `RegistrationRecord::reset` may move the state back
    #[error("Registration state cannot move from {from} back to {to}")]
    InvalidStateTransition {
        from: RegistrationState,
        to: RegistrationState,
    },

    /// Payload error (wraps PayloadError).
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Payload Error
// =============================================================================

/// A push payload that carries SDK data but cannot be turned into a record.
///
/// Re-parsing the same payload gives the same error, so callers never retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// A field required by the recognized shape is absent or empty.
    #[error("Push payload is missing required field '{0}'")]
    MissingField(String),

    /// A field is present but has the wrong type or format.
    #[error("Push payload field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

impl PayloadError {
    /// Creates a MissingField error.
    pub fn missing(field: impl Into<String>) -> Self {
        PayloadError::MissingField(field.into())
    }

    /// Creates an InvalidField error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PayloadError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors for metric constructors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A numeric value is outside its allowed range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A numeric value is not finite.
    #[error("{field} must be a finite number")]
    NotFinite { field: String },

    /// A name that is not part of a fixed vocabulary.
    #[error("'{value}' is not a valid {field}")]
    Unrecognized { field: String, value: String },
}

impl ValidationError {
    /// Creates a Required error.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Creates an Unrecognized error.
    pub fn unrecognized(field: impl Into<String>, value: impl Into<String>) -> Self {
        ValidationError::Unrecognized {
            field: field.into(),
            value: value.into(),
        }
    }
}
