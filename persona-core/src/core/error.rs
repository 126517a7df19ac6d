// persona-core/src/core/error.rs
// ============================================================================
// Module: Persona Service Errors
// Description: Typed error kinds for service-layer operations.
// Purpose: Carry stable client-facing error codes through the pipeline.
// Dependencies: crate::core::rules, crate::interfaces, thiserror
// ============================================================================

//! ## Overview
//! Service operations fail with one of a closed set of kinds. Client faults
//! (`InvalidEvent`, `InvalidRule`, `NotFound`, `Auth`) map to 4xx responses;
//! store faults and internal faults map to 5xx. Lock contention surfaces only
//! after the retry policy is exhausted. Each kind carries a stable error code
//! used in the HTTP error envelope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::rules::RuleError;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Service Error
// ============================================================================

/// Service-layer error kinds.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Event failed admission checks.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    /// Rule failed write-time validation.
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Lock acquisition failed after retries.
    #[error("lock contention: {0}")]
    LockContention(String),
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Caller is not authorized.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable client-facing error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "11001",
            Self::InvalidRule(_) => "11002",
            Self::NotFound(_) => "11003",
            Self::Auth(_) => "11004",
            Self::LockContention(_) => "15001",
            Self::Store(_) => "15002",
            Self::Internal(_) => "15000",
        }
    }

    /// Short human-readable label for the kind.
    #[must_use]
    pub const fn error_message(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "Invalid event.",
            Self::InvalidRule(_) => "Invalid rule.",
            Self::NotFound(_) => "Resource not found.",
            Self::Auth(_) => "Authentication failed.",
            Self::LockContention(_) => "Profile is busy.",
            Self::Store(_) => "Storage failure.",
            Self::Internal(_) => "Internal server error.",
        }
    }

    /// Returns whether the fault lies with the caller.
    #[must_use]
    pub const fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidEvent(_) | Self::InvalidRule(_) | Self::NotFound(_) | Self::Auth(_)
        )
    }
}

impl From<RuleError> for ServiceError {
    fn from(error: RuleError) -> Self {
        Self::InvalidRule(error.to_string())
    }
}
