//! Error types for the crosswalk engine

use crate::validation::{ValidationFailure, Violation};
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for crosswalk operations
pub type Result<T> = std::result::Result<T, CrosswalkError>;

#[derive(Error, Debug)]
pub enum CrosswalkError {

    // =============================
    // Generation Errors
    // =============================

    /// The generative backend could not be reached or refused the call.
    /// Never retried here; the caller's own retry policy owns it.
    #[error("Transport fault: {0}")]
    TransportFault(String),

    #[error("Retry budget exhausted after {attempts} attempt(s): {last_failure}")]
    RetryBudgetExhausted {
        attempts: u32,
        last_failure: ValidationFailure,
    },

    #[error("Invalid input: {} violation(s)", .0.len())]
    InvalidInput(Vec<Violation>),

    /// A job's crosswalk is written once and is read-only afterwards.
    #[error("Job {job_id} already has an accepted crosswalk")]
    AlreadyAccepted { job_id: Uuid },

    // =============================
    // Store Errors
    // =============================

    #[error("Integrity error for job {job_id}: {failure}")]
    IntegrityError {
        job_id: Uuid,
        failure: ValidationFailure,
    },

    #[error("Not found: jobs/{job_id}/{path}")]
    NotFound { job_id: Uuid, path: String },

    #[error("Store error: {0}")]
    StoreError(String),

    // =============================
    // Tool Errors
    // =============================

    #[error("Division error: {0} must be non-zero")]
    DivisionError(&'static str),

    #[error("Arithmetic overflow computing {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl CrosswalkError {
    /// Whether the failure belongs to the generation transport rather than content.
    pub fn is_transport(&self) -> bool {
        matches!(self, CrosswalkError::TransportFault(_) | CrosswalkError::HttpError(_))
    }
}
