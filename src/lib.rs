//! Crosswalk Engine
//!
//! Builds the crosswalk document for a synthetic multifamily appraisal: the
//! single record of property, market, financial and valuation data that every
//! downstream report stage reads.
//!
//! - Arithmetic tools derive every roll-up with an auditable formula
//! - Validation checks the whole document and reports every violation at once
//! - The generation loop drafts with a backend and repairs with feedback
//! - Plausibility checks annotate accepted documents with warnings
//!
//! LOOP:
//! DRAFT → VALIDATE → ACCEPT | FEEDBACK → DRAFT | EXHAUSTED

pub mod agent;
pub mod api;
pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod models;
pub mod state;
pub mod tools;
pub mod validation;
pub mod verification;

pub use error::{CrosswalkError, Result};

// Re-export common types
pub use agent::CrosswalkGenerator;
pub use models::*;
pub use validation::{ValidationFailure, Violation};
