//! Schema and invariant validation for crosswalk documents
//!
//! Validation is whole-document and exhaustive: every field constraint and
//! cross-field identity is evaluated, and all violations found in one pass
//! are reported together so they can be fed back to the generator verbatim.

mod rules;

use crate::models::{AttemptOutcome, CrosswalkDocument, UserInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub(crate) use rules::Checker;

/// Allowed drift between a stated cap rate and NOI / value, in points.
pub const CAP_RATE_TOLERANCE: f64 = 0.05;

/// Allowed drift for per-unit figures derived by a rounded division.
pub const PER_UNIT_TOLERANCE: i64 = 1;

/// Allowed drift for per-square-foot figures rounded to cents.
pub const PER_SF_TOLERANCE: f64 = 0.01;

/// Keys of `historical_t12`, oldest first.
pub const HISTORICAL_YEAR_LABELS: [&str; 3] = ["year_1", "year_2", "year_3"];

/// Number of trailing years expected in `historical_t12`.
pub const HISTORICAL_YEARS: usize = HISTORICAL_YEAR_LABELS.len();

/// A single broken constraint, phrased so it can be pasted into a repair prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field, e.g. `property_physical.unit_mix[2].total_sf`.
    pub field: String,
    /// The relationship that must hold.
    pub rule: String,
    pub actual: String,
    pub expected: String,
}

impl Violation {
    pub fn new(
        field: impl Into<String>,
        rule: impl Into<String>,
        actual: impl ToString,
        expected: impl ToString,
    ) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            actual: actual.to_string(),
            expected: expected.to_string(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (actual: {}, expected: {})",
            self.field, self.rule, self.actual, self.expected
        )
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    /// The candidate could not be decoded into the document shape at all.
    #[error("schema malformed: {message}")]
    SchemaMalformed { message: String },

    /// The candidate decoded but broke one or more constraints.
    #[error("{} invariant violation(s): {}", .violations.len(), summarize(.violations))]
    InvariantViolation { violations: Vec<Violation> },
}

impl ValidationFailure {
    pub fn malformed(message: impl Into<String>) -> Self {
        ValidationFailure::SchemaMalformed {
            message: message.into(),
        }
    }

    /// The failure expressed as violations; malformed output becomes a
    /// single document-level entry.
    pub fn violations(&self) -> Vec<Violation> {
        match self {
            ValidationFailure::SchemaMalformed { message } => vec![Violation::new(
                "$",
                "response must be one JSON object matching the crosswalk schema",
                message,
                "well-formed JSON with every required field and type",
            )],
            ValidationFailure::InvariantViolation { violations } => violations.clone(),
        }
    }

    pub fn violation_count(&self) -> usize {
        match self {
            ValidationFailure::SchemaMalformed { .. } => 1,
            ValidationFailure::InvariantViolation { violations } => violations.len(),
        }
    }

    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            ValidationFailure::SchemaMalformed { .. } => AttemptOutcome::SchemaMalformed,
            ValidationFailure::InvariantViolation { .. } => AttemptOutcome::InvariantViolation,
        }
    }

    /// Corrective feedback block appended to the next generation prompt.
    pub fn feedback(&self) -> String {
        let mut out = match self {
            ValidationFailure::SchemaMalformed { .. } => String::from(
                "Your previous response was not a valid crosswalk JSON object. \
                 Return ONLY one JSON object with no other text.\n",
            ),
            ValidationFailure::InvariantViolation { violations } => format!(
                "Your previous response had {} validation error(s):\n",
                violations.len()
            ),
        };

        for violation in self.violations() {
            out.push_str(&format!("- {}\n", violation));
        }

        out.push_str("Please fix these issues and return the complete corrected JSON.");
        out
    }
}

/// Run every constraint against a decoded document, returning all violations.
pub fn check(document: &CrosswalkDocument) -> Vec<Violation> {
    let mut checker = Checker::new();
    checker.document(document);
    checker.finish()
}

/// Accept a decoded document only if it satisfies every invariant.
pub fn validate_document(
    document: CrosswalkDocument,
) -> Result<CrosswalkDocument, ValidationFailure> {
    let violations = check(&document);
    if violations.is_empty() {
        Ok(document)
    } else {
        Err(ValidationFailure::InvariantViolation { violations })
    }
}

/// Decode and validate raw structured data.
pub fn validate(raw: Value) -> Result<CrosswalkDocument, ValidationFailure> {
    let document: CrosswalkDocument = serde_json::from_value(raw)
        .map_err(|e| ValidationFailure::malformed(e.to_string()))?;
    validate_document(document)
}

/// Decode and validate JSON text.
pub fn validate_str(text: &str) -> Result<CrosswalkDocument, ValidationFailure> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| ValidationFailure::malformed(format!("not valid JSON: {}", e)))?;
    validate(raw)
}

/// Validate a raw backend candidate for a job.
///
/// Markdown fences are stripped and the job id is forced to `job_id` before
/// decoding, so a backend that invents its own id is never penalised for it.
pub fn validate_candidate(
    text: &str,
    job_id: Uuid,
) -> Result<CrosswalkDocument, ValidationFailure> {
    let cleaned = strip_code_fences(text);

    let mut raw: Value = serde_json::from_str(cleaned)
        .map_err(|e| ValidationFailure::malformed(format!("not valid JSON: {}", e)))?;

    let Some(object) = raw.as_object_mut() else {
        return Err(ValidationFailure::malformed(
            "top-level JSON value must be an object",
        ));
    };
    object.insert("job_id".to_string(), Value::String(job_id.to_string()));

    let mut document = validate(raw)?;
    document.job_id = job_id;
    Ok(document)
}

/// Remove a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let body = match trimmed.find('\n') {
        Some(newline) => &trimmed[newline + 1..],
        None => trimmed.trim_start_matches('`'),
    };

    body.trim_end().trim_end_matches("```").trim()
}

impl CrosswalkDocument {
    /// Parse the canonical JSON form, re-validating every invariant.
    pub fn from_json(text: &str) -> Result<Self, ValidationFailure> {
        validate_str(text)
    }
}

impl UserInput {
    /// Check the submitted property facts, reporting every bad field.
    pub fn validate(&self) -> Result<(), Vec<Violation>> {
        let mut checker = Checker::new();
        checker.user_input(self);
        let violations = checker.finish();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Decode and validate an untyped request body.
    pub fn parse(raw: Value) -> Result<UserInput, Vec<Violation>> {
        let input: UserInput = serde_json::from_value(raw).map_err(|e| {
            vec![Violation::new(
                "$",
                "body must contain address, city, state, units, year_built and \
                 property_type (garden-style | mid-rise | high-rise)",
                e,
                "a well-formed user input object",
            )]
        })?;
        input.validate()?;
        Ok(input)
    }
}
