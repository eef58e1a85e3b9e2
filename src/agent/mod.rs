//! Generation-and-repair loop
//!
//! DRAFT → VALIDATE → ACCEPT | (FEEDBACK → DRAFT) | EXHAUSTED
//!
//! Content failures (malformed output, broken invariants) are retried with the
//! full violation list appended to the prompt. Transport faults end the run.
//! Nothing is written to the store until a candidate is accepted.

pub mod prompt;

use crate::audit::document_fingerprint;
use crate::backend::{self, GenerationRequest, GenerativeBackend};
use crate::config::{AppConfig, GeneratorConfig};
use crate::error::CrosswalkError;
use crate::models::{
    AttemptOutcome, AttemptRecord, CrosswalkDocument, GenerationReport, GenerationStatus,
};
use crate::state::{self, JobStore, CROSSWALK_FILE};
use crate::validation::{validate_candidate, ValidationFailure};
use crate::verification::{create_default_plausibility_checker, PlausibilityChecker};
use crate::Result;
use prompt::{append_feedback, build_prompt, SYSTEM_PROMPT};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drives one job from user facts to an accepted, persisted document.
pub struct CrosswalkGenerator {
    backend: Arc<dyn GenerativeBackend>,
    store: Arc<dyn JobStore>,
    checker: PlausibilityChecker,
    config: GeneratorConfig,
}

impl CrosswalkGenerator {
    pub fn new(backend: Arc<dyn GenerativeBackend>, store: Arc<dyn JobStore>) -> Self {
        Self {
            backend,
            store,
            checker: create_default_plausibility_checker(),
            config: GeneratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_checker(mut self, checker: PlausibilityChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn from_config(config: &AppConfig, store: Arc<dyn JobStore>) -> Result<Self> {
        Ok(Self::new(backend::from_config(config)?, store).with_config(config.generator))
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run the loop for an existing job. A job with an accepted crosswalk is
    /// rejected before the backend is called.
    pub async fn run(&self, job_id: Uuid) -> Result<GenerationReport> {
        let record = state::read_input(self.store.as_ref(), job_id).await?;
        let input = record.input;
        self.ensure_not_accepted(job_id).await?;

        let mut prompt = build_prompt(&input, job_id, self.backend.tools_enabled());
        let mut attempt_log = Vec::new();
        let mut last_failure: Option<ValidationFailure> = None;

        info!(
            job_id = %job_id,
            backend = self.backend.name(),
            max_attempts = self.config.max_attempts,
            "Generating crosswalk"
        );

        for attempt in 1..=self.config.max_attempts {
            let started = Instant::now();
            let request = GenerationRequest {
                job_id,
                input: &input,
                system: SYSTEM_PROMPT,
                prompt: &prompt,
                attempt,
            };

            let candidate = self.backend.generate(&request).await.map_err(|e| {
                error!(job_id = %job_id, attempt, error = %e, "Backend call failed");
                e
            })?;

            let outcome = validate_candidate(&candidate, job_id);
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(document) => {
                    attempt_log.push(AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Accepted,
                        violation_count: 0,
                        elapsed_ms,
                    });
                    return self.accept(document, attempt, attempt_log).await;
                }
                Err(failure) => {
                    warn!(
                        job_id = %job_id,
                        attempt,
                        violations = failure.violation_count(),
                        "Candidate rejected: {}",
                        failure
                    );
                    attempt_log.push(AttemptRecord {
                        attempt,
                        outcome: failure.outcome(),
                        violation_count: failure.violation_count(),
                        elapsed_ms,
                    });
                    append_feedback(&mut prompt, attempt, &failure.feedback());
                    last_failure = Some(failure);
                }
            }
        }

        let last_failure = last_failure
            .unwrap_or_else(|| ValidationFailure::malformed("no attempts were allowed"));
        error!(
            job_id = %job_id,
            attempts = self.config.max_attempts,
            violations = last_failure.violation_count(),
            "Retry budget exhausted"
        );

        Err(CrosswalkError::RetryBudgetExhausted {
            attempts: self.config.max_attempts,
            last_failure,
        })
    }

    async fn ensure_not_accepted(&self, job_id: Uuid) -> Result<()> {
        if state::exists(self.store.as_ref(), job_id, CROSSWALK_FILE).await? {
            warn!(job_id = %job_id, "Crosswalk already accepted");
            return Err(CrosswalkError::AlreadyAccepted { job_id });
        }
        Ok(())
    }

    async fn accept(
        &self,
        document: CrosswalkDocument,
        attempts: u32,
        attempt_log: Vec<AttemptRecord>,
    ) -> Result<GenerationReport> {
        let job_id = document.job_id;
        // A concurrent run may have finished while this one was drafting.
        self.ensure_not_accepted(job_id).await?;
        let location =
            state::write_json(self.store.as_ref(), job_id, CROSSWALK_FILE, &document).await?;
        let fingerprint = document_fingerprint(&document)?;
        let warnings = self.checker.check(&document);

        debug!(job_id = %job_id, fingerprint = %fingerprint, "Crosswalk persisted");
        info!(
            job_id = %job_id,
            attempts,
            warnings = warnings.len(),
            location = %location,
            "Crosswalk accepted"
        );

        Ok(GenerationReport {
            job_id,
            status: GenerationStatus::Accepted,
            location,
            attempts,
            fingerprint,
            warnings,
            attempt_log,
        })
    }
}
