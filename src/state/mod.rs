//! Job-scoped blob storage
//!
//! Every artifact of a job lives under `jobs/{job_id}/{path}`. The store is
//! a plain key-value surface; typed access goes through [`read_json`],
//! [`write_json`] and [`load`].

mod fs;
mod memory;
mod postgres;

pub use fs::FsJobStore;
pub use memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;

use crate::error::CrosswalkError;
use crate::models::{CrosswalkDocument, JobInput, UserInput};
use crate::validation::{ValidationFailure, Violation};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// User facts submitted for the job.
pub const INPUT_FILE: &str = "input.json";

/// The accepted crosswalk document.
pub const CROSSWALK_FILE: &str = "crosswalk-data.json";

/// Trait for job blob persistence
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    async fn read(&self, job_id: Uuid, path: &str) -> Result<Vec<u8>>;

    /// Store `bytes` and return the location they were written to.
    async fn write(&self, job_id: Uuid, path: &str, bytes: Vec<u8>) -> Result<String>;

    /// Keys under `jobs/{job_id}/{prefix}`, sorted.
    async fn list(&self, job_id: Uuid, prefix: &str) -> Result<Vec<String>>;
}

pub fn job_key(job_id: Uuid, path: &str) -> String {
    format!("jobs/{}/{}", job_id, path)
}

/// Relative paths only, and no parent traversal.
pub(crate) fn check_path(path: &str) -> Result<()> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment == ".." || segment == ".");
    if bad {
        return Err(CrosswalkError::StoreError(format!("invalid job path {:?}", path)));
    }
    Ok(())
}

pub async fn read_json<T: DeserializeOwned>(
    store: &dyn JobStore,
    job_id: Uuid,
    path: &str,
) -> Result<T> {
    let bytes = store.read(job_id, path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Whether `path` has been written for the job.
pub async fn exists(store: &dyn JobStore, job_id: Uuid, path: &str) -> Result<bool> {
    match store.read(job_id, path).await {
        Ok(_) => Ok(true),
        Err(CrosswalkError::NotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn JobStore,
    job_id: Uuid,
    path: &str,
    value: &T,
) -> Result<String> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.write(job_id, path, bytes).await
}

/// Validate the user's facts and open a job for them.
///
/// Nothing is written when validation fails.
pub async fn create_job(store: &dyn JobStore, input: UserInput) -> Result<Uuid> {
    input.validate().map_err(CrosswalkError::InvalidInput)?;

    let job_id = Uuid::new_v4();
    let record = JobInput { job_id, input };
    let location = write_json(store, job_id, INPUT_FILE, &record).await?;

    info!(
        job_id = %job_id,
        location = %location,
        city = %record.input.city,
        state = %record.input.state,
        units = record.input.units,
        "Created job"
    );

    Ok(job_id)
}

pub async fn read_input(store: &dyn JobStore, job_id: Uuid) -> Result<JobInput> {
    read_json(store, job_id, INPUT_FILE).await
}

/// Load the accepted document for a job, re-validating every invariant.
///
/// A stored document that no longer validates means the store was corrupted
/// and is reported as [`CrosswalkError::IntegrityError`].
pub async fn load(store: &dyn JobStore, job_id: Uuid) -> Result<CrosswalkDocument> {
    let bytes = store.read(job_id, CROSSWALK_FILE).await?;

    let integrity = |failure: ValidationFailure| {
        error!(job_id = %job_id, error = %failure, "Stored crosswalk failed re-validation");
        CrosswalkError::IntegrityError { job_id, failure }
    };

    let text = String::from_utf8(bytes)
        .map_err(|e| integrity(ValidationFailure::malformed(format!("not UTF-8: {}", e))))?;
    let document = CrosswalkDocument::from_json(&text).map_err(integrity)?;

    if document.job_id != job_id {
        return Err(integrity(ValidationFailure::InvariantViolation {
            violations: vec![Violation::new(
                "job_id",
                "stored job_id matches the job namespace",
                document.job_id,
                job_id,
            )],
        }));
    }

    Ok(document)
}

/// Where job artifacts are kept.
#[derive(Debug, Clone)]
pub enum StoreSource {
    Memory,
    Filesystem { root: PathBuf },
    Postgres { database_url: String },
}

impl StoreSource {
    pub async fn connect(self) -> Result<Arc<dyn JobStore>> {
        match self {
            StoreSource::Memory => Ok(Arc::new(InMemoryJobStore::new())),
            StoreSource::Filesystem { root } => Ok(Arc::new(FsJobStore::new(root))),
            StoreSource::Postgres { database_url } => {
                Ok(Arc::new(PostgresJobStore::connect(&database_url).await?))
            }
        }
    }
}
