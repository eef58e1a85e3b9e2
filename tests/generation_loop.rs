use crosswalk_engine::{
    agent::CrosswalkGenerator,
    audit::bytes_fingerprint,
    backend::{ScriptedBackend, SyntheticBackend},
    config::GeneratorConfig,
    state::{self, create_job, FsJobStore, InMemoryJobStore, JobStore, CROSSWALK_FILE},
    validation::validate_candidate,
    AttemptOutcome, BuildingType, CrosswalkError, GenerationStatus, UserInput,
};
use std::sync::Arc;
use uuid::Uuid;

const VALID: &str = include_str!("fixtures/crosswalk_valid.json");

fn user_input() -> UserInput {
    UserInput {
        property_name: Some("Maple Ridge Apartments".to_string()),
        address: "1234 Main Street".to_string(),
        city: "Denver".to_string(),
        state: "CO".to_string(),
        units: 200,
        year_built: 2018,
        property_type: BuildingType::GardenStyle,
    }
}

/// Same document with the occupancy split no longer summing to total units.
fn broken_occupancy() -> String {
    VALID.replace("\"vacant_units\": 15", "\"vacant_units\": 20")
}

async fn new_job(store: &Arc<InMemoryJobStore>) -> Uuid {
    create_job(store.as_ref(), user_input()).await.unwrap()
}

#[tokio::test]
async fn test_repairs_on_third_attempt() {
    let store = Arc::new(InMemoryJobStore::new());
    let job_id = new_job(&store).await;

    let backend = ScriptedBackend::new([
        Ok("```json\n{ \"job_id\": \"oops\", \n```".to_string()),
        Ok(broken_occupancy()),
        Ok(VALID.to_string()),
    ]);
    let generator = CrosswalkGenerator::new(Arc::new(backend.clone()), store.clone());

    let report = generator.run(job_id).await.unwrap();

    assert_eq!(report.status, GenerationStatus::Accepted);
    assert_eq!(report.job_id, job_id);
    assert_eq!(report.attempts, 3);
    let outcomes: Vec<_> = report.attempt_log.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AttemptOutcome::SchemaMalformed,
            AttemptOutcome::InvariantViolation,
            AttemptOutcome::Accepted,
        ]
    );
    assert_eq!(report.attempt_log[1].violation_count, 1);

    // The persisted document is the third candidate with the job id forced.
    let persisted = state::load(store.as_ref(), job_id).await.unwrap();
    let expected = validate_candidate(VALID, job_id).unwrap();
    assert_eq!(persisted, expected);

    let stored = store.read(job_id, CROSSWALK_FILE).await.unwrap();
    assert_eq!(bytes_fingerprint(&stored), report.fingerprint);

    // Feedback accumulates across attempts.
    let requests = backend.requests().await;
    assert_eq!(requests.len(), 3);
    assert!(requests[1].prompt.contains("ATTEMPT 1 FAILED VALIDATION."));
    assert!(requests[2].prompt.contains("ATTEMPT 1 FAILED VALIDATION."));
    assert!(requests[2].prompt.contains("ATTEMPT 2 FAILED VALIDATION."));
    assert!(requests[2].prompt.contains("185 + 20 = 205"));
    assert!(requests.iter().all(|r| r.job_id == job_id));
}

#[tokio::test]
async fn test_exhaustion_persists_nothing() {
    let store = Arc::new(InMemoryJobStore::new());
    let job_id = new_job(&store).await;

    let backend = ScriptedBackend::repeating(broken_occupancy());
    let generator = CrosswalkGenerator::new(Arc::new(backend.clone()), store.clone());

    let error = generator.run(job_id).await.unwrap_err();

    match error {
        CrosswalkError::RetryBudgetExhausted {
            attempts,
            last_failure,
        } => {
            assert_eq!(attempts, 3);
            let violations = last_failure.violations();
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].field, "financial_data.occupancy");
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }

    assert_eq!(backend.call_count().await, 3);
    assert!(matches!(
        store.read(job_id, CROSSWALK_FILE).await,
        Err(CrosswalkError::NotFound { .. })
    ));
    assert_eq!(store.list(job_id, "").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_budget_is_configurable() {
    let store = Arc::new(InMemoryJobStore::new());
    let job_id = new_job(&store).await;

    let backend = ScriptedBackend::repeating("not json at all");
    let generator = CrosswalkGenerator::new(Arc::new(backend.clone()), store.clone())
        .with_config(GeneratorConfig::with_max_attempts(5).unwrap());

    let result = generator.run(job_id).await;
    assert!(matches!(
        result,
        Err(CrosswalkError::RetryBudgetExhausted { attempts: 5, .. })
    ));
    assert_eq!(backend.call_count().await, 5);
}

#[tokio::test]
async fn test_transport_fault_is_not_retried() {
    let store = Arc::new(InMemoryJobStore::new());
    let job_id = new_job(&store).await;

    let backend = ScriptedBackend::new([
        Err(CrosswalkError::TransportFault("429 Too Many Requests".to_string())),
        Ok(VALID.to_string()),
    ]);
    let generator = CrosswalkGenerator::new(Arc::new(backend.clone()), store.clone());

    let error = generator.run(job_id).await.unwrap_err();

    assert!(error.is_transport());
    assert_eq!(backend.call_count().await, 1);
    assert!(store.read(job_id, CROSSWALK_FILE).await.is_err());
}

#[tokio::test]
async fn test_synthetic_backend_end_to_end_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn JobStore> = Arc::new(FsJobStore::new(dir.path().to_path_buf()));

    for property_type in BuildingType::ALL {
        let input = UserInput {
            property_name: None,
            units: 48,
            property_type,
            ..user_input()
        };
        let job_id = create_job(store.as_ref(), input).await.unwrap();

        let generator = CrosswalkGenerator::new(Arc::new(SyntheticBackend::new()), store.clone());
        let report = generator.run(job_id).await.unwrap();
        assert_eq!(report.attempts, 1);

        let document = state::load(store.as_ref(), job_id).await.unwrap();
        assert_eq!(document.job_id, job_id);
        assert_eq!(document.property_physical.building_type, property_type);
        assert_eq!(document.property_physical.total_units, 48);
        assert!(document.validate_cap_rate());
        assert!(document.validate_value_per_unit());
        assert!(document.validate_occupancy_units());

        let path = dir
            .path()
            .join("jobs")
            .join(job_id.to_string())
            .join(CROSSWALK_FILE);
        assert!(path.exists());
    }
}
