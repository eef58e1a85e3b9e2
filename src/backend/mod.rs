//! Generative backends
//!
//! A backend turns a prompt into one candidate document as raw text. It
//! knows nothing about validation; the generation loop owns that.

use crate::config::AppConfig;
use crate::error::CrosswalkError;
use crate::execution::ToolExecutor;
use crate::gemini::GeminiClient;
use crate::models::UserInput;
use crate::tools::create_default_registry;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub mod gemini;
pub mod synthetic;

pub use gemini::GeminiBackend;
pub use synthetic::SyntheticBackend;

/// Everything a backend may use to draft one candidate
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub job_id: Uuid,
    pub input: &'a UserInput,
    pub system: &'a str,
    /// Full prompt: user facts, the schema with its rules, and feedback from
    /// earlier attempts.
    pub prompt: &'a str,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Trait for candidate generation (LLM controlled)
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the arithmetic tools are callable while drafting.
    fn tools_enabled(&self) -> bool {
        false
    }

    /// Draft one candidate. Errors are transport faults and are never retried
    /// by the generation loop.
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}

/// Pick the backend the configuration asks for.
///
/// Without a Gemini key the offline synthetic backend is used.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn GenerativeBackend>> {
    if !config.has_gemini_key() {
        warn!("GEMINI_API_KEY not set, using the offline synthetic backend");
        return Ok(Arc::new(SyntheticBackend::new()));
    }

    let client = GeminiClient::new(config.gemini_api_key.clone(), &config.gemini_model)?;
    let mut backend = GeminiBackend::new(client);
    if config.agent_tools {
        backend = backend.with_tools(ToolExecutor::new(Arc::new(create_default_registry())));
    }

    info!(
        model = %config.gemini_model,
        tools = backend.tools_enabled(),
        "Gemini backend configured"
    );
    Ok(Arc::new(backend))
}

/// A request as seen by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub job_id: Uuid,
    pub prompt: String,
    pub attempt: u32,
}

/// Replays a fixed sequence of responses and records every request.
///
/// Once the script runs out, the last response is repeated.
#[derive(Clone)]
pub struct ScriptedBackend {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    last: Arc<Mutex<Option<String>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedBackend {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String>>,
    {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
            last: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A backend that answers every attempt with the same text.
    pub fn repeating(response: impl Into<String>) -> Self {
        Self::new([Ok(response.into())])
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        self.requests.lock().await.push(RecordedRequest {
            job_id: request.job_id,
            prompt: request.prompt.to_string(),
            attempt: request.attempt,
        });

        let next = self.responses.lock().await.pop_front();
        let mut last = self.last.lock().await;
        match next {
            Some(Ok(text)) => {
                *last = Some(text.clone());
                Ok(text)
            }
            Some(Err(e)) => Err(e),
            None => last.clone().ok_or_else(|| {
                CrosswalkError::TransportFault("scripted backend has no responses".to_string())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuildingType;

    fn input() -> UserInput {
        UserInput {
            property_name: None,
            address: "1 Elm St".to_string(),
            city: "Austin".to_string(),
            state: "TX".to_string(),
            units: 120,
            year_built: 2005,
            property_type: BuildingType::GardenStyle,
        }
    }

    #[test]
    fn test_from_config_without_key_is_synthetic() {
        let backend = from_config(&AppConfig::default()).unwrap();
        assert_eq!(backend.name(), "synthetic");
        assert!(!backend.tools_enabled());
    }

    #[test]
    fn test_from_config_with_key_is_gemini_with_tools() {
        let config = AppConfig {
            gemini_api_key: "test-key".to_string(),
            ..AppConfig::default()
        };
        let backend = from_config(&config).unwrap();
        assert_eq!(backend.name(), "gemini");
        assert!(backend.tools_enabled());
    }

    #[tokio::test]
    async fn test_scripted_backend_replays_and_records() {
        let backend = ScriptedBackend::new([
            Ok("first".to_string()),
            Err(CrosswalkError::TransportFault("down".to_string())),
            Ok("third".to_string()),
        ]);
        let input = input();
        let job_id = Uuid::new_v4();

        let mut outputs = Vec::new();
        for attempt in 1..=4 {
            let prompt = format!("prompt {}", attempt);
            let request = GenerationRequest {
                job_id,
                input: &input,
                system: "",
                prompt: &prompt,
                attempt,
            };
            outputs.push(backend.generate(&request).await.ok());
        }

        assert_eq!(
            outputs,
            vec![
                Some("first".to_string()),
                None,
                Some("third".to_string()),
                Some("third".to_string()),
            ]
        );

        let requests = backend.requests().await;
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[3].prompt, "prompt 4");
        assert_eq!(requests[3].attempt, 4);
    }
}
