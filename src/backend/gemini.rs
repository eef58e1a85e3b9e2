//! Gemini-powered backend for crosswalk drafting
//!
//! Without tools the model is asked for JSON directly. With tools, the
//! arithmetic operations are advertised as function declarations and the
//! model may call them for a bounded number of rounds before it must answer.

use super::{GenerationRequest, GenerativeBackend};
use crate::execution::ToolExecutor;
use crate::gemini::{
    Content, GeminiClient, GeminiRequest, GenerationConfig, Part, ToolDeclarations,
};
use crate::models::ToolCall;
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// Function-calling rounds allowed before the model must emit its document
pub const MAX_TOOL_ROUNDS: usize = 8;

pub struct GeminiBackend {
    client: GeminiClient,
    executor: Option<ToolExecutor>,
    max_tool_rounds: usize,
}

impl GeminiBackend {
    pub fn new(client: GeminiClient) -> Self {
        Self {
            client,
            executor: None,
            max_tool_rounds: MAX_TOOL_ROUNDS,
        }
    }

    /// Let the model call the arithmetic tools while drafting.
    pub fn with_tools(mut self, executor: ToolExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    async fn generate_json(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let gemini_request = GeminiRequest {
            contents: vec![Content::user(vec![Part::text(request.prompt)])],
            system_instruction: Content::system(request.system),
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                ..Default::default()
            },
            tools: None,
        };

        let content = self.client.generate_content(&gemini_request).await?;
        Ok(content.text())
    }

    async fn generate_with_tools(
        &self,
        request: &GenerationRequest<'_>,
        executor: &ToolExecutor,
    ) -> Result<String> {
        let declarations = vec![ToolDeclarations {
            function_declarations: executor.registry().declarations(),
        }];

        let mut contents = vec![Content::user(vec![Part::text(request.prompt)])];
        let mut calls_spent = 0usize;
        let mut round = 0usize;

        loop {
            // The final round withholds the tools so the model has to answer.
            let offer_tools = round < self.max_tool_rounds;

            let gemini_request = GeminiRequest {
                contents: contents.clone(),
                system_instruction: Content::system(request.system),
                generation_config: GenerationConfig::default(),
                tools: offer_tools.then(|| declarations.clone()),
            };

            let content = self.client.generate_content(&gemini_request).await?;
            let calls: Vec<ToolCall> = content
                .function_calls()
                .into_iter()
                .map(|call| ToolCall {
                    name: call.name.clone(),
                    arguments: call.args.clone(),
                })
                .collect();

            if calls.is_empty() || !offer_tools {
                info!(
                    job_id = %request.job_id,
                    attempt = request.attempt,
                    rounds = round,
                    tool_calls = calls_spent,
                    "Gemini draft complete"
                );
                return Ok(content.text());
            }

            debug!(
                job_id = %request.job_id,
                round,
                calls = calls.len(),
                "Gemini requested tool calls"
            );

            let observations = executor.execute_calls(&calls, calls_spent).await;
            calls_spent += calls.len();

            let responses = observations
                .into_iter()
                .map(|observation| {
                    Part::function_response(
                        observation.tool_name,
                        json!({
                            "status": observation.status,
                            "result": observation.tool_output,
                        }),
                    )
                })
                .collect();

            contents.push(content);
            contents.push(Content::user(responses));
            round += 1;
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn tools_enabled(&self) -> bool {
        self.executor.is_some()
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        match &self.executor {
            Some(executor) => self.generate_with_tools(request, executor).await,
            None => self.generate_json(request).await,
        }
    }
}
