//! Tool call execution for agentic drafting
//!
//! Calls requested by the backend are executed deterministically here.
//! A failing call never fails the draft: the error becomes an observation
//! the backend can read and react to.

use crate::models::{ExecutionStatus, Observation, ToolCall, ToolInput};
use crate::tools::ToolRegistry;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Maximum tool calls honoured per draft
pub const MAX_TOOL_CALLS_PER_DRAFT: usize = 32;

/// Executes backend tool calls against the registry
pub struct ToolExecutor {
    tool_registry: Arc<ToolRegistry>,
    max_calls: usize,
}

impl ToolExecutor {
    pub fn new(tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            tool_registry,
            max_calls: MAX_TOOL_CALLS_PER_DRAFT,
        }
    }

    pub fn with_max_calls(mut self, max_calls: usize) -> Self {
        self.max_calls = max_calls;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    /// Execute a batch of calls. `calls_so_far` is the number already spent
    /// in this draft; calls beyond the budget are skipped, not executed.
    pub async fn execute_calls(&self, calls: &[ToolCall], calls_so_far: usize) -> Vec<Observation> {
        let mut observations = Vec::with_capacity(calls.len());

        for (offset, call) in calls.iter().enumerate() {
            if calls_so_far + offset >= self.max_calls {
                warn!(
                    tool_name = %call.name,
                    max_calls = self.max_calls,
                    "Tool call budget exhausted for this draft"
                );
                observations.push(skipped(
                    call,
                    format!(
                        "Tool call budget of {} exhausted; emit the final JSON now",
                        self.max_calls
                    ),
                ));
                continue;
            }

            observations.push(self.execute_call(call).await);
        }

        observations
    }

    pub async fn execute_call(&self, call: &ToolCall) -> Observation {
        debug!(tool_name = %call.name, "Executing tool call");

        let Some(tool) = self.tool_registry.get(&call.name) else {
            warn!(tool_name = %call.name, "Tool not registered");
            return skipped(call, "Tool not registered".to_string());
        };

        let start = Instant::now();
        let tool_input = ToolInput {
            tool_name: call.name.clone(),
            parameters: call.arguments.clone(),
        };

        let (status, tool_output) = match tool.execute(&tool_input).await {
            Ok(output) => (ExecutionStatus::Success, output.data),
            Err(e) => {
                warn!(tool_name = %call.name, error = %e, "Tool execution failed");
                (ExecutionStatus::Failed, json!({ "error": e.to_string() }))
            }
        };

        Observation {
            tool_name: call.name.clone(),
            tool_input: call.arguments.clone(),
            tool_output,
            execution_time_ms: start.elapsed().as_millis() as u64,
            created_at: Utc::now(),
            status,
        }
    }
}

fn skipped(call: &ToolCall, reason: String) -> Observation {
    Observation {
        tool_name: call.name.clone(),
        tool_input: call.arguments.clone(),
        tool_output: json!({ "error": reason }),
        execution_time_ms: 0,
        created_at: Utc::now(),
        status: ExecutionStatus::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::create_default_registry;

    fn executor() -> ToolExecutor {
        ToolExecutor::new(Arc::new(create_default_registry()))
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_execute_call_success() {
        let observation = executor()
            .execute_call(&call(
                "compute_unit_mix_total_sf",
                json!({ "count": 20, "avg_size_sf": 450 }),
            ))
            .await;

        assert_eq!(observation.status, ExecutionStatus::Success);
        assert_eq!(observation.tool_output["total_sf"], 9000);
    }

    #[tokio::test]
    async fn test_errors_become_observations() {
        let executor = executor();

        let unknown = executor.execute_call(&call("fetch_market_data", json!({}))).await;
        assert_eq!(unknown.status, ExecutionStatus::Skipped);

        let bad = executor
            .execute_call(&call("compute_price_per_unit", json!({ "sale_price": 1, "units": 0 })))
            .await;
        assert_eq!(bad.status, ExecutionStatus::Failed);
        assert!(bad.tool_output["error"].as_str().unwrap().contains("units"));
    }

    #[tokio::test]
    async fn test_call_budget_is_enforced() {
        let executor = executor().with_max_calls(2);
        let calls = vec![
            call("verify_sum", json!({ "values": [1], "expected_total": 1 })),
            call("verify_sum", json!({ "values": [2], "expected_total": 2 })),
        ];

        let observations = executor.execute_calls(&calls, 1).await;
        assert_eq!(observations[0].status, ExecutionStatus::Success);
        assert_eq!(observations[1].status, ExecutionStatus::Skipped);
    }
}
