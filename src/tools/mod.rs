//! Tool trait and registry
//!
//! Tools are deterministic, side-effect-free arithmetic operations. The
//! generative backend may call them mid-draft, and the HTTP API exposes them
//! directly as verification oracles.

pub mod arithmetic;

use crate::error::CrosswalkError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use arithmetic::ExpenseLineItems;

/// Trait for a single tool (deterministic execution)
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the parameters object, advertised to function-calling backends.
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Function declarations in the shape Gemini expects.
    pub fn declarations(&self) -> Vec<Value> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters(),
                })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_parameters<T: DeserializeOwned>(input: &ToolInput) -> Result<T> {
    if !input.parameters.is_object() {
        return Err(CrosswalkError::InvalidToolInput(
            "tool_input must be a JSON object".to_string(),
        ));
    }

    serde_json::from_value(input.parameters.clone()).map_err(|e| {
        CrosswalkError::InvalidToolInput(format!("{}: {}", input.tool_name, e))
    })
}

fn success(data: impl serde::Serialize) -> Result<ToolOutput> {
    Ok(ToolOutput {
        success: true,
        data: serde_json::to_value(data)?,
        error: None,
    })
}

fn integer_properties(names: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = names
        .iter()
        .map(|name| (name.to_string(), json!({ "type": "integer" })))
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": names,
    })
}

// =============================
// compute_financial_metrics
// =============================

#[derive(Deserialize)]
struct FinancialMetricsArgs {
    rental_income: i64,
    other_income: i64,
    vacancy_loss_amount: i64,
    #[serde(flatten)]
    expenses: ExpenseLineItems,
}

pub struct FinancialMetricsTool;

#[async_trait::async_trait]
impl Tool for FinancialMetricsTool {
    fn name(&self) -> &'static str {
        "compute_financial_metrics"
    }

    fn description(&self) -> &'static str {
        "Compute PGI, EGI, total operating expenses and NOI from income and the nine \
         expense line items. vacancy_loss_amount is a positive number."
    }

    fn parameters(&self) -> Value {
        integer_properties(&[
            "rental_income",
            "other_income",
            "vacancy_loss_amount",
            "real_estate_taxes",
            "insurance",
            "utilities",
            "repairs_maintenance",
            "payroll",
            "management_fee_amount",
            "marketing",
            "administrative",
            "replacement_reserves",
        ])
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: FinancialMetricsArgs = parse_parameters(input)?;
        success(arithmetic::financial_metrics(
            args.rental_income,
            args.other_income,
            args.vacancy_loss_amount,
            &args.expenses,
        )?)
    }
}

// =============================
// compute_valuation_metrics
// =============================

#[derive(Deserialize)]
struct ValuationMetricsArgs {
    noi: i64,
    cap_rate_percent: f64,
    total_units: u32,
    gross_building_area_sf: u64,
}

pub struct ValuationMetricsTool;

#[async_trait::async_trait]
impl Tool for ValuationMetricsTool {
    fn name(&self) -> &'static str {
        "compute_valuation_metrics"
    }

    fn description(&self) -> &'static str {
        "Compute indicated value, value per unit and value per SF from NOI and a cap \
         rate given in percent (5.5 means 5.5%)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "noi": { "type": "integer" },
                "cap_rate_percent": { "type": "number" },
                "total_units": { "type": "integer" },
                "gross_building_area_sf": { "type": "integer" },
            },
            "required": ["noi", "cap_rate_percent", "total_units", "gross_building_area_sf"],
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: ValuationMetricsArgs = parse_parameters(input)?;
        success(arithmetic::valuation_metrics(
            args.noi,
            args.cap_rate_percent,
            args.total_units,
            args.gross_building_area_sf,
        )?)
    }
}

// =============================
// compute_price_per_unit
// =============================

#[derive(Deserialize)]
struct PricePerUnitArgs {
    sale_price: i64,
    units: u32,
}

pub struct PricePerUnitTool;

#[async_trait::async_trait]
impl Tool for PricePerUnitTool {
    fn name(&self) -> &'static str {
        "compute_price_per_unit"
    }

    fn description(&self) -> &'static str {
        "Compute the rounded price per unit of a comparable sale."
    }

    fn parameters(&self) -> Value {
        integer_properties(&["sale_price", "units"])
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: PricePerUnitArgs = parse_parameters(input)?;
        let derived = arithmetic::price_per_unit(args.sale_price, args.units)?;
        success(json!({
            "price_per_unit": derived.value,
            "formula": derived.formula,
        }))
    }
}

// =============================
// compute_unit_mix_total_sf
// =============================

#[derive(Deserialize)]
struct UnitMixArgs {
    count: u32,
    avg_size_sf: u32,
}

pub struct UnitMixTotalSfTool;

#[async_trait::async_trait]
impl Tool for UnitMixTotalSfTool {
    fn name(&self) -> &'static str {
        "compute_unit_mix_total_sf"
    }

    fn description(&self) -> &'static str {
        "Compute total square footage for a unit mix row."
    }

    fn parameters(&self) -> Value {
        integer_properties(&["count", "avg_size_sf"])
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: UnitMixArgs = parse_parameters(input)?;
        let derived = arithmetic::unit_mix_total_sf(args.count, args.avg_size_sf);
        success(json!({
            "total_sf": derived.value,
            "formula": derived.formula,
        }))
    }
}

// =============================
// verify_sum
// =============================

#[derive(Deserialize)]
struct VerifySumArgs {
    values: Vec<i64>,
    expected_total: i64,
}

pub struct VerifySumTool;

#[async_trait::async_trait]
impl Tool for VerifySumTool {
    fn name(&self) -> &'static str {
        "verify_sum"
    }

    fn description(&self) -> &'static str {
        "Check that a list of integers sums to an expected total. Use it to double-check \
         roll-ups before emitting the document."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "values": { "type": "array", "items": { "type": "integer" } },
                "expected_total": { "type": "integer" },
            },
            "required": ["values", "expected_total"],
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: VerifySumArgs = parse_parameters(input)?;
        success(arithmetic::verify_sum(&args.values, args.expected_total))
    }
}

/// Create a registry with the five arithmetic tools.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(FinancialMetricsTool));
    registry.register(Arc::new(ValuationMetricsTool));
    registry.register(Arc::new(PricePerUnitTool));
    registry.register(Arc::new(UnitMixTotalSfTool));
    registry.register(Arc::new(VerifySumTool));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(tool_name: &str, parameters: Value) -> ToolInput {
        ToolInput {
            tool_name: tool_name.to_string(),
            parameters,
        }
    }

    #[test]
    fn test_default_registry_lists_arithmetic_tools() {
        let registry = create_default_registry();
        assert_eq!(
            registry.list(),
            vec![
                "compute_financial_metrics",
                "compute_price_per_unit",
                "compute_unit_mix_total_sf",
                "compute_valuation_metrics",
                "verify_sum",
            ]
        );
        assert_eq!(registry.declarations().len(), 5);
    }

    #[tokio::test]
    async fn test_financial_metrics_tool() {
        let registry = create_default_registry();
        let tool = registry.get("compute_financial_metrics").unwrap();

        let output = tool
            .execute(&input(
                "compute_financial_metrics",
                json!({
                    "rental_income": 3_000_000,
                    "other_income": 100_000,
                    "vacancy_loss_amount": 150_000,
                    "real_estate_taxes": 200_000,
                    "insurance": 60_000,
                    "utilities": 80_000,
                    "repairs_maintenance": 90_000,
                    "payroll": 120_000,
                    "management_fee_amount": 88_500,
                    "marketing": 15_000,
                    "administrative": 16_500,
                    "replacement_reserves": 30_000,
                }),
            ))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.data["net_operating_income"], 2_250_000);
        assert_eq!(output.data["formulas"]["egi"], "3100000 - 150000 = 2950000");
    }

    #[tokio::test]
    async fn test_valuation_tool_division_error() {
        let tool = ValuationMetricsTool;
        let result = tool
            .execute(&input(
                "compute_valuation_metrics",
                json!({
                    "noi": 2_250_000,
                    "cap_rate_percent": 7.5,
                    "total_units": 0,
                    "gross_building_area_sf": 120_000,
                }),
            ))
            .await;

        assert!(matches!(result, Err(CrosswalkError::DivisionError("total_units"))));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_invalid_input() {
        let tool = PricePerUnitTool;
        let result = tool
            .execute(&input("compute_price_per_unit", json!({ "sale_price": 100 })))
            .await;
        assert!(matches!(result, Err(CrosswalkError::InvalidToolInput(_))));

        let result = tool
            .execute(&input("compute_price_per_unit", json!([1, 2])))
            .await;
        assert!(matches!(result, Err(CrosswalkError::InvalidToolInput(_))));
    }

    #[tokio::test]
    async fn test_verify_sum_tool_never_fails_on_mismatch() {
        let output = VerifySumTool
            .execute(&input(
                "verify_sum",
                json!({ "values": [9000, 56000], "expected_total": 70000 }),
            ))
            .await
            .unwrap();

        assert_eq!(output.data["matches"], false);
        assert_eq!(output.data["difference"], -5000);
    }

    #[tokio::test]
    async fn test_verify_sum_tool_survives_overflow() {
        let output = VerifySumTool
            .execute(&input(
                "verify_sum",
                json!({ "values": [i64::MAX, 1], "expected_total": 0 }),
            ))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.data["matches"], false);
        assert_eq!(output.data["actual"], i64::MAX);
    }

    #[tokio::test]
    async fn test_financial_metrics_tool_rejects_overflow() {
        let result = FinancialMetricsTool
            .execute(&input(
                "compute_financial_metrics",
                json!({
                    "rental_income": i64::MAX,
                    "other_income": 1,
                    "vacancy_loss_amount": 0,
                    "real_estate_taxes": 0,
                    "insurance": 0,
                    "utilities": 0,
                    "repairs_maintenance": 0,
                    "payroll": 0,
                    "management_fee_amount": 0,
                    "marketing": 0,
                    "administrative": 0,
                    "replacement_reserves": 0,
                }),
            ))
            .await;

        assert!(matches!(
            result,
            Err(CrosswalkError::ArithmeticOverflow("potential_gross_income"))
        ));
    }
}
