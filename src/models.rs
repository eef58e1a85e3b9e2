//! Core data models for the crosswalk document
//!
//! All monetary amounts are whole currency units. Rates and percentages are
//! percentage points (`5.25` means 5.25%).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::validation::{CAP_RATE_TOLERANCE, PER_UNIT_TOLERANCE};

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BuildingType {
    #[serde(rename = "garden-style")]
    GardenStyle,
    #[serde(rename = "mid-rise")]
    MidRise,
    #[serde(rename = "high-rise")]
    HighRise,
}

impl BuildingType {
    pub const ALL: [BuildingType; 3] = [
        BuildingType::GardenStyle,
        BuildingType::MidRise,
        BuildingType::HighRise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildingType::GardenStyle => "garden-style",
            BuildingType::MidRise => "mid-rise",
            BuildingType::HighRise => "high-rise",
        }
    }
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Property =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyIdentification {
    pub property_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub county: String,
    pub legal_description: String,
    pub tax_parcel_numbers: Vec<String>,
    pub current_owner: String,
    pub year_built: i32,
    pub effective_age: i32,
}

/// One unit-type cohort of the unit mix table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitMixRow {
    pub unit_type: String,
    pub count: u32,
    pub avg_size_sf: u32,
    pub total_sf: u64,
    pub bedrooms: u32,
    pub bathrooms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyPhysical {
    pub total_units: u32,
    pub total_buildings: u32,
    pub building_type: BuildingType,
    pub stories: u32,
    pub gross_building_area_sf: u64,
    pub site_area_acres: f64,
    pub site_area_sf: u64,
    pub parking_spaces: u32,
    pub parking_ratio: f64,
    pub unit_mix: Vec<UnitMixRow>,
    pub amenities: Vec<String>,
}

impl PropertyPhysical {
    pub fn unit_mix_units(&self) -> u64 {
        self.unit_mix.iter().map(|row| u64::from(row.count)).sum()
    }

    pub fn unit_mix_total_sf(&self) -> u64 {
        self.unit_mix
            .iter()
            .fold(0_u64, |acc, row| acc.saturating_add(row.total_sf))
    }
}

//
// ================= Market =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparableProperty {
    pub name: String,
    pub address: String,
    pub units: u32,
    pub year_built: i32,
    pub occupancy: f64,
    pub avg_rent_per_unit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparableSale {
    pub property: String,
    pub sale_date: String,
    pub sale_price: i64,
    pub units: u32,
    pub price_per_unit: i64,
    pub cap_rate: f64,
    pub noi: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketData {
    pub submarket: String,
    pub submarket_vacancy_rate: f64,
    pub submarket_rent_growth_yoy: f64,
    pub comparable_properties: Vec<ComparableProperty>,
    pub comparable_sales: Vec<ComparableSale>,
}

//
// ================= Financials =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Occupancy {
    pub physical_percent: f64,
    pub occupied_units: u32,
    pub vacant_units: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProFormaIncome {
    pub potential_gross_rental_income: i64,
    pub other_income: i64,
    pub potential_gross_income: i64,
    pub vacancy_collection_loss_percent: f64,
    pub vacancy_collection_loss_amount: i64,
    pub effective_gross_income: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProFormaExpenses {
    pub real_estate_taxes: i64,
    pub insurance: i64,
    pub utilities: i64,
    pub repairs_maintenance: i64,
    pub payroll: i64,
    pub management_fee_percent: f64,
    pub management_fee_amount: i64,
    pub marketing: i64,
    pub administrative: i64,
    pub replacement_reserves: i64,
    pub total_operating_expenses: i64,
    pub expense_per_unit: i64,
}

impl ProFormaExpenses {
    /// The nine expense line items, labelled, in statement order.
    pub fn line_items(&self) -> [(&'static str, i64); 9] {
        [
            ("real_estate_taxes", self.real_estate_taxes),
            ("insurance", self.insurance),
            ("utilities", self.utilities),
            ("repairs_maintenance", self.repairs_maintenance),
            ("payroll", self.payroll),
            ("management_fee_amount", self.management_fee_amount),
            ("marketing", self.marketing),
            ("administrative", self.administrative),
            ("replacement_reserves", self.replacement_reserves),
        ]
    }

    /// Widened so that no combination of line items can overflow.
    pub fn line_item_total(&self) -> i128 {
        self.line_items()
            .iter()
            .map(|(_, amount)| i128::from(*amount))
            .sum()
    }
}

/// One trailing year of actuals. `vacancy_loss` is stored as a negative amount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalYear {
    pub rental_income: i64,
    pub other_income: i64,
    pub vacancy_loss: i64,
    pub effective_gross_income: i64,
    pub operating_expenses: i64,
    pub net_operating_income: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialData {
    pub effective_date: NaiveDate,
    pub occupancy: Occupancy,
    pub market_rents_monthly: BTreeMap<String, i64>,
    pub in_place_rents_monthly: BTreeMap<String, i64>,
    pub pro_forma_income: ProFormaIncome,
    pub pro_forma_expenses: ProFormaExpenses,
    pub net_operating_income: i64,
    pub historical_t12: BTreeMap<String, HistoricalYear>,
}

//
// ================= Valuation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesComparisonApproach {
    pub indicated_value: i64,
    pub value_per_unit: i64,
    pub value_per_sf: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomeApproach {
    pub stabilized_noi: i64,
    pub cap_rate: f64,
    pub indicated_value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_per_unit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_per_sf: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalValueConclusion {
    pub market_value: i64,
    pub value_per_unit: i64,
    pub value_per_sf: f64,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Valuation {
    pub sales_comparison_approach: SalesComparisonApproach,
    pub income_approach: IncomeApproach,
    pub final_value_conclusion: FinalValueConclusion,
}

//
// ================= Crosswalk Document =================
//

/// The canonical record for one appraisal job.
///
/// Only the validation entry points in [`crate::validation`] hand out
/// documents that are known to satisfy every invariant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrosswalkDocument {
    #[serde(default = "Uuid::new_v4")]
    pub job_id: Uuid,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
    pub property_identification: PropertyIdentification,
    pub property_physical: PropertyPhysical,
    pub market_data: MarketData,
    pub financial_data: FinancialData,
    pub valuation: Valuation,
}

impl CrosswalkDocument {
    /// Cap rate implied by the income approach, rounded to two decimals.
    pub fn expected_cap_rate(&self) -> f64 {
        let income = &self.valuation.income_approach;
        round2(income.stabilized_noi as f64 / income.indicated_value as f64 * 100.0)
    }

    /// Final value per unit implied by market value and unit count.
    pub fn expected_value_per_unit(&self) -> i64 {
        let value = self.valuation.final_value_conclusion.market_value as f64;
        (value / f64::from(self.property_physical.total_units)).round() as i64
    }

    /// cap_rate == round(NOI / value * 100, 2), within 0.05 points
    pub fn validate_cap_rate(&self) -> bool {
        let actual = self.valuation.income_approach.cap_rate;
        (actual - self.expected_cap_rate()).abs() < CAP_RATE_TOLERANCE
    }

    /// value_per_unit == round(market_value / total_units), within 1
    pub fn validate_value_per_unit(&self) -> bool {
        if self.property_physical.total_units == 0 {
            return false;
        }
        let actual = self.valuation.final_value_conclusion.value_per_unit;
        actual.abs_diff(self.expected_value_per_unit()) <= PER_UNIT_TOLERANCE.unsigned_abs()
    }

    /// occupied + vacant == total_units
    pub fn validate_occupancy_units(&self) -> bool {
        let occupancy = &self.financial_data.occupancy;
        u64::from(occupancy.occupied_units) + u64::from(occupancy.vacant_units)
            == u64::from(self.property_physical.total_units)
    }

    /// Canonical pretty JSON form used between pipeline stages.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

//
// ================= User Input =================
//

/// Property facts submitted by the user for a new job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub units: i64,
    pub year_built: i64,
    pub property_type: BuildingType,
}

/// The `input.json` record stored under a job namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInput {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub input: UserInput,
}

//
// ================= Tools =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

/// A function call requested by the generative backend mid-draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
}

/// Result of one tool call, handed back to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub tool_output: serde_json::Value,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub status: ExecutionStatus,
}

//
// ================= Plausibility =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlausibilityWarning {
    pub rule: String,
    pub message: String,
    pub severity: Severity,
}

//
// ================= Generation Report =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    SchemaMalformed,
    InvariantViolation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub violation_count: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Accepted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub job_id: Uuid,
    pub status: GenerationStatus,
    pub location: String,
    pub attempts: u32,
    pub fingerprint: String,
    pub warnings: Vec<PlausibilityWarning>,
    pub attempt_log: Vec<AttemptRecord>,
}
