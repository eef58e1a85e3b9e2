//! Prompt assembly for crosswalk generation

use crate::models::UserInput;
use crate::validation::{CAP_RATE_TOLERANCE, HISTORICAL_YEARS, PER_UNIT_TOLERANCE};
use uuid::Uuid;

pub const SYSTEM_PROMPT: &str = r#"You are a commercial real estate data specialist generating complete, realistic
property data for a multifamily apartment appraisal.

All dollar amounts are integers (no cents). Percentages are floats in points
(5.25 means 5.25%). Every mathematical relationship in the schema must hold
exactly; the document is checked mechanically and rejected otherwise.

Respond with ONE JSON object and nothing else: no prose, no markdown fences."#;

const TOOL_WORKFLOW: &str = r#"Arithmetic tools are available. BEFORE assembling the final JSON, use them
to compute every derived total, and copy the EXACT values they return:
1. compute_unit_mix_total_sf for each unit mix row.
2. compute_price_per_unit for each comparable sale.
3. compute_financial_metrics with all income and expense line items (PGI, EGI,
   total operating expenses, NOI).
4. compute_valuation_metrics with the NOI and your chosen cap rate.
5. verify_sum to confirm unit_mix counts sum to total_units.
Never estimate or round differently than the tools."#;

/// Field-by-field description of the document, with every rule it must satisfy.
pub fn schema_description() -> String {
    format!(
        r#"Produce a single JSON object matching this exact schema.

Top-level keys:
  job_id             - use the provided value exactly
  generated_at       - ISO-8601 UTC timestamp string

property_identification:
  property_name, address, city, state (2-letter), zip ("NNNNN" or "NNNNN-NNNN"),
  county, legal_description, tax_parcel_numbers (list of strings),
  current_owner, year_built (int 1900-2030), effective_age (int 0-130)

property_physical:
  total_units (int 1-2000), total_buildings (int >= 1),
  building_type ("garden-style" | "mid-rise" | "high-rise"),
  stories (int 1-100), gross_building_area_sf (int > 0),
  site_area_acres (float > 0), site_area_sf (int > 0),
  parking_spaces (int), parking_ratio (float >= 0),
  unit_mix (list of objects):
    unit_type (str), count (int > 0), avg_size_sf (int > 0),
    total_sf (int), bedrooms (int), bathrooms (int >= 1)
    RULE: total_sf = count * avg_size_sf
  amenities (list of strings)
  RULE: sum of unit_mix[].count = total_units

market_data:
  submarket (str), submarket_vacancy_rate (float 0-100),
  submarket_rent_growth_yoy (float),
  comparable_properties (list, at least 4):
    name, address, units (int > 0), year_built (int 1900-2030),
    occupancy (float 0-100), avg_rent_per_unit (float > 0)
  comparable_sales (list, at least 3):
    property (str), sale_date (str ISO date), sale_price (int > 0), units (int > 0),
    price_per_unit (int), cap_rate (float 0-100), noi (int > 0)
    RULE: price_per_unit = round(sale_price / units), within {per_unit}

financial_data:
  effective_date (str ISO date),
  occupancy:
    physical_percent (float 0-100), occupied_units (int), vacant_units (int)
    RULE: occupied_units + vacant_units = total_units
  market_rents_monthly (object unit_type -> int)
  in_place_rents_monthly (object unit_type -> int)
  pro_forma_income:
    potential_gross_rental_income (int > 0), other_income (int >= 0),
    potential_gross_income (int), vacancy_collection_loss_percent (float 0-100),
    vacancy_collection_loss_amount (int >= 0), effective_gross_income (int)
    RULE: potential_gross_income = potential_gross_rental_income + other_income
    RULE: effective_gross_income = potential_gross_income - vacancy_collection_loss_amount
  pro_forma_expenses:
    real_estate_taxes, insurance, utilities, repairs_maintenance, payroll,
    management_fee_percent (float 0-100), management_fee_amount (int),
    marketing, administrative, replacement_reserves (all int >= 0),
    total_operating_expenses (int), expense_per_unit (int)
    RULE: total_operating_expenses = sum of the nine line items above
  net_operating_income (int > 0)
    RULE: net_operating_income = effective_gross_income - total_operating_expenses
  historical_t12 (object with exactly {years} keys "year_1", "year_2", "year_3"):
    rental_income (int), other_income (int), vacancy_loss (int, negative),
    effective_gross_income (int), operating_expenses (int),
    net_operating_income (int)
    RULE: effective_gross_income = rental_income + other_income + vacancy_loss
    RULE: net_operating_income = effective_gross_income - operating_expenses

valuation:
  sales_comparison_approach:
    indicated_value (int > 0), value_per_unit (int), value_per_sf (float)
  income_approach:
    stabilized_noi (int > 0), cap_rate (float 0-100), indicated_value (int > 0)
    RULE: cap_rate = round(stabilized_noi / indicated_value * 100, 2), within {cap}
  final_value_conclusion:
    market_value (int > 0), value_per_unit (int), value_per_sf (float),
    effective_date (str ISO date)
  RULE (each approach and the conclusion):
    value_per_unit = round(value / total_units), within {per_unit}
    value_per_sf = round(value / gross_building_area_sf, 2)"#,
        per_unit = PER_UNIT_TOLERANCE,
        years = HISTORICAL_YEARS,
        cap = CAP_RATE_TOLERANCE,
    )
}

/// The first-attempt prompt for a job.
pub fn build_prompt(input: &UserInput, job_id: Uuid, tools_enabled: bool) -> String {
    let property_name = input
        .property_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or("Generate an appropriate professional property name");

    let mut prompt = format!(
        r#"Generate complete, realistic crosswalk data for a synthetic multifamily
appraisal report based on the following user input:

Property Name: {property_name}
Property Address: {address}
City: {city}
State: {state}
Total Units: {units}
Year Built: {year_built}
Property Type: {property_type}

Use this job_id exactly: {job_id}

---
SCHEMA REQUIREMENTS:
{schema}
---

Decide on realistic line-item values for the {city}, {state} market, then derive
every total from them."#,
        property_name = property_name,
        address = input.address,
        city = input.city,
        state = input.state,
        units = input.units,
        year_built = input.year_built,
        property_type = input.property_type,
        job_id = job_id,
        schema = schema_description(),
    );

    if tools_enabled {
        prompt.push_str("\n\n");
        prompt.push_str(TOOL_WORKFLOW);
    }

    prompt
}

/// Append one round of corrective feedback to the running prompt.
pub fn append_feedback(prompt: &mut String, attempt: u32, feedback: &str) {
    prompt.push_str(&format!(
        "\n\nATTEMPT {} FAILED VALIDATION.\n{}",
        attempt, feedback
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuildingType;

    fn input() -> UserInput {
        UserInput {
            property_name: None,
            address: "1234 Main Street".to_string(),
            city: "Denver".to_string(),
            state: "CO".to_string(),
            units: 200,
            year_built: 2018,
            property_type: BuildingType::MidRise,
        }
    }

    #[test]
    fn test_prompt_carries_facts_and_job_id() {
        let job_id = Uuid::new_v4();
        let prompt = build_prompt(&input(), job_id, false);

        assert!(prompt.contains(&format!("Use this job_id exactly: {}", job_id)));
        assert!(prompt.contains("Total Units: 200"));
        assert!(prompt.contains("Property Type: mid-rise"));
        assert!(prompt.contains("Generate an appropriate professional property name"));
        assert!(prompt.contains(&schema_description()));
        assert!(!prompt.contains("compute_financial_metrics"));
    }

    #[test]
    fn test_tool_workflow_only_when_enabled() {
        let prompt = build_prompt(&input(), Uuid::new_v4(), true);
        assert!(prompt.contains("compute_valuation_metrics"));
    }

    #[test]
    fn test_schema_states_every_identity() {
        let schema = schema_description();
        for rule in [
            "total_sf = count * avg_size_sf",
            "sum of unit_mix[].count = total_units",
            "occupied_units + vacant_units = total_units",
            "net_operating_income = effective_gross_income - total_operating_expenses",
            "cap_rate = round(stabilized_noi / indicated_value * 100, 2), within 0.05",
            "price_per_unit = round(sale_price / units), within 1",
        ] {
            assert!(schema.contains(rule), "missing rule: {}", rule);
        }
    }

    #[test]
    fn test_feedback_accumulates() {
        let mut prompt = String::from("base");
        append_feedback(&mut prompt, 1, "first");
        append_feedback(&mut prompt, 2, "second");

        assert!(prompt.starts_with("base"));
        assert!(prompt.contains("ATTEMPT 1 FAILED VALIDATION.\nfirst"));
        assert!(prompt.ends_with("ATTEMPT 2 FAILED VALIDATION.\nsecond"));
    }
}
