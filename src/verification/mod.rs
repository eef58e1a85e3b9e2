//! Business-plausibility checks for accepted documents
//!
//! Advisory only. Every rule runs, findings are collected as warnings,
//! and nothing here can reject a document.

use crate::models::{CrosswalkDocument, PlausibilityWarning, Severity};
use tracing::{info, warn};

/// Typical capitalization-rate band, in percent.
pub const CAP_RATE_BAND: (f64, f64) = (3.0, 12.0);

/// Typical value-per-unit band.
pub const VALUE_PER_UNIT_BAND: (i64, i64) = (30_000, 500_000);

/// Physical occupancy below this percentage is unusual.
pub const LOW_OCCUPANCY_PERCENT: f64 = 60.0;

/// Trait for plausibility rules
pub trait PlausibilityRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// A human-readable finding, or `None` when the document looks plausible.
    fn check(&self, document: &CrosswalkDocument) -> Option<String>;
}

/// Runs every registered rule and collects warnings in registration order
pub struct PlausibilityChecker {
    rules: Vec<Box<dyn PlausibilityRule>>,
}

impl PlausibilityChecker {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn PlausibilityRule>) {
        self.rules.push(rule);
    }

    pub fn check(&self, document: &CrosswalkDocument) -> Vec<PlausibilityWarning> {
        let warnings: Vec<PlausibilityWarning> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.check(document).map(|message| PlausibilityWarning {
                    rule: rule.name().to_string(),
                    message,
                    severity: Severity::Warning,
                })
            })
            .collect();

        for warning in &warnings {
            warn!(
                job_id = %document.job_id,
                rule = %warning.rule,
                "{}",
                warning.message
            );
        }

        info!(
            job_id = %document.job_id,
            rule_count = self.rules.len(),
            warning_count = warnings.len(),
            "Plausibility check completed"
        );

        warnings
    }
}

impl Default for PlausibilityChecker {
    fn default() -> Self {
        Self::new()
    }
}

//
// ========== Identity Rechecks ==========
//

pub struct CapRateIdentityRule;

impl PlausibilityRule for CapRateIdentityRule {
    fn name(&self) -> &'static str {
        "cap_rate_identity"
    }

    fn check(&self, document: &CrosswalkDocument) -> Option<String> {
        if document.validate_cap_rate() {
            return None;
        }
        Some(format!(
            "Cap rate mismatch: stated {}% vs calculated {}%",
            document.valuation.income_approach.cap_rate,
            document.expected_cap_rate()
        ))
    }
}

pub struct ValuePerUnitIdentityRule;

impl PlausibilityRule for ValuePerUnitIdentityRule {
    fn name(&self) -> &'static str {
        "value_per_unit_identity"
    }

    fn check(&self, document: &CrosswalkDocument) -> Option<String> {
        if document.validate_value_per_unit() {
            return None;
        }
        if document.property_physical.total_units == 0 {
            return Some("Value per unit cannot be checked: total_units is 0".to_string());
        }
        Some(format!(
            "Value per unit mismatch: stated {} vs calculated {}",
            document.valuation.final_value_conclusion.value_per_unit,
            document.expected_value_per_unit()
        ))
    }
}

pub struct OccupancySumRule;

impl PlausibilityRule for OccupancySumRule {
    fn name(&self) -> &'static str {
        "occupancy_sum"
    }

    fn check(&self, document: &CrosswalkDocument) -> Option<String> {
        if document.validate_occupancy_units() {
            return None;
        }
        let occupancy = &document.financial_data.occupancy;
        Some(format!(
            "Occupancy units mismatch: occupied({}) + vacant({}) != total({})",
            occupancy.occupied_units,
            occupancy.vacant_units,
            document.property_physical.total_units
        ))
    }
}

//
// ========== Market Bands ==========
//

pub struct UnitMixAreaRule;

impl PlausibilityRule for UnitMixAreaRule {
    fn name(&self) -> &'static str {
        "unit_mix_area"
    }

    fn check(&self, document: &CrosswalkDocument) -> Option<String> {
        let physical = &document.property_physical;
        let mix_sf = physical.unit_mix_total_sf();
        (mix_sf > physical.gross_building_area_sf).then(|| {
            format!(
                "Unit mix total SF ({}) exceeds gross building area ({})",
                thousands(mix_sf as i64),
                thousands(physical.gross_building_area_sf as i64)
            )
        })
    }
}

pub struct CapRateBandRule;

impl PlausibilityRule for CapRateBandRule {
    fn name(&self) -> &'static str {
        "cap_rate_band"
    }

    fn check(&self, document: &CrosswalkDocument) -> Option<String> {
        let cap = document.valuation.income_approach.cap_rate;
        let (low, high) = CAP_RATE_BAND;
        (cap < low || cap > high)
            .then(|| format!("Cap rate {}% outside typical {}-{}% range", cap, low, high))
    }
}

pub struct ValuePerUnitBandRule;

impl PlausibilityRule for ValuePerUnitBandRule {
    fn name(&self) -> &'static str {
        "value_per_unit_band"
    }

    fn check(&self, document: &CrosswalkDocument) -> Option<String> {
        let vpu = document.valuation.final_value_conclusion.value_per_unit;
        let (low, high) = VALUE_PER_UNIT_BAND;
        (vpu < low || vpu > high)
            .then(|| format!("Value per unit ${} outside typical range", thousands(vpu)))
    }
}

pub struct LowOccupancyRule;

impl PlausibilityRule for LowOccupancyRule {
    fn name(&self) -> &'static str {
        "low_occupancy"
    }

    fn check(&self, document: &CrosswalkDocument) -> Option<String> {
        let percent = document.financial_data.occupancy.physical_percent;
        (percent < LOW_OCCUPANCY_PERCENT)
            .then(|| format!("Occupancy {}% unusually low", percent))
    }
}

fn thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Create a checker with the standard rules
pub fn create_default_plausibility_checker() -> PlausibilityChecker {
    let mut checker = PlausibilityChecker::new();
    checker.add_rule(Box::new(CapRateIdentityRule));
    checker.add_rule(Box::new(ValuePerUnitIdentityRule));
    checker.add_rule(Box::new(OccupancySumRule));
    checker.add_rule(Box::new(UnitMixAreaRule));
    checker.add_rule(Box::new(CapRateBandRule));
    checker.add_rule(Box::new(ValuePerUnitBandRule));
    checker.add_rule(Box::new(LowOccupancyRule));
    checker
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = include_str!("../../tests/fixtures/crosswalk_valid.json");

    /// Decoded without validation, so tests can build implausible documents.
    fn document() -> CrosswalkDocument {
        serde_json::from_str(VALID).unwrap()
    }

    fn rules(warnings: &[PlausibilityWarning]) -> Vec<&str> {
        warnings.iter().map(|w| w.rule.as_str()).collect()
    }

    #[test]
    fn test_valid_document_has_no_warnings() {
        let checker = create_default_plausibility_checker();
        assert!(checker.check(&document()).is_empty());
    }

    #[test]
    fn test_all_rules_evaluated() {
        let mut doc = document();
        doc.valuation.income_approach.cap_rate = 15.0;
        doc.valuation.final_value_conclusion.value_per_unit = 600_000;
        doc.financial_data.occupancy.physical_percent = 55.0;
        doc.financial_data.occupancy.vacant_units = 20;
        doc.property_physical.gross_building_area_sf = 100_000;

        let warnings = create_default_plausibility_checker().check(&doc);
        assert_eq!(
            rules(&warnings),
            vec![
                "cap_rate_identity",
                "value_per_unit_identity",
                "occupancy_sum",
                "unit_mix_area",
                "cap_rate_band",
                "value_per_unit_band",
                "low_occupancy",
            ]
        );
        assert!(warnings.iter().all(|w| w.severity == Severity::Warning));
    }

    #[test]
    fn test_cap_rate_message_cites_both_values() {
        let mut doc = document();
        doc.valuation.income_approach.cap_rate = 8.39;

        let message = CapRateIdentityRule.check(&doc).unwrap();
        assert_eq!(message, "Cap rate mismatch: stated 8.39% vs calculated 7.39%");
    }

    #[test]
    fn test_unit_mix_area_message() {
        let mut doc = document();
        doc.property_physical.gross_building_area_sf = 150_000;

        let message = UnitMixAreaRule.check(&doc).unwrap();
        assert_eq!(
            message,
            "Unit mix total SF (166,250) exceeds gross building area (150,000)"
        );
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(600_000), "600,000");
        assert_eq!(thousands(-1_234_567), "-1,234,567");
    }
}
