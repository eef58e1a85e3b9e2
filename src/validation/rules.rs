//! Field constraints and cross-field identities

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::Display;

use super::{Violation, HISTORICAL_YEAR_LABELS, PER_SF_TOLERANCE, PER_UNIT_TOLERANCE};
use crate::models::{
    round2, ComparableProperty, ComparableSale, CrosswalkDocument, FinancialData,
    HistoricalYear, MarketData, Occupancy, ProFormaExpenses, ProFormaIncome,
    PropertyIdentification, PropertyPhysical, UnitMixRow, UserInput, Valuation,
};

lazy_static! {
    static ref ZIP_PATTERN: Regex = Regex::new(r"^\d{5}(-\d{4})?$").expect("zip pattern");
}

const FLOAT_EPSILON: f64 = 1e-9;

/// Accumulates violations; never stops at the first one.
pub(crate) struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    pub(crate) fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Vec<Violation> {
        self.violations
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    // -------------------------------------------------
    // Primitive constraints
    // -------------------------------------------------

    fn positive<T>(&mut self, field: &str, value: T)
    where
        T: PartialOrd + Default + Display,
    {
        if value <= T::default() {
            self.push(Violation::new(field, format!("{} > 0", leaf(field)), value, "> 0"));
        }
    }

    fn non_negative<T>(&mut self, field: &str, value: T)
    where
        T: PartialOrd + Default + Display,
    {
        if value < T::default() {
            self.push(Violation::new(field, format!("{} >= 0", leaf(field)), value, ">= 0"));
        }
    }

    fn between<T>(&mut self, field: &str, value: T, min: T, max: T)
    where
        T: PartialOrd + Display,
    {
        if value < min || value > max {
            let range = format!("{}..={}", min, max);
            self.push(Violation::new(
                field,
                format!("{} in {}", leaf(field), range),
                value,
                range,
            ));
        }
    }

    fn equals<T>(&mut self, field: &str, rule: &str, actual: T, expected: T)
    where
        T: PartialEq + Display,
    {
        if actual != expected {
            self.push(Violation::new(field, rule, actual, expected));
        }
    }

    fn not_blank(&mut self, field: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.push(Violation::new(
                field,
                format!("{} must not be empty", field),
                format!("{:?}", value),
                "non-empty text",
            ));
            return false;
        }
        true
    }

    fn state_code(&mut self, field: &str, value: &str) {
        let trimmed = value.trim();
        if trimmed.len() != 2 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            self.push(Violation::new(
                field,
                "state must be a 2-letter code",
                format!("{:?}", value),
                "two letters, e.g. \"CO\"",
            ));
        }
    }

    /// value_per_unit and value_per_sf derived from an indicated value.
    fn derived_ratios(
        &mut self,
        prefix: &str,
        value_label: &str,
        value: i64,
        value_per_unit: Option<i64>,
        value_per_sf: Option<f64>,
        physical: &PropertyPhysical,
    ) {
        if value <= 0 {
            return;
        }

        if let Some(actual) = value_per_unit {
            if physical.total_units > 0 {
                let expected = (value as f64 / f64::from(physical.total_units)).round() as i64;
                if actual.abs_diff(expected) > PER_UNIT_TOLERANCE.unsigned_abs() {
                    self.push(Violation::new(
                        format!("{}.value_per_unit", prefix),
                        format!(
                            "value_per_unit == round({} / property_physical.total_units) ± {}",
                            value_label, PER_UNIT_TOLERANCE
                        ),
                        actual,
                        expected,
                    ));
                }
            }
        }

        if let Some(actual) = value_per_sf {
            if physical.gross_building_area_sf > 0 {
                let expected = round2(value as f64 / physical.gross_building_area_sf as f64);
                if (actual - expected).abs() > PER_SF_TOLERANCE + FLOAT_EPSILON {
                    self.push(Violation::new(
                        format!("{}.value_per_sf", prefix),
                        format!(
                            "value_per_sf == round({} / property_physical.gross_building_area_sf, 2)",
                            value_label
                        ),
                        actual,
                        expected,
                    ));
                }
            }
        }
    }

    // -------------------------------------------------
    // Document
    // -------------------------------------------------

    pub(crate) fn document(&mut self, doc: &CrosswalkDocument) {
        self.property_identification(&doc.property_identification);
        self.property_physical(&doc.property_physical);
        self.market_data(&doc.market_data);
        self.financial_data(&doc.financial_data, &doc.property_physical);
        self.valuation(&doc.valuation, &doc.property_physical);
    }

    fn property_identification(&mut self, id: &PropertyIdentification) {
        const P: &str = "property_identification";

        self.state_code(&format!("{P}.state"), &id.state);
        if !ZIP_PATTERN.is_match(&id.zip) {
            self.push(Violation::new(
                format!("{P}.zip"),
                "zip must be 5 digits or ZIP+4 (NNNNN-NNNN)",
                format!("{:?}", id.zip),
                "e.g. \"80202\"",
            ));
        }
        self.between(&format!("{P}.year_built"), id.year_built, 1900, 2030);
        self.between(&format!("{P}.effective_age"), id.effective_age, 0, 130);
    }

    fn unit_mix_row(&mut self, prefix: &str, row: &UnitMixRow) {
        self.positive(&format!("{prefix}.count"), row.count);
        self.positive(&format!("{prefix}.avg_size_sf"), row.avg_size_sf);
        self.positive(&format!("{prefix}.total_sf"), row.total_sf);
        if row.bathrooms < 1 {
            self.push(Violation::new(
                format!("{prefix}.bathrooms"),
                "bathrooms >= 1",
                row.bathrooms,
                ">= 1",
            ));
        }

        let expected = u64::from(row.count) * u64::from(row.avg_size_sf);
        self.equals(
            &format!("{prefix}.total_sf"),
            "total_sf == count * avg_size_sf",
            row.total_sf,
            expected,
        );
    }

    fn property_physical(&mut self, physical: &PropertyPhysical) {
        const P: &str = "property_physical";

        self.between(&format!("{P}.total_units"), physical.total_units, 1, 2000);
        self.positive(&format!("{P}.total_buildings"), physical.total_buildings);
        self.between(&format!("{P}.stories"), physical.stories, 1, 100);
        self.positive(&format!("{P}.gross_building_area_sf"), physical.gross_building_area_sf);
        self.positive(&format!("{P}.site_area_acres"), physical.site_area_acres);
        self.positive(&format!("{P}.site_area_sf"), physical.site_area_sf);
        self.non_negative(&format!("{P}.parking_ratio"), physical.parking_ratio);

        for (i, row) in physical.unit_mix.iter().enumerate() {
            self.unit_mix_row(&format!("{P}.unit_mix[{i}]"), row);
        }

        self.equals(
            &format!("{P}.unit_mix"),
            "sum(unit_mix[].count) == total_units",
            physical.unit_mix_units(),
            u64::from(physical.total_units),
        );
    }

    fn comparable_property(&mut self, prefix: &str, comp: &ComparableProperty) {
        self.positive(&format!("{prefix}.units"), comp.units);
        self.between(&format!("{prefix}.year_built"), comp.year_built, 1900, 2030);
        self.between(&format!("{prefix}.occupancy"), comp.occupancy, 0.0, 100.0);
        self.positive(&format!("{prefix}.avg_rent_per_unit"), comp.avg_rent_per_unit);
    }

    fn comparable_sale(&mut self, prefix: &str, sale: &ComparableSale) {
        self.positive(&format!("{prefix}.sale_price"), sale.sale_price);
        self.positive(&format!("{prefix}.units"), sale.units);
        self.positive(&format!("{prefix}.price_per_unit"), sale.price_per_unit);
        self.positive(&format!("{prefix}.cap_rate"), sale.cap_rate);
        if sale.cap_rate > 100.0 {
            self.push(Violation::new(
                format!("{prefix}.cap_rate"),
                "cap_rate <= 100",
                sale.cap_rate,
                "<= 100",
            ));
        }
        self.positive(&format!("{prefix}.noi"), sale.noi);

        if sale.units > 0 {
            let expected = (sale.sale_price as f64 / f64::from(sale.units)).round() as i64;
            if sale.price_per_unit.abs_diff(expected) > PER_UNIT_TOLERANCE.unsigned_abs() {
                self.push(Violation::new(
                    format!("{prefix}.price_per_unit"),
                    format!(
                        "price_per_unit == round(sale_price / units) ± {}",
                        PER_UNIT_TOLERANCE
                    ),
                    sale.price_per_unit,
                    expected,
                ));
            }
        }
    }

    fn market_data(&mut self, market: &MarketData) {
        const P: &str = "market_data";

        self.between(
            &format!("{P}.submarket_vacancy_rate"),
            market.submarket_vacancy_rate,
            0.0,
            100.0,
        );

        if market.comparable_properties.is_empty() {
            self.push(Violation::new(
                format!("{P}.comparable_properties"),
                "at least one comparable property",
                0,
                ">= 1",
            ));
        }
        for (i, comp) in market.comparable_properties.iter().enumerate() {
            self.comparable_property(&format!("{P}.comparable_properties[{i}]"), comp);
        }

        if market.comparable_sales.is_empty() {
            self.push(Violation::new(
                format!("{P}.comparable_sales"),
                "at least one comparable sale",
                0,
                ">= 1",
            ));
        }
        for (i, sale) in market.comparable_sales.iter().enumerate() {
            self.comparable_sale(&format!("{P}.comparable_sales[{i}]"), sale);
        }
    }

    fn occupancy(&mut self, prefix: &str, occupancy: &Occupancy, total_units: u32) {
        self.between(
            &format!("{prefix}.physical_percent"),
            occupancy.physical_percent,
            0.0,
            100.0,
        );

        let sum = u64::from(occupancy.occupied_units) + u64::from(occupancy.vacant_units);
        if sum != u64::from(total_units) {
            self.push(Violation::new(
                prefix,
                "occupied_units + vacant_units == property_physical.total_units",
                format!(
                    "{} + {} = {}",
                    occupancy.occupied_units, occupancy.vacant_units, sum
                ),
                total_units,
            ));
        }
    }

    fn pro_forma_income(&mut self, prefix: &str, income: &ProFormaIncome) {
        self.positive(
            &format!("{prefix}.potential_gross_rental_income"),
            income.potential_gross_rental_income,
        );
        self.non_negative(&format!("{prefix}.other_income"), income.other_income);
        self.positive(&format!("{prefix}.potential_gross_income"), income.potential_gross_income);
        self.between(
            &format!("{prefix}.vacancy_collection_loss_percent"),
            income.vacancy_collection_loss_percent,
            0.0,
            100.0,
        );
        self.non_negative(
            &format!("{prefix}.vacancy_collection_loss_amount"),
            income.vacancy_collection_loss_amount,
        );
        self.positive(&format!("{prefix}.effective_gross_income"), income.effective_gross_income);

        self.equals(
            &format!("{prefix}.potential_gross_income"),
            "potential_gross_income == potential_gross_rental_income + other_income",
            i128::from(income.potential_gross_income),
            wide(income.potential_gross_rental_income) + wide(income.other_income),
        );
        self.equals(
            &format!("{prefix}.effective_gross_income"),
            "effective_gross_income == potential_gross_income - vacancy_collection_loss_amount",
            i128::from(income.effective_gross_income),
            wide(income.potential_gross_income) - wide(income.vacancy_collection_loss_amount),
        );
    }

    fn pro_forma_expenses(&mut self, prefix: &str, expenses: &ProFormaExpenses) {
        for (name, amount) in expenses.line_items() {
            self.non_negative(&format!("{prefix}.{name}"), amount);
        }
        self.between(
            &format!("{prefix}.management_fee_percent"),
            expenses.management_fee_percent,
            0.0,
            100.0,
        );
        self.non_negative(
            &format!("{prefix}.total_operating_expenses"),
            expenses.total_operating_expenses,
        );
        self.non_negative(&format!("{prefix}.expense_per_unit"), expenses.expense_per_unit);

        self.equals(
            &format!("{prefix}.total_operating_expenses"),
            "total_operating_expenses == sum of the 9 expense line items",
            i128::from(expenses.total_operating_expenses),
            expenses.line_item_total(),
        );
    }

    fn historical_year(&mut self, prefix: &str, year: &HistoricalYear) {
        if year.vacancy_loss > 0 {
            self.push(Violation::new(
                format!("{prefix}.vacancy_loss"),
                "vacancy_loss is recorded as a negative amount",
                year.vacancy_loss,
                "<= 0",
            ));
        }
        self.equals(
            &format!("{prefix}.effective_gross_income"),
            "effective_gross_income == rental_income + other_income + vacancy_loss",
            i128::from(year.effective_gross_income),
            wide(year.rental_income) + wide(year.other_income) + wide(year.vacancy_loss),
        );
        self.equals(
            &format!("{prefix}.net_operating_income"),
            "net_operating_income == effective_gross_income - operating_expenses",
            i128::from(year.net_operating_income),
            wide(year.effective_gross_income) - wide(year.operating_expenses),
        );
    }

    fn financial_data(&mut self, financial: &FinancialData, physical: &PropertyPhysical) {
        const P: &str = "financial_data";

        self.occupancy(&format!("{P}.occupancy"), &financial.occupancy, physical.total_units);
        self.pro_forma_income(&format!("{P}.pro_forma_income"), &financial.pro_forma_income);
        self.pro_forma_expenses(&format!("{P}.pro_forma_expenses"), &financial.pro_forma_expenses);

        self.positive(&format!("{P}.net_operating_income"), financial.net_operating_income);
        self.equals(
            &format!("{P}.net_operating_income"),
            "net_operating_income == pro_forma_income.effective_gross_income - \
             pro_forma_expenses.total_operating_expenses",
            i128::from(financial.net_operating_income),
            wide(financial.pro_forma_income.effective_gross_income)
                - wide(financial.pro_forma_expenses.total_operating_expenses),
        );

        let expected_keys = HISTORICAL_YEAR_LABELS.join(", ");
        for label in HISTORICAL_YEAR_LABELS {
            if !financial.historical_t12.contains_key(label) {
                self.push(Violation::new(
                    format!("{P}.historical_t12.{label}"),
                    format!("historical_t12 must contain {label}"),
                    "missing",
                    format!("keys {expected_keys}"),
                ));
            }
        }
        for (label, year) in &financial.historical_t12 {
            let field = format!("{P}.historical_t12.{label}");
            if !HISTORICAL_YEAR_LABELS.contains(&label.as_str()) {
                self.push(Violation::new(
                    field,
                    format!("historical_t12 has no key {label:?}"),
                    "unexpected key",
                    format!("keys {expected_keys}"),
                ));
                continue;
            }
            self.historical_year(&field, year);
        }
    }

    fn valuation(&mut self, valuation: &Valuation, physical: &PropertyPhysical) {
        const P: &str = "valuation";

        let sales = &valuation.sales_comparison_approach;
        let prefix = format!("{P}.sales_comparison_approach");
        self.positive(&format!("{prefix}.indicated_value"), sales.indicated_value);
        self.positive(&format!("{prefix}.value_per_unit"), sales.value_per_unit);
        self.positive(&format!("{prefix}.value_per_sf"), sales.value_per_sf);
        self.derived_ratios(
            &prefix,
            "indicated_value",
            sales.indicated_value,
            Some(sales.value_per_unit),
            Some(sales.value_per_sf),
            physical,
        );

        let income = &valuation.income_approach;
        let prefix = format!("{P}.income_approach");
        self.positive(&format!("{prefix}.stabilized_noi"), income.stabilized_noi);
        self.positive(&format!("{prefix}.cap_rate"), income.cap_rate);
        if income.cap_rate > 100.0 {
            self.push(Violation::new(
                format!("{prefix}.cap_rate"),
                "cap_rate <= 100",
                income.cap_rate,
                "<= 100",
            ));
        }
        self.positive(&format!("{prefix}.indicated_value"), income.indicated_value);
        if income.indicated_value > 0 {
            let expected =
                round2(income.stabilized_noi as f64 / income.indicated_value as f64 * 100.0);
            if (income.cap_rate - expected).abs() >= super::CAP_RATE_TOLERANCE {
                self.push(Violation::new(
                    format!("{prefix}.cap_rate"),
                    format!(
                        "cap_rate == round(stabilized_noi / indicated_value * 100, 2) ± {}",
                        super::CAP_RATE_TOLERANCE
                    ),
                    income.cap_rate,
                    expected,
                ));
            }
        }
        self.derived_ratios(
            &prefix,
            "indicated_value",
            income.indicated_value,
            income.value_per_unit,
            income.value_per_sf,
            physical,
        );

        let conclusion = &valuation.final_value_conclusion;
        let prefix = format!("{P}.final_value_conclusion");
        self.positive(&format!("{prefix}.market_value"), conclusion.market_value);
        self.positive(&format!("{prefix}.value_per_unit"), conclusion.value_per_unit);
        self.positive(&format!("{prefix}.value_per_sf"), conclusion.value_per_sf);
        self.derived_ratios(
            &prefix,
            "market_value",
            conclusion.market_value,
            Some(conclusion.value_per_unit),
            Some(conclusion.value_per_sf),
            physical,
        );
    }

    // -------------------------------------------------
    // User input
    // -------------------------------------------------

    pub(crate) fn user_input(&mut self, input: &UserInput) {
        self.not_blank("address", &input.address);
        self.not_blank("city", &input.city);
        if self.not_blank("state", &input.state) {
            self.state_code("state", &input.state);
        }
        self.between("units", input.units, 10, 500);
        self.between("year_built", input.year_built, 1950, 2026);
    }
}

/// Money identities are evaluated in i128 so extreme candidate values are
/// reported as violations instead of overflowing.
fn wide(amount: i64) -> i128 {
    i128::from(amount)
}

fn leaf(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}
