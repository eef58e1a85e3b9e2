//! Derived-value arithmetic
//!
//! Pure functions that compute the roll-ups a crosswalk document must satisfy,
//! each paired with a formula string for the audit trail. The generator calls
//! them while drafting and the API exposes them as verification oracles.

use serde::{Deserialize, Serialize};

use crate::error::CrosswalkError;
use crate::models::round2;
use crate::Result;

/// The nine operating expense line items, in statement order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpenseLineItems {
    pub real_estate_taxes: i64,
    pub insurance: i64,
    pub utilities: i64,
    pub repairs_maintenance: i64,
    pub payroll: i64,
    pub management_fee_amount: i64,
    pub marketing: i64,
    pub administrative: i64,
    pub replacement_reserves: i64,
}

impl ExpenseLineItems {
    pub fn as_array(&self) -> [i64; 9] {
        [
            self.real_estate_taxes,
            self.insurance,
            self.utilities,
            self.repairs_maintenance,
            self.payroll,
            self.management_fee_amount,
            self.marketing,
            self.administrative,
            self.replacement_reserves,
        ]
    }

    /// Sum of the line items, or `None` if it leaves the i64 range.
    pub fn total(&self) -> Option<i64> {
        self.as_array()
            .iter()
            .try_fold(0_i64, |acc, amount| acc.checked_add(*amount))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinancialFormulas {
    pub pgi: String,
    pub egi: String,
    pub expenses: String,
    pub noi: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinancialMetrics {
    pub potential_gross_income: i64,
    pub effective_gross_income: i64,
    pub total_operating_expenses: i64,
    pub net_operating_income: i64,
    pub formulas: FinancialFormulas,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValuationFormulas {
    pub value: String,
    pub per_unit: String,
    pub per_sf: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuationMetrics {
    pub indicated_value: i64,
    pub value_per_unit: i64,
    pub value_per_sf: f64,
    pub formulas: ValuationFormulas,
}

/// A single derived figure with its working.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Derived<T> {
    pub value: T,
    pub formula: String,
}

/// Outcome of [`verify_sum`]; a mismatch is information, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SumCheck {
    pub matches: bool,
    pub actual: i64,
    pub difference: i64,
    pub summary: String,
}

/// PGI, EGI, total operating expenses and NOI from the income and expense lines.
pub fn financial_metrics(
    rental_income: i64,
    other_income: i64,
    vacancy_loss_amount: i64,
    expenses: &ExpenseLineItems,
) -> Result<FinancialMetrics> {
    let pgi = rental_income
        .checked_add(other_income)
        .ok_or(CrosswalkError::ArithmeticOverflow("potential_gross_income"))?;
    let egi = pgi
        .checked_sub(vacancy_loss_amount)
        .ok_or(CrosswalkError::ArithmeticOverflow("effective_gross_income"))?;
    let total = expenses
        .total()
        .ok_or(CrosswalkError::ArithmeticOverflow("total_operating_expenses"))?;
    let noi = egi
        .checked_sub(total)
        .ok_or(CrosswalkError::ArithmeticOverflow("net_operating_income"))?;

    let terms = expenses
        .as_array()
        .iter()
        .map(|amount| amount.to_string())
        .collect::<Vec<_>>()
        .join(" + ");

    Ok(FinancialMetrics {
        potential_gross_income: pgi,
        effective_gross_income: egi,
        total_operating_expenses: total,
        net_operating_income: noi,
        formulas: FinancialFormulas {
            pgi: format!("{} + {} = {}", rental_income, other_income, pgi),
            egi: format!("{} - {} = {}", pgi, vacancy_loss_amount, egi),
            expenses: format!("{} = {}", terms, total),
            noi: format!("{} - {} = {}", egi, total, noi),
        },
    })
}

/// Capitalised value and its per-unit and per-square-foot ratios.
pub fn valuation_metrics(
    noi: i64,
    cap_rate_percent: f64,
    total_units: u32,
    gross_building_area_sf: u64,
) -> Result<ValuationMetrics> {
    if cap_rate_percent == 0.0 {
        return Err(CrosswalkError::DivisionError("cap_rate_percent"));
    }
    if total_units == 0 {
        return Err(CrosswalkError::DivisionError("total_units"));
    }
    if gross_building_area_sf == 0 {
        return Err(CrosswalkError::DivisionError("gross_building_area_sf"));
    }

    let indicated_value = (noi as f64 / (cap_rate_percent / 100.0)).round() as i64;
    let value_per_unit = (indicated_value as f64 / f64::from(total_units)).round() as i64;
    let value_per_sf = round2(indicated_value as f64 / gross_building_area_sf as f64);

    Ok(ValuationMetrics {
        indicated_value,
        value_per_unit,
        value_per_sf,
        formulas: ValuationFormulas {
            value: format!("{} / ({}% / 100) = {}", noi, cap_rate_percent, indicated_value),
            per_unit: format!("{} / {} = {}", indicated_value, total_units, value_per_unit),
            per_sf: format!(
                "{} / {} = {:.2}",
                indicated_value, gross_building_area_sf, value_per_sf
            ),
        },
    })
}

pub fn price_per_unit(sale_price: i64, units: u32) -> Result<Derived<i64>> {
    if units == 0 {
        return Err(CrosswalkError::DivisionError("units"));
    }

    let value = (sale_price as f64 / f64::from(units)).round() as i64;
    Ok(Derived {
        value,
        formula: format!("{} / {} = {}", sale_price, units, value),
    })
}

pub fn unit_mix_total_sf(count: u32, avg_size_sf: u32) -> Derived<u64> {
    let value = u64::from(count) * u64::from(avg_size_sf);
    Derived {
        value,
        formula: format!("{} * {} = {}", count, avg_size_sf, value),
    }
}

/// Never fails: a sum outside the i64 range is reported as a mismatch, with
/// `actual` and `difference` saturated and the exact figures in the summary.
pub fn verify_sum(values: &[i64], expected_total: i64) -> SumCheck {
    let wide_actual: i128 = values.iter().map(|v| i128::from(*v)).sum();
    let wide_difference = wide_actual - i128::from(expected_total);
    let matches = wide_difference == 0;
    let actual = saturate(wide_actual);
    let difference = saturate(wide_difference);

    let summary = if matches {
        format!(
            "CORRECT: sum({:?}) = {} matches expected {}",
            values, wide_actual, expected_total
        )
    } else {
        format!(
            "MISMATCH: sum({:?}) = {}, but expected {}. Difference: {}",
            values, wide_actual, expected_total, wide_difference
        )
    };

    SumCheck {
        matches,
        actual,
        difference,
        summary,
    }
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expenses_totalling_700k() -> ExpenseLineItems {
        ExpenseLineItems {
            real_estate_taxes: 200_000,
            insurance: 60_000,
            utilities: 80_000,
            repairs_maintenance: 90_000,
            payroll: 120_000,
            management_fee_amount: 88_500,
            marketing: 15_000,
            administrative: 16_500,
            replacement_reserves: 30_000,
        }
    }

    #[test]
    fn test_financial_metrics() {
        let metrics =
            financial_metrics(3_000_000, 100_000, 150_000, &expenses_totalling_700k()).unwrap();

        assert_eq!(metrics.potential_gross_income, 3_100_000);
        assert_eq!(metrics.effective_gross_income, 2_950_000);
        assert_eq!(metrics.total_operating_expenses, 700_000);
        assert_eq!(metrics.net_operating_income, 2_250_000);
        assert_eq!(metrics.formulas.pgi, "3000000 + 100000 = 3100000");
        assert_eq!(metrics.formulas.noi, "2950000 - 700000 = 2250000");
        assert!(metrics.formulas.expenses.ends_with("= 700000"));
    }

    #[test]
    fn test_valuation_metrics() {
        let metrics = valuation_metrics(2_250_000, 7.5, 150, 120_000).unwrap();

        assert_eq!(metrics.indicated_value, 30_000_000);
        assert_eq!(metrics.value_per_unit, 200_000);
        assert_eq!(metrics.value_per_sf, 250.00);
        assert_eq!(metrics.formulas.per_sf, "30000000 / 120000 = 250.00");
    }

    #[test]
    fn test_valuation_metrics_rejects_zero_divisors() {
        assert!(matches!(
            valuation_metrics(2_250_000, 0.0, 150, 120_000),
            Err(CrosswalkError::DivisionError("cap_rate_percent"))
        ));
        assert!(matches!(
            valuation_metrics(2_250_000, 7.5, 0, 120_000),
            Err(CrosswalkError::DivisionError("total_units"))
        ));
        assert!(matches!(
            valuation_metrics(2_250_000, 7.5, 150, 0),
            Err(CrosswalkError::DivisionError("gross_building_area_sf"))
        ));
    }

    #[test]
    fn test_price_per_unit_rounds() {
        let ppu = price_per_unit(28_500_000, 180).unwrap();
        assert_eq!(ppu.value, 158_333);
        assert_eq!(ppu.formula, "28500000 / 180 = 158333");

        assert!(price_per_unit(28_500_000, 0).is_err());
    }

    #[test]
    fn test_unit_mix_total_sf() {
        let total = unit_mix_total_sf(75, 950);
        assert_eq!(total.value, 71_250);
        assert_eq!(total.formula, "75 * 950 = 71250");
    }

    #[test]
    fn test_verify_sum_reports_difference() {
        let ok = verify_sum(&[1, 2, 3], 6);
        assert!(ok.matches);
        assert!(ok.summary.starts_with("CORRECT"));

        let off = verify_sum(&[1, 2, 3], 10);
        assert!(!off.matches);
        assert_eq!(off.actual, 6);
        assert_eq!(off.difference, -4);
        assert!(off.summary.contains("Difference: -4"));
    }

    #[test]
    fn test_verify_sum_reports_overflow_as_mismatch() {
        let check = verify_sum(&[i64::MAX, 1], 0);
        assert!(!check.matches);
        assert_eq!(check.actual, i64::MAX);
        assert_eq!(check.difference, i64::MAX);
        assert!(check.summary.contains("= 9223372036854775808,"));

        let exact = verify_sum(&[i64::MAX, 1, -1], i64::MAX);
        assert!(exact.matches);
        assert_eq!(exact.difference, 0);
    }

    #[test]
    fn test_financial_metrics_overflow_is_an_error() {
        let result = financial_metrics(i64::MAX, 1, 0, &ExpenseLineItems::default());
        assert!(matches!(
            result,
            Err(CrosswalkError::ArithmeticOverflow("potential_gross_income"))
        ));

        let expenses = ExpenseLineItems {
            real_estate_taxes: i64::MAX,
            insurance: 1,
            ..ExpenseLineItems::default()
        };
        assert!(matches!(
            financial_metrics(1_000, 0, 0, &expenses),
            Err(CrosswalkError::ArithmeticOverflow("total_operating_expenses"))
        ));
    }
}
