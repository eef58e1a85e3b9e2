//! Deterministic offline backend
//!
//! Builds a complete, internally consistent document from the user's facts,
//! deriving every total through the arithmetic tools. Used when no model
//! credential is configured, and as a known-good source in tests.

use super::{GenerationRequest, GenerativeBackend};
use crate::error::CrosswalkError;
use crate::models::{
    round2, BuildingType, ComparableProperty, ComparableSale, CrosswalkDocument,
    FinalValueConclusion, FinancialData, HistoricalYear, IncomeApproach, MarketData, Occupancy,
    ProFormaExpenses, ProFormaIncome, PropertyIdentification, PropertyPhysical,
    SalesComparisonApproach, UnitMixRow, UserInput, Valuation,
};
use crate::tools::arithmetic::{self, ExpenseLineItems};
use crate::validation::Violation;
use crate::Result;
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::debug;

const SQUARE_FEET_PER_ACRE: f64 = 43_560.0;

/// (unit type, share of units in percent, average size, bedrooms, bathrooms)
const UNIT_TYPES: [(&str, u32, u32, u32, u32); 4] = [
    ("Studio", 10, 450, 0, 1),
    ("1BR/1BA", 40, 700, 1, 1),
    ("2BR/2BA", 0, 950, 2, 2),
    ("3BR/2BA", 12, 1200, 3, 2),
];

struct Profile {
    stories: u32,
    rent_per_sf: f64,
    parking_ratio: f64,
    cap_rate: f64,
    site_coverage: f64,
    amenities: &'static [&'static str],
}

fn profile(building_type: BuildingType) -> Profile {
    match building_type {
        BuildingType::GardenStyle => Profile {
            stories: 3,
            rent_per_sf: 1.90,
            parking_ratio: 1.75,
            cap_rate: 5.75,
            site_coverage: 0.25,
            amenities: &["Swimming pool", "Fitness center", "Clubhouse", "Playground"],
        },
        BuildingType::MidRise => Profile {
            stories: 5,
            rent_per_sf: 2.20,
            parking_ratio: 1.40,
            cap_rate: 5.50,
            site_coverage: 0.45,
            amenities: &["Fitness center", "Rooftop deck", "Package lockers", "Garage parking"],
        },
        BuildingType::HighRise => Profile {
            stories: 15,
            rent_per_sf: 2.60,
            parking_ratio: 1.10,
            cap_rate: 5.25,
            site_coverage: 0.60,
            amenities: &["Concierge", "Fitness center", "Sky lounge", "Structured parking"],
        },
    }
}

pub struct SyntheticBackend {
    effective_date: Option<NaiveDate>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self {
            effective_date: None,
        }
    }

    /// Pin the valuation date; defaults to today.
    pub fn with_effective_date(mut self, date: NaiveDate) -> Self {
        self.effective_date = Some(date);
        self
    }

    pub fn build(&self, input: &UserInput) -> Result<CrosswalkDocument> {
        let effective_date = self
            .effective_date
            .unwrap_or_else(|| Utc::now().date_naive());
        build_document(input, effective_date)
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let mut document = self.build(request.input)?;
        document.job_id = request.job_id;
        debug!(job_id = %request.job_id, attempt = request.attempt, "Synthetic draft built");
        document.to_json()
    }
}

fn round_to(value: f64, step: f64) -> i64 {
    ((value / step).round() * step) as i64
}

fn per_unit(value: i64, units: u32) -> i64 {
    (value as f64 / f64::from(units)).round() as i64
}

fn per_sf(value: i64, gba: u64) -> f64 {
    round2(value as f64 / gba as f64)
}

/// Stable small number derived from text, for zip codes and parcel ids.
fn stable_seed(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Split units across the four types; the two-bedroom row absorbs the remainder.
fn unit_mix(total_units: u32) -> Vec<UnitMixRow> {
    let studio = total_units * UNIT_TYPES[0].1 / 100;
    let one_bed = total_units * UNIT_TYPES[1].1 / 100;
    let three_bed = total_units * UNIT_TYPES[3].1 / 100;
    let two_bed = total_units - studio - one_bed - three_bed;

    UNIT_TYPES
        .iter()
        .zip([studio, one_bed, two_bed, three_bed])
        .filter(|(_, count)| *count > 0)
        .map(|(&(unit_type, _, avg_size_sf, bedrooms, bathrooms), count)| UnitMixRow {
            unit_type: unit_type.to_string(),
            count,
            avg_size_sf,
            total_sf: arithmetic::unit_mix_total_sf(count, avg_size_sf).value,
            bedrooms,
            bathrooms,
        })
        .collect()
}

fn historical_year(factor: f64, rental: i64, other: i64, opex: i64) -> HistoricalYear {
    let rental_income = round_to(rental as f64 * factor, 1.0);
    let other_income = round_to(other as f64 * factor, 1.0);
    let vacancy_loss = -round_to((rental_income + other_income) as f64 * 0.07, 1.0);
    let effective_gross_income = rental_income + other_income + vacancy_loss;
    let operating_expenses = round_to(opex as f64 * (factor - 0.02), 1.0);

    HistoricalYear {
        rental_income,
        other_income,
        vacancy_loss,
        effective_gross_income,
        operating_expenses,
        net_operating_income: effective_gross_income - operating_expenses,
    }
}

fn build_document(input: &UserInput, effective_date: NaiveDate) -> Result<CrosswalkDocument> {
    let total_units = u32::try_from(input.units)
        .ok()
        .filter(|units| *units > 0)
        .ok_or_else(|| {
            CrosswalkError::InvalidInput(vec![Violation::new(
                "units",
                "units > 0",
                input.units,
                "> 0",
            )])
        })?;
    let units = i64::from(total_units);
    let profile = profile(input.property_type);
    let seed = stable_seed(&format!("{}|{}|{}", input.address, input.city, input.state));

    // ---------- Physical ----------
    let mix = unit_mix(total_units);
    let mix_sf: u64 = mix.iter().map(|row| row.total_sf).sum();
    let gross_building_area_sf = mix_sf + mix_sf * 15 / 100;
    let footprint = gross_building_area_sf as f64 / f64::from(profile.stories);
    let site_area_sf = (footprint / profile.site_coverage).round() as u64;
    let site_area_acres = round2(site_area_sf as f64 / SQUARE_FEET_PER_ACRE).max(0.01);
    let parking_spaces = (f64::from(total_units) * profile.parking_ratio).round() as u32;
    let total_buildings = match input.property_type {
        BuildingType::GardenStyle => total_units.div_ceil(24),
        BuildingType::MidRise => 1 + total_units / 250,
        BuildingType::HighRise => 1,
    };

    let physical = PropertyPhysical {
        total_units,
        total_buildings,
        building_type: input.property_type,
        stories: profile.stories,
        gross_building_area_sf,
        site_area_acres,
        site_area_sf,
        parking_spaces,
        parking_ratio: round2(f64::from(parking_spaces) / f64::from(total_units)),
        unit_mix: mix,
        amenities: profile.amenities.iter().map(|a| a.to_string()).collect(),
    };

    // ---------- Rents and income ----------
    let mut market_rents_monthly = BTreeMap::new();
    let mut in_place_rents_monthly = BTreeMap::new();
    let mut potential_gross_rental_income = 0i64;
    for row in &physical.unit_mix {
        let market = round_to(f64::from(row.avg_size_sf) * profile.rent_per_sf, 5.0);
        let in_place = round_to(market as f64 * 0.97, 5.0);
        potential_gross_rental_income += market * i64::from(row.count) * 12;
        market_rents_monthly.insert(row.unit_type.clone(), market);
        in_place_rents_monthly.insert(row.unit_type.clone(), in_place);
    }

    let other_income = units * 600;
    let vacancy_percent = 6.0;
    let potential_gross_income = potential_gross_rental_income + other_income;
    let vacancy_amount = round_to(potential_gross_income as f64 * vacancy_percent / 100.0, 1.0);
    let management_percent = 4.0;
    let management_fee_amount = round_to(
        (potential_gross_income - vacancy_amount) as f64 * management_percent / 100.0,
        1.0,
    );

    let expenses = ExpenseLineItems {
        real_estate_taxes: units * 900,
        insurance: units * 350,
        utilities: units * 450,
        repairs_maintenance: units * 500,
        payroll: units * 1_100,
        management_fee_amount,
        marketing: units * 100,
        administrative: units * 150,
        replacement_reserves: units * 300,
    };
    let metrics = arithmetic::financial_metrics(
        potential_gross_rental_income,
        other_income,
        vacancy_amount,
        &expenses,
    )?;

    let occupied_units = (f64::from(total_units) * 0.94).round() as u32;
    let occupancy = Occupancy {
        physical_percent: round2(f64::from(occupied_units) / f64::from(total_units) * 100.0),
        occupied_units,
        vacant_units: total_units - occupied_units,
    };

    let historical_t12 = [("year_1", 0.91), ("year_2", 0.94), ("year_3", 0.97)]
        .into_iter()
        .map(|(label, factor)| {
            (
                label.to_string(),
                historical_year(
                    factor,
                    potential_gross_rental_income,
                    other_income,
                    metrics.total_operating_expenses,
                ),
            )
        })
        .collect();

    let financial = FinancialData {
        effective_date,
        occupancy,
        market_rents_monthly,
        in_place_rents_monthly,
        pro_forma_income: ProFormaIncome {
            potential_gross_rental_income,
            other_income,
            potential_gross_income: metrics.potential_gross_income,
            vacancy_collection_loss_percent: vacancy_percent,
            vacancy_collection_loss_amount: vacancy_amount,
            effective_gross_income: metrics.effective_gross_income,
        },
        pro_forma_expenses: ProFormaExpenses {
            real_estate_taxes: expenses.real_estate_taxes,
            insurance: expenses.insurance,
            utilities: expenses.utilities,
            repairs_maintenance: expenses.repairs_maintenance,
            payroll: expenses.payroll,
            management_fee_percent: management_percent,
            management_fee_amount: expenses.management_fee_amount,
            marketing: expenses.marketing,
            administrative: expenses.administrative,
            replacement_reserves: expenses.replacement_reserves,
            total_operating_expenses: metrics.total_operating_expenses,
            expense_per_unit: per_unit(metrics.total_operating_expenses, total_units),
        },
        net_operating_income: metrics.net_operating_income,
        historical_t12,
    };

    // ---------- Valuation ----------
    let noi = metrics.net_operating_income;
    let income = arithmetic::valuation_metrics(
        noi,
        profile.cap_rate,
        total_units,
        gross_building_area_sf,
    )?;
    let sales_value = round_to(income.indicated_value as f64 * 1.02, 100_000.0);
    let market_value = round_to(income.indicated_value as f64, 100_000.0);

    let valuation = Valuation {
        sales_comparison_approach: SalesComparisonApproach {
            indicated_value: sales_value,
            value_per_unit: per_unit(sales_value, total_units),
            value_per_sf: per_sf(sales_value, gross_building_area_sf),
        },
        income_approach: IncomeApproach {
            stabilized_noi: noi,
            cap_rate: profile.cap_rate,
            indicated_value: income.indicated_value,
            value_per_unit: Some(income.value_per_unit),
            value_per_sf: Some(income.value_per_sf),
        },
        final_value_conclusion: FinalValueConclusion {
            market_value,
            value_per_unit: per_unit(market_value, total_units),
            value_per_sf: per_sf(market_value, gross_building_area_sf),
            effective_date,
        },
    };

    // ---------- Market ----------
    let average_rent = potential_gross_rental_income as f64 / 12.0 / f64::from(total_units);
    let comparable_properties = [
        ("Commons", 0.85, -6, 94.5, 0.96),
        ("Crossing", 1.10, 3, 95.2, 1.04),
        ("Station", 0.95, -2, 93.1, 1.00),
        ("Heights", 1.25, 8, 96.0, 1.08),
    ]
    .into_iter()
    .map(|(suffix, size, age, occupancy, rent)| ComparableProperty {
        name: format!("{} {}", input.city, suffix),
        address: format!("{} {} Avenue", 100 + (seed % 900), suffix),
        units: ((f64::from(total_units) * size).round() as u32).max(10),
        year_built: (input.year_built as i32 + age).clamp(1900, 2030),
        occupancy,
        avg_rent_per_unit: round2(average_rent * rent),
    })
    .collect::<Vec<_>>();

    let noi_per_unit = noi as f64 / f64::from(total_units);
    let mut comparable_sales = Vec::with_capacity(3);
    for (i, (suffix, spread)) in [("Pointe", 0.25), ("Landing", -0.15), ("Terrace", 0.10)]
        .into_iter()
        .enumerate()
    {
        let comp = &comparable_properties[i];
        let cap_rate = round2(profile.cap_rate + spread);
        let sale_noi = (noi_per_unit * f64::from(comp.units)).round() as i64;
        let sale_price = round_to(sale_noi as f64 / (cap_rate / 100.0), 10_000.0);
        let sale_date = effective_date - Duration::days(60 + 120 * i as i64);

        comparable_sales.push(ComparableSale {
            property: format!("{} {}", input.city, suffix),
            sale_date: sale_date.format("%Y-%m-%d").to_string(),
            sale_price,
            units: comp.units,
            price_per_unit: arithmetic::price_per_unit(sale_price, comp.units)?.value,
            cap_rate,
            noi: sale_noi,
        });
    }

    // ---------- Identification ----------
    let property_name = input
        .property_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {} Residences", input.city.trim(), suffix_for(input)));
    let year_built = input.year_built as i32;
    let effective_age = ((effective_date.year() - year_built).max(0) * 7 / 10).min(130);

    let identification = PropertyIdentification {
        current_owner: format!("{} Holdings LLC", property_name),
        property_name,
        address: input.address.trim().to_string(),
        city: input.city.trim().to_string(),
        state: input.state.trim().to_ascii_uppercase(),
        zip: format!("{:05}", 10_000 + seed % 89_999),
        county: format!("{} County", input.city.trim()),
        legal_description: format!("Lot {}, Block {}", 1 + seed % 40, 1 + (seed / 40) % 60),
        tax_parcel_numbers: vec![format!(
            "{:03}-{:03}-{:03}",
            seed % 1000,
            (seed / 1000) % 1000,
            (seed / 1_000_000) % 1000
        )],
        year_built,
        effective_age,
    };

    Ok(CrosswalkDocument {
        job_id: uuid::Uuid::nil(),
        generated_at: Utc::now(),
        property_identification: identification,
        property_physical: physical,
        market_data: MarketData {
            submarket: format!("Central {}", input.city.trim()),
            submarket_vacancy_rate: 5.5,
            submarket_rent_growth_yoy: 3.2,
            comparable_properties,
            comparable_sales,
        },
        financial_data: financial,
        valuation,
    })
}

fn suffix_for(input: &UserInput) -> &'static str {
    match input.property_type {
        BuildingType::GardenStyle => "Gardens",
        BuildingType::MidRise => "Lofts",
        BuildingType::HighRise => "Tower",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{check, validate_candidate};
    use crate::verification::create_default_plausibility_checker;
    use uuid::Uuid;

    fn input(units: i64, property_type: BuildingType) -> UserInput {
        UserInput {
            property_name: None,
            address: "1234 Main Street".to_string(),
            city: "Denver".to_string(),
            state: "co".to_string(),
            units,
            year_built: 2018,
            property_type,
        }
    }

    fn backend() -> SyntheticBackend {
        SyntheticBackend::new().with_effective_date(NaiveDate::from_ymd_opt(2026, 2, 10).unwrap())
    }

    #[test]
    fn test_documents_validate_across_sizes_and_types() {
        for property_type in BuildingType::ALL {
            for units in [10, 11, 57, 200, 333, 500] {
                let document = backend().build(&input(units, property_type)).unwrap();
                let violations = check(&document);
                assert!(
                    violations.is_empty(),
                    "{} units {}: {:?}",
                    property_type,
                    units,
                    violations
                );
            }
        }
    }

    #[test]
    fn test_documents_are_plausible() {
        let document = backend().build(&input(200, BuildingType::GardenStyle)).unwrap();
        let warnings = create_default_plausibility_checker().check(&document);
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_build_is_deterministic_apart_from_timestamp() {
        let a = backend().build(&input(120, BuildingType::MidRise)).unwrap();
        let mut b = backend().build(&input(120, BuildingType::MidRise)).unwrap();
        b.generated_at = a.generated_at;
        assert_eq!(a, b);
        assert_eq!(a.property_identification.state, "CO");
        assert_eq!(a.property_identification.property_name, "Denver Lofts Residences");
    }

    #[tokio::test]
    async fn test_generate_emits_candidate_for_job() {
        let job_id = Uuid::new_v4();
        let input = input(200, BuildingType::HighRise);
        let request = GenerationRequest {
            job_id,
            input: &input,
            system: "",
            prompt: "",
            attempt: 1,
        };

        let text = backend().generate(&request).await.unwrap();
        let document = validate_candidate(&text, job_id).unwrap();
        assert_eq!(document.job_id, job_id);
        assert_eq!(document.property_physical.total_units, 200);
    }

    #[test]
    fn test_rejects_non_positive_units() {
        assert!(matches!(
            backend().build(&input(0, BuildingType::GardenStyle)),
            Err(CrosswalkError::InvalidInput(_))
        ));
    }
}
