use chrono::NaiveDate;
use crosswalk_engine::{
    backend::SyntheticBackend,
    tools::arithmetic::{financial_metrics, valuation_metrics, ExpenseLineItems},
    validation::check,
    BuildingType, CrosswalkDocument, UserInput,
};
use proptest::prelude::*;
use proptest::test_runner::Config;

const VALID: &str = include_str!("fixtures/crosswalk_valid.json");

fn fixture() -> CrosswalkDocument {
    serde_json::from_str(VALID).expect("fixture decodes")
}

fn building_type() -> impl Strategy<Value = BuildingType> {
    prop_oneof![
        Just(BuildingType::GardenStyle),
        Just(BuildingType::MidRise),
        Just(BuildingType::HighRise),
    ]
}

proptest! {
    #![proptest_config(Config::with_cases(128))]

    #[test]
    fn unit_mix_area_must_match_its_factors(
        avg_size_sf in 300_u32..2_500_u32,
        delta in prop_oneof![-500_i64..0, 1_i64..500],
    ) {
        let mut document = fixture();
        let row = &mut document.property_physical.unit_mix[0];
        row.avg_size_sf = avg_size_sf;
        row.total_sf = u64::from(row.count) * u64::from(avg_size_sf);
        prop_assert!(check(&document).is_empty());

        let row = &mut document.property_physical.unit_mix[0];
        row.total_sf = (row.total_sf as i64 + delta) as u64;
        let violations = check(&document);
        prop_assert!(violations
            .iter()
            .any(|v| v.field == "property_physical.unit_mix[0].total_sf"));
    }

    #[test]
    fn occupancy_must_sum_to_total_units(delta in prop_oneof![-10_i64..0, 1_i64..50]) {
        let mut document = fixture();
        let total = i64::from(document.property_physical.total_units);
        let occupancy = &mut document.financial_data.occupancy;
        occupancy.vacant_units = (total - i64::from(occupancy.occupied_units) + delta) as u32;

        prop_assert!(!document.validate_occupancy_units());
        let violations = check(&document);
        prop_assert!(violations.iter().any(|v| v.field == "financial_data.occupancy"));
    }

    #[test]
    fn income_rollups_hold(
        rental in 100_000_i64..50_000_000,
        other in 0_i64..2_000_000,
        vacancy_percent in 0_u32..25,
        items in proptest::array::uniform9(0_i64..1_000_000),
    ) {
        let vacancy = rental * i64::from(vacancy_percent) / 100;
        let expenses = ExpenseLineItems {
            real_estate_taxes: items[0],
            insurance: items[1],
            utilities: items[2],
            repairs_maintenance: items[3],
            payroll: items[4],
            management_fee_amount: items[5],
            marketing: items[6],
            administrative: items[7],
            replacement_reserves: items[8],
        };

        let metrics = financial_metrics(rental, other, vacancy, &expenses).unwrap();
        prop_assert_eq!(metrics.potential_gross_income, rental + other);
        prop_assert_eq!(metrics.effective_gross_income, rental + other - vacancy);
        prop_assert_eq!(metrics.total_operating_expenses, items.iter().sum::<i64>());
        prop_assert_eq!(
            metrics.net_operating_income,
            metrics.effective_gross_income - metrics.total_operating_expenses
        );
    }

    #[test]
    fn capitalised_value_reproduces_its_cap_rate(
        noi in 100_000_i64..50_000_000,
        cap_bp in 300_u32..1_200,
        units in 1_u32..2_000,
        gba in 10_000_u64..2_000_000,
    ) {
        let cap_rate = f64::from(cap_bp) / 100.0;
        let metrics = valuation_metrics(noi, cap_rate, units, gba).unwrap();

        let implied = (noi as f64 / metrics.indicated_value as f64 * 100.0 * 100.0).round() / 100.0;
        prop_assert!((implied - cap_rate).abs() < 0.05);

        let per_unit = (metrics.indicated_value as f64 / f64::from(units)).round() as i64;
        prop_assert!((metrics.value_per_unit - per_unit).abs() <= 1);
    }

    #[test]
    fn synthetic_documents_always_validate(
        units in 10_i64..=500,
        year_built in 1950_i64..=2026,
        property_type in building_type(),
    ) {
        let input = UserInput {
            property_name: None,
            address: "77 Harbor Way".to_string(),
            city: "Tacoma".to_string(),
            state: "WA".to_string(),
            units,
            year_built,
            property_type,
        };
        let backend = SyntheticBackend::new()
            .with_effective_date(NaiveDate::from_ymd_opt(2026, 6, 30).unwrap());

        let document = backend.build(&input).unwrap();
        let violations = check(&document);
        prop_assert!(violations.is_empty(), "{:?}", violations);
        prop_assert!(document.validate_cap_rate());
        prop_assert!(document.validate_value_per_unit());
    }
}
