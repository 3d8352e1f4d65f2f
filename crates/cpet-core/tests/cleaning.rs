use cpet_core::cleaning::{
    cho_oxidation_g_min, clean_series, fat_oxidation_g_min, impute_missing_oxidation,
};
use cpet_core::BreathSample;
use proptest::prelude::*;

fn gas_breath(t: f64, vo2: Option<f64>, vco2: Option<f64>) -> BreathSample {
    let mut breath = BreathSample::new(t);
    breath.vo2_ml_min = vo2;
    breath.vco2_ml_min = vco2;
    breath
}

#[test]
fn aerobic_steady_state_oxidises_both_substrates() {
    let fat = fat_oxidation_g_min(3000.0, 2400.0);
    let cho = cho_oxidation_g_min(3000.0, 2400.0);
    assert!((fat - 1.002).abs() < 1e-9);
    assert!((cho - 1.29).abs() < 1e-9);

    let cleaned = clean_series(&[gas_breath(0.0, Some(3000.0), Some(2400.0))]);
    let sample = &cleaned.samples()[0];
    assert_eq!(sample.fat_ox_g_min, Some(fat));
    assert_eq!(sample.cho_ox_g_min, Some(cho));
    assert!(sample.oxidation_imputed);
    assert!(!sample.incomplete);
}

#[test]
fn sentinels_become_absent_not_zero() {
    let mut breath = gas_breath(0.0, Some(2000.0), Some(1800.0));
    breath.reported_rer = Some(f64::NAN);
    breath.hr_bpm = Some(f64::INFINITY);
    breath.reported_fat_g_min = Some(f64::NEG_INFINITY);

    let cleaned = clean_series(&[breath]);
    let sample = &cleaned.samples()[0];
    assert_eq!(sample.breath.reported_rer, None);
    assert_eq!(sample.breath.hr_bpm, None);
    assert_eq!(sample.breath.reported_fat_g_min, None);
    // the sentinel fat value is replaced by the Frayn estimate
    assert!((sample.fat_ox_g_min.unwrap() - fat_oxidation_g_min(2000.0, 1800.0)).abs() < 1e-12);
    assert_eq!(cleaned.report().sentinels_removed, 3);
}

#[test]
fn unpaired_gas_reading_is_dropped_and_flagged() {
    let breaths = [
        gas_breath(0.0, Some(1500.0), None),
        gas_breath(5.0, Some(f64::NAN), Some(1200.0)),
        gas_breath(10.0, Some(-5.0), Some(1200.0)),
        gas_breath(15.0, Some(1500.0), Some(1300.0)),
    ];
    let cleaned = clean_series(&breaths);

    for sample in &cleaned.samples()[..3] {
        assert!(sample.incomplete);
        assert_eq!(sample.breath.vo2_ml_min, None);
        assert_eq!(sample.breath.vco2_ml_min, None);
        assert_eq!(sample.fat_ox_g_min, None);
        assert_eq!(sample.cho_ox_g_min, None);
    }
    assert!(cleaned.samples()[3].is_complete());
    assert_eq!(cleaned.report().incomplete_samples, 3);
    assert_eq!(cleaned.complete_count(), 1);
    // incomplete breaths stay in the series
    assert_eq!(cleaned.len(), 4);
}

#[test]
fn reported_oxidation_is_kept_and_negative_values_clamped() {
    let mut kept = gas_breath(0.0, Some(2000.0), Some(1600.0));
    kept.reported_fat_g_min = Some(0.42);
    let mut negative = gas_breath(5.0, Some(2000.0), Some(1600.0));
    negative.reported_cho_g_min = Some(-0.3);

    let cleaned = clean_series(&[kept, negative]);
    let samples = cleaned.samples();
    assert_eq!(samples[0].fat_ox_g_min, Some(0.42));
    assert_eq!(samples[1].cho_ox_g_min, Some(0.0));
    assert_eq!(cleaned.report().negative_oxidation_clamped, 1);
    assert_eq!(cleaned.report().fat_imputed, 1);
    assert_eq!(cleaned.report().cho_imputed, 1);
}

proptest! {
    #[test]
    fn frayn_rates_are_never_negative(vo2 in 0.0f64..8000.0, vco2 in 0.0f64..10000.0) {
        prop_assert!(fat_oxidation_g_min(vo2, vco2) >= 0.0);
        prop_assert!(cho_oxidation_g_min(vo2, vco2) >= 0.0);
    }

    #[test]
    fn imputation_is_idempotent(
        gases in prop::collection::vec(
            (prop::option::of(1.0f64..6000.0), prop::option::of(1.0f64..7000.0), prop::option::of(-1.0f64..2.0)),
            1..40,
        )
    ) {
        let breaths: Vec<BreathSample> = gases
            .iter()
            .enumerate()
            .map(|(idx, (vo2, vco2, fat))| {
                let mut breath = gas_breath(idx as f64, *vo2, *vco2);
                breath.reported_fat_g_min = *fat;
                breath
            })
            .collect();

        let once = clean_series(&breaths);
        let mut twice = once.samples().to_vec();
        let (fat, cho) = impute_missing_oxidation(&mut twice);

        prop_assert_eq!((fat, cho), (0, 0));
        prop_assert_eq!(once.samples(), twice.as_slice());
        for sample in &twice {
            prop_assert!(sample.fat_ox_g_min.map_or(true, |v| v >= 0.0));
            prop_assert!(sample.cho_ox_g_min.map_or(true, |v| v >= 0.0));
        }
    }
}
