mod common;

use cpet_core::cleaning::clean_series;
use cpet_core::config::TrimmingConfig;
use cpet_core::trimming::trim_session;
use cpet_core::types::TrimMethod;
use cpet_core::{BreathSample, EngineError, PhaseTag};
use proptest::prelude::*;

use common::{ramp_breaths, BREATHS, EXERCISE_END, EXERCISE_START};

#[test]
fn phase_tags_select_the_exercise_span() {
    let cleaned = clean_series(&ramp_breaths(true, true));
    let window = trim_session(&cleaned, &TrimmingConfig::default()).unwrap();

    assert_eq!(window.method, TrimMethod::PhaseTags);
    assert_eq!(window.start, EXERCISE_START);
    assert_eq!(window.end, EXERCISE_END);
    assert_eq!(window.len(), 96);
}

#[test]
fn workload_ramp_is_used_without_tags() {
    let cleaned = clean_series(&ramp_breaths(false, true));
    let window = trim_session(&cleaned, &TrimmingConfig::default()).unwrap();

    assert_eq!(window.method, TrimMethod::Workload);
    // the 50 W warm-up plateau is left out; the window opens where the ramp leaves it
    assert_eq!(window.start, EXERCISE_START);
    // recovery at 25 W is below half of the 287.5 W peak
    assert_eq!(window.end, EXERCISE_END);
}

#[test]
fn short_workload_spike_is_not_a_start() {
    let mut breaths = ramp_breaths(false, true);
    // a 10 s blip during rest does not last the 20 s sustain period
    breaths[3].workload_w = Some(100.0);
    breaths[4].workload_w = Some(100.0);

    let cleaned = clean_series(&breaths);
    let window = trim_session(&cleaned, &TrimmingConfig::default()).unwrap();
    assert_eq!(window.start, EXERCISE_START);
}

fn loaded_breaths(loads: &[f64]) -> Vec<BreathSample> {
    loads
        .iter()
        .enumerate()
        .map(|(idx, load)| {
            let mut breath = BreathSample::new(idx as f64 * 5.0);
            breath.vo2_ml_min = Some(800.0 + 8.0 * load);
            breath.vco2_ml_min = Some(700.0 + 7.0 * load);
            breath.workload_w = Some(*load);
            breath
        })
        .collect()
}

#[test]
fn long_warm_up_plateau_is_trimmed_away() {
    // 30 s rest, 2 min at 80 W, then +3 W per breath up to 230 W, then 20 W recovery
    let mut loads = vec![0.0; 6];
    loads.extend(std::iter::repeat(80.0).take(24));
    let ramp_start = loads.len();
    loads.extend((1..=50).map(|k| 80.0 + 3.0 * k as f64));
    let ramp_end = loads.len() - 1;
    loads.extend(std::iter::repeat(20.0).take(6));

    let cleaned = clean_series(&loaded_breaths(&loads));
    let window = trim_session(&cleaned, &TrimmingConfig::default()).unwrap();

    assert_eq!(window.method, TrimMethod::Workload);
    // the last 80 W breath is where the climb begins
    assert_eq!(window.start, ramp_start - 1);
    assert_eq!(window.end, ramp_end);
    let warm_up_inside = (window.start..=window.end)
        .filter(|&idx| loads[idx] == 80.0)
        .count();
    assert_eq!(warm_up_inside, 1);
}

#[test]
fn constant_load_effort_starts_at_its_level() {
    let mut loads = vec![0.0; 6];
    loads.extend(std::iter::repeat(150.0).take(40));
    loads.extend(std::iter::repeat(0.0).take(4));

    let window = trim_session(&clean_series(&loaded_breaths(&loads)), &TrimmingConfig::default())
        .unwrap();
    assert_eq!((window.start, window.end), (6, 45));
}

#[test]
fn no_tags_and_no_workload_keeps_the_whole_series() {
    let cleaned = clean_series(&ramp_breaths(false, false));
    let window = trim_session(&cleaned, &TrimmingConfig::default()).unwrap();

    assert_eq!(window.method, TrimMethod::Untrimmed);
    assert_eq!((window.start, window.end), (0, BREATHS - 1));
}

#[test]
fn tags_without_exercise_are_insufficient() {
    let mut breaths = ramp_breaths(true, true);
    for breath in &mut breaths {
        if breath.phase == Some(PhaseTag::Exercise) {
            breath.phase = Some(PhaseTag::Rest);
        }
    }
    let err = trim_session(&clean_series(&breaths), &TrimmingConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientData {
            stage: "trim",
            found: 0,
            required: 20
        }
    ));
}

#[test]
fn window_below_floor_counts_only_complete_breaths() {
    let mut breaths = ramp_breaths(true, true);
    // knock out gas readings for most of the exercise span
    for breath in &mut breaths[EXERCISE_START..EXERCISE_START + 80] {
        breath.vco2_ml_min = None;
    }
    let err = trim_session(&clean_series(&breaths), &TrimmingConfig::default()).unwrap_err();
    match err {
        EngineError::InsufficientData { found, required, .. } => {
            assert_eq!(found, 16);
            assert_eq!(required, 20);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn empty_series_is_insufficient() {
    let err = trim_session(&clean_series(&[]), &TrimmingConfig::default()).unwrap_err();
    assert!(err.is_insufficient_data());
}

#[test]
fn imputed_oxidation_is_present_at_the_window_edges() {
    let cleaned = clean_series(&ramp_breaths(true, true));
    let window = trim_session(&cleaned, &TrimmingConfig::default()).unwrap();

    let first = &cleaned.samples()[window.start];
    let last = &cleaned.samples()[window.end];
    assert!(first.fat_ox_g_min.is_some() && first.cho_ox_g_min.is_some());
    assert!(last.fat_ox_g_min.is_some() && last.cho_ox_g_min.is_some());
}

proptest! {
    #[test]
    fn window_is_a_deterministic_subrange(
        loads in prop::collection::vec(prop::option::of(0.0f64..400.0), 25..120),
        spacing in 1.0f64..6.0,
    ) {
        let breaths: Vec<BreathSample> = loads
            .iter()
            .enumerate()
            .map(|(idx, load)| {
                let mut breath = BreathSample::new(idx as f64 * spacing);
                breath.vo2_ml_min = Some(1000.0 + idx as f64);
                breath.vco2_ml_min = Some(900.0 + idx as f64);
                breath.workload_w = *load;
                breath
            })
            .collect();
        let cleaned = clean_series(&breaths);
        let config = TrimmingConfig { min_samples: 2, ..TrimmingConfig::default() };

        let first = trim_session(&cleaned, &config);
        let second = trim_session(&cleaned, &config);
        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a, b);
                prop_assert!(a.start <= a.end && a.end < breaths.len());
                let raw_first = breaths[0].elapsed_s;
                let raw_last = breaths[breaths.len() - 1].elapsed_s;
                prop_assert!(breaths[a.start].elapsed_s >= raw_first);
                prop_assert!(breaths[a.end].elapsed_s <= raw_last);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            _ => prop_assert!(false, "trimming was not deterministic"),
        }
    }
}
