mod common;

use cpet_core::calculator::derive_window;
use cpet_core::cleaning::clean_series;
use cpet_core::config::{AtMethod, ThresholdConfig, TrimmingConfig};
use cpet_core::thresholds::detect_thresholds;
use cpet_core::trimming::trim_session;
use cpet_core::types::{Confidence, DerivedBreathSample, DetectionMethod, MarkerKind};
use cpet_core::BreathSample;

use common::{ramp_breaths, subject, AT_VO2};

fn window_of(breaths: &[BreathSample]) -> Vec<DerivedBreathSample> {
    let cleaned = clean_series(breaths);
    let window = trim_session(&cleaned, &TrimmingConfig::default()).unwrap();
    derive_window(&cleaned, &window, &subject())
}

fn flat_breaths(count: usize, vo2: f64, vco2: f64) -> Vec<BreathSample> {
    (0..count)
        .map(|i| {
            let mut b = BreathSample::new(i as f64 * 5.0);
            b.vo2_ml_min = Some(vo2);
            b.vco2_ml_min = Some(vco2);
            b
        })
        .collect()
}

#[test]
fn v_slope_finds_the_ventilatory_breakpoint() {
    let samples = window_of(&ramp_breaths(true, true));
    let markers = detect_thresholds(&samples, &ThresholdConfig::default());

    let at = &markers[0];
    assert_eq!(at.kind, MarkerKind::AnaerobicThreshold);
    assert_eq!(at.method, DetectionMethod::VSlope);
    assert_eq!(at.confidence, Confidence::High);
    assert_eq!(at.breath_index, Some(48));
    assert_eq!(at.elapsed_s, Some(360.0));
    assert_eq!(at.vo2_ml_min, Some(AT_VO2));
    // slopes 0.85 below and 1.4 above the breakpoint
    assert!((at.value.unwrap() - 0.55).abs() < 0.01);
}

#[test]
fn rer_crossing_reports_its_method() {
    let samples = window_of(&ramp_breaths(true, true));
    let config = ThresholdConfig {
        at_method: AtMethod::RerCrossing,
        ..ThresholdConfig::default()
    };
    let at = &detect_thresholds(&samples, &config)[0];

    assert_eq!(at.method, DetectionMethod::RerCrossing);
    assert_eq!(at.confidence, Confidence::High);
    assert_eq!(at.breath_index, Some(82));
    assert_eq!(at.elapsed_s, Some(530.0));
    assert!(at.value.unwrap() >= 1.0);
}

#[test]
fn fatmax_sits_at_the_crossover() {
    let samples = window_of(&ramp_breaths(true, true));

    let smoothed = &detect_thresholds(&samples, &ThresholdConfig::default())[1];
    assert_eq!(smoothed.kind, MarkerKind::Fatmax);
    assert_eq!(smoothed.method, DetectionMethod::FatOxidationPeak);
    assert_eq!(smoothed.breath_index, Some(47));

    let raw_config = ThresholdConfig {
        smooth_fat_oxidation: false,
        ..ThresholdConfig::default()
    };
    let raw = &detect_thresholds(&samples, &raw_config)[1];
    assert_eq!(raw.breath_index, Some(48));
    assert!((raw.value.unwrap() - 1.67 * 0.15 * 2.2).abs() < 1e-9);
}

#[test]
fn fatmax_ties_resolve_to_the_earliest_breath() {
    let samples = window_of(&flat_breaths(30, 2000.0, 1700.0));
    let config = ThresholdConfig {
        smooth_fat_oxidation: false,
        ..ThresholdConfig::default()
    };
    let fatmax = &detect_thresholds(&samples, &config)[1];
    assert_eq!(fatmax.breath_index, Some(0));
    assert_eq!(fatmax.confidence, Confidence::High);
}

#[test]
fn flat_series_is_low_confidence_without_an_index() {
    let samples = window_of(&flat_breaths(30, 2000.0, 1700.0));
    let at = &detect_thresholds(&samples, &ThresholdConfig::default())[0];

    assert!(at.is_low_confidence());
    assert_eq!(at.breath_index, None);
    assert_eq!(at.elapsed_s, None);
    assert!(at.note.as_deref().unwrap().contains("too flat"));
}

#[test]
fn short_series_is_low_confidence() {
    let samples = window_of(&flat_breaths(20, 2000.0, 1700.0));
    let config = ThresholdConfig {
        vslope_min_segment: 15,
        ..ThresholdConfig::default()
    };
    let at = &detect_thresholds(&samples, &config)[0];
    assert!(at.is_low_confidence());
    assert!(at.note.as_deref().unwrap().contains("need 30"));
}

#[test]
fn rer_already_above_band_is_low_confidence() {
    let samples = window_of(&flat_breaths(30, 2000.0, 2300.0));
    let config = ThresholdConfig {
        at_method: AtMethod::RerCrossing,
        ..ThresholdConfig::default()
    };
    let markers = detect_thresholds(&samples, &config);
    assert!(markers[0].is_low_confidence());
    assert_eq!(markers[0].method, DetectionMethod::RerCrossing);
    // VCO2 above VO2 clamps fat oxidation to zero everywhere
    assert!(markers[1].is_low_confidence());
}

#[test]
fn incomplete_breaths_are_skipped() {
    let mut breaths = ramp_breaths(true, true);
    breaths[30].vco2_ml_min = None;
    let samples = window_of(&breaths);
    assert!(samples[6].incomplete);

    let markers = detect_thresholds(&samples, &ThresholdConfig::default());
    for marker in &markers {
        if let Some(index) = marker.breath_index {
            assert!(!samples[index].incomplete);
        }
    }
}

#[test]
fn detection_is_deterministic() {
    let samples = window_of(&ramp_breaths(true, true));
    for method in [AtMethod::VSlope, AtMethod::RerCrossing] {
        let config = ThresholdConfig {
            at_method: method,
            ..ThresholdConfig::default()
        };
        assert_eq!(
            detect_thresholds(&samples, &config),
            detect_thresholds(&samples, &config)
        );
    }
}

#[test]
fn empty_window_with_zero_lengths_gives_low_confidence() {
    for method in [AtMethod::VSlope, AtMethod::RerCrossing] {
        let config = ThresholdConfig {
            at_method: method,
            rer_sustain_samples: 0,
            vslope_min_segment: 0,
            ..ThresholdConfig::default()
        };
        let markers = detect_thresholds(&[], &config);
        assert_eq!(markers.len(), 2);
        assert!(markers.iter().all(|m| m.is_low_confidence()));
        assert!(markers.iter().all(|m| m.breath_index.is_none()));
    }
}

#[test]
fn zero_segment_length_still_locates_the_breakpoint() {
    let samples = window_of(&ramp_breaths(true, true));
    let config = ThresholdConfig {
        vslope_min_segment: 0,
        ..ThresholdConfig::default()
    };
    let at = &detect_thresholds(&samples, &config)[0];
    assert_eq!(at.method, DetectionMethod::VSlope);
    assert!(at.breath_index.is_some());
}
