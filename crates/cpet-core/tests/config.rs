use std::io::Write;

use cpet_core::config::{AtMethod, EngineConfig};
use cpet_core::EngineError;

#[test]
fn partial_toml_keeps_defaults() {
    let config = EngineConfig::from_toml_str(
        r#"
        [trimming]
        min_samples = 30

        [thresholds]
        at_method = "rer_crossing"
        rer_band = 1.05
        "#,
    )
    .unwrap();

    assert_eq!(config.trimming.min_samples, 30);
    assert_eq!(config.trimming.sustain_s, 20.0);
    assert_eq!(config.thresholds.at_method, AtMethod::RerCrossing);
    assert_eq!(config.thresholds.rer_band, 1.05);
    assert_eq!(config.metrics.peak_window_s, 30.0);
    assert_eq!(config.cohort.percentiles, vec![10.0, 25.0, 50.0, 75.0, 90.0]);
    assert_eq!(config.ingest.max_samples, 100_000);
}

#[test]
fn empty_toml_is_the_default_config() {
    assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
}

#[test]
fn invalid_values_are_rejected() {
    let cases = [
        "[trimming]\nend_fraction_of_peak = 1.5",
        "[metrics]\npeak_window_s = 0",
        "[cohort]\npercentiles = []",
        "[cohort]\npercentiles = [0, 50]",
        "[thresholds]\nvslope_min_segment = 2",
        "[thresholds]\nat_method = \"lactate\"",
    ];
    for case in cases {
        let err = EngineConfig::from_toml_str(case).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)), "accepted: {case}");
    }
}

#[test]
fn load_prefixes_errors_with_the_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[ingest]\nmax_samples = 0").unwrap();

    let err = EngineConfig::load(file.path()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains(&file.path().display().to_string()));
    assert!(message.contains("max_samples"));
}

#[test]
fn fingerprint_tracks_policy_values() {
    let base = EngineConfig::default();
    let mut changed = base.clone();
    changed.thresholds.smoothing_window_s = 20.0;

    assert_eq!(base.fingerprint(), EngineConfig::default().fingerprint());
    assert_ne!(base.fingerprint(), changed.fingerprint());
}
