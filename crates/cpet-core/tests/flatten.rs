mod common;

use std::collections::BTreeMap;

use anyhow::Result;
use cpet_core::aggregation::{CohortRecord, COHORT_METRICS};
use cpet_core::config::EngineConfig;
use cpet_core::flatten::{breath_frame, cohort_frame, summary_frame};
use cpet_core::outputs::write_parquet_bytes;
use cpet_core::pipelines::{analyze_session, CancelFlag};

use common::{session, RampExport};

#[test]
fn breath_frame_has_one_row_per_breath() -> Result<()> {
    let result = analyze_session(
        &session("F-1", RampExport::default().render()),
        &EngineConfig::default(),
        &CancelFlag::new(),
    )?;
    let df = breath_frame(&result)?;

    assert_eq!(df.height(), result.samples.len());
    let phase = df.column("phase")?.str()?;
    assert_eq!(phase.get(0), Some("exercise"));
    let vo2 = df.column("vo2_ml_min")?.f64()?;
    assert_eq!(vo2.get(0), result.samples[0].vo2_ml_min);
    let ids = df.column("test_id")?.str()?;
    assert!(ids.into_iter().all(|id| id == Some("F-1")));
    Ok(())
}

#[test]
fn summary_frame_is_a_single_record() -> Result<()> {
    let result = analyze_session(
        &session("F-2", RampExport::default().render()),
        &EngineConfig::default(),
        &CancelFlag::new(),
    )?;
    let df = summary_frame(&result)?;

    assert_eq!(df.height(), 1);
    assert_eq!(df.column("at_method")?.str()?.get(0), Some("v_slope"));
    assert_eq!(df.column("at_confidence")?.str()?.get(0), Some("high"));
    assert_eq!(df.column("trim_method")?.str()?.get(0), Some("phase_tags"));
    assert_eq!(
        df.column("peak_workload_w")?.f64()?.get(0),
        result.summary.peak_workload_w
    );
    Ok(())
}

#[test]
fn cohort_frame_spreads_groups_and_metrics() -> Result<()> {
    let records = vec![
        CohortRecord {
            test_id: "a".into(),
            version: 1,
            groups: BTreeMap::from([("sex".to_string(), "f".to_string())]),
            metrics: BTreeMap::from([("peak_vo2_ml_min".to_string(), 2500.0)]),
        },
        CohortRecord {
            test_id: "b".into(),
            version: 3,
            groups: BTreeMap::from([("age_band".to_string(), "40-49".to_string())]),
            metrics: BTreeMap::new(),
        },
    ];
    let df = cohort_frame(&records)?;

    assert_eq!(df.height(), 2);
    assert_eq!(df.width(), 2 + 2 + COHORT_METRICS.len());
    let sex = df.column("group_sex")?.str()?;
    assert_eq!(sex.get(0), Some("f"));
    assert_eq!(sex.get(1), None);
    let peak = df.column("peak_vo2_ml_min")?.f64()?;
    assert_eq!(peak.get(0), Some(2500.0));
    assert_eq!(peak.get(1), None);
    Ok(())
}

#[test]
fn frames_serialise_to_parquet() -> Result<()> {
    let result = analyze_session(
        &session("F-3", RampExport::default().render()),
        &EngineConfig::default(),
        &CancelFlag::new(),
    )?;
    let bytes = write_parquet_bytes(&breath_frame(&result)?)?;
    assert!(bytes.starts_with(b"PAR1"));
    assert!(bytes.ends_with(b"PAR1"));
    Ok(())
}
