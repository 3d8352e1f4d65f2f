use std::collections::BTreeSet;

use polars::prelude::{Column, DataFrame, NamedFrom, PolarsError, Series};

use crate::aggregation::{CohortRecord, COHORT_METRICS};
use crate::types::{AnalysisResult, DerivedBreathSample, MarkerKind, ThresholdMarker};

fn f64_column(
    name: &str,
    samples: &[DerivedBreathSample],
    value: impl Fn(&DerivedBreathSample) -> Option<f64>,
) -> Column {
    let values: Vec<Option<f64>> = samples.iter().map(value).collect();
    Series::new(name.into(), values).into()
}

/// One row per breath of the analysis window.
pub fn breath_frame(result: &AnalysisResult) -> Result<DataFrame, PolarsError> {
    let samples = &result.samples;
    let rows = samples.len();

    let phase: Vec<Option<&str>> = samples
        .iter()
        .map(|s| s.phase.map(|p| p.as_str()))
        .collect();
    let raw_index: Vec<u64> = samples.iter().map(|s| s.raw_index as u64).collect();
    let elapsed: Vec<f64> = samples.iter().map(|s| s.elapsed_s).collect();
    let imputed: Vec<bool> = samples.iter().map(|s| s.oxidation_imputed).collect();
    let incomplete: Vec<bool> = samples.iter().map(|s| s.incomplete).collect();

    let columns: Vec<Column> = vec![
        Series::new("test_id".into(), vec![result.test_id.as_str(); rows]).into(),
        Series::new("version".into(), vec![result.version; rows]).into(),
        Series::new("raw_index".into(), raw_index).into(),
        Series::new("elapsed_s".into(), elapsed).into(),
        Series::new("phase".into(), phase).into(),
        f64_column("vo2_ml_min", samples, |s| s.vo2_ml_min),
        f64_column("vco2_ml_min", samples, |s| s.vco2_ml_min),
        f64_column("ve_l_min", samples, |s| s.ve_l_min),
        f64_column("hr_bpm", samples, |s| s.hr_bpm),
        f64_column("workload_w", samples, |s| s.workload_w),
        f64_column("rer", samples, |s| s.rer),
        f64_column("fat_ox_g_min", samples, |s| s.fat_ox_g_min),
        f64_column("cho_ox_g_min", samples, |s| s.cho_ox_g_min),
        Series::new("oxidation_imputed".into(), imputed).into(),
        f64_column("vo2_ml_kg_min", samples, |s| s.vo2_ml_kg_min),
        f64_column("ve_vo2", samples, |s| s.ve_vo2),
        f64_column("ve_vco2", samples, |s| s.ve_vco2),
        f64_column("o2_pulse_ml_beat", samples, |s| s.o2_pulse_ml_beat),
        f64_column("vo2_ml_min_per_w", samples, |s| s.vo2_ml_min_per_w),
        Series::new("incomplete".into(), incomplete).into(),
    ];

    DataFrame::new(columns)
}

/// Single-row summary record including both threshold markers.
pub fn summary_frame(result: &AnalysisResult) -> Result<DataFrame, PolarsError> {
    let summary = &result.summary;
    let at = result.marker(MarkerKind::AnaerobicThreshold);
    let fatmax = result.marker(MarkerKind::Fatmax);

    let scalar = |name: &str, value: Option<f64>| -> Column {
        Series::new(name.into(), vec![value]).into()
    };
    let label = |name: &str, value: Option<&str>| -> Column {
        Series::new(name.into(), vec![value]).into()
    };
    let confidence = |marker: Option<&ThresholdMarker>| marker.map(|m| m.confidence.as_str());
    let method = |marker: Option<&ThresholdMarker>| marker.map(|m| m.method.as_str());

    let columns: Vec<Column> = vec![
        Series::new("test_id".into(), vec![result.test_id.as_str()]).into(),
        Series::new("version".into(), vec![result.version]).into(),
        label("cohort", result.cohort.as_deref()),
        Series::new("protocol".into(), vec![result.protocol.as_str()]).into(),
        Series::new("pipeline".into(), vec![result.pipeline.as_str()]).into(),
        Series::new("trim_method".into(), vec![result.window.method.as_str()]).into(),
        Series::new("content_hash".into(), vec![result.content_hash.as_str()]).into(),
        Series::new("trim_start".into(), vec![result.window.start as u64]).into(),
        Series::new("trim_end".into(), vec![result.window.end as u64]).into(),
        Series::new("sample_count".into(), vec![summary.sample_count as u64]).into(),
        Series::new(
            "complete_sample_count".into(),
            vec![summary.complete_sample_count as u64],
        )
        .into(),
        Series::new("duration_s".into(), vec![summary.duration_s]).into(),
        scalar("peak_vo2_ml_min", summary.peak_vo2_ml_min),
        scalar("peak_vo2_ml_kg_min", summary.peak_vo2_ml_kg_min),
        scalar("peak_workload_w", summary.peak_workload_w),
        scalar("peak_hr_bpm", summary.peak_hr_bpm),
        scalar("peak_rer", summary.peak_rer),
        scalar("ve_vco2_slope", summary.ve_vco2_slope),
        scalar("mean_fat_ox_g_min", summary.mean_fat_ox_g_min),
        scalar("mean_cho_ox_g_min", summary.mean_cho_ox_g_min),
        scalar("bmi", summary.bmi),
        label("at_method", method(at)),
        label("at_confidence", confidence(at)),
        scalar("at_elapsed_s", at.and_then(|m| m.elapsed_s)),
        scalar("at_vo2_ml_min", at.and_then(|m| m.vo2_ml_min)),
        scalar("at_workload_w", at.and_then(|m| m.workload_w)),
        label("fatmax_confidence", confidence(fatmax)),
        scalar("fatmax_elapsed_s", fatmax.and_then(|m| m.elapsed_s)),
        scalar("fatmax_g_min", fatmax.and_then(|m| m.value)),
        scalar("fatmax_workload_w", fatmax.and_then(|m| m.workload_w)),
    ];

    DataFrame::new(columns)
}

/// One row per test with every cohort metric and a `group_<key>` column per
/// grouping key seen in the records.
pub fn cohort_frame(records: &[CohortRecord]) -> Result<DataFrame, PolarsError> {
    let group_keys: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.groups.keys().map(String::as_str))
        .collect();

    let test_ids: Vec<&str> = records.iter().map(|r| r.test_id.as_str()).collect();
    let versions: Vec<u32> = records.iter().map(|r| r.version).collect();

    let mut columns: Vec<Column> = vec![
        Series::new("test_id".into(), test_ids).into(),
        Series::new("version".into(), versions).into(),
    ];
    for key in group_keys {
        let values: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.groups.get(key).map(String::as_str))
            .collect();
        columns.push(Series::new(format!("group_{key}").into(), values).into());
    }
    for metric in COHORT_METRICS {
        let values: Vec<Option<f64>> = records.iter().map(|r| r.metric(metric)).collect();
        columns.push(Series::new((*metric).into(), values).into());
    }

    DataFrame::new(columns)
}
