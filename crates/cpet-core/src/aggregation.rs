use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::types::{AnalysisResult, MarkerKind};

/// Summary metrics a cohort can be compared on.
pub const COHORT_METRICS: &[&str] = &[
    "peak_vo2_ml_min",
    "peak_vo2_ml_kg_min",
    "peak_workload_w",
    "peak_hr_bpm",
    "peak_rer",
    "ve_vco2_slope",
    "at_vo2_ml_min",
    "at_workload_w",
    "fatmax_g_min",
    "fatmax_workload_w",
];

/// The per-test slice of a finalized result the aggregator works from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRecord {
    pub test_id: String,
    pub version: u32,
    pub groups: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

impl CohortRecord {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let summary = &result.summary;
        let confident = |kind: MarkerKind| result.marker(kind).filter(|m| !m.is_low_confidence());
        let at = confident(MarkerKind::AnaerobicThreshold);
        let fatmax = confident(MarkerKind::Fatmax);

        let candidates = [
            ("peak_vo2_ml_min", summary.peak_vo2_ml_min),
            ("peak_vo2_ml_kg_min", summary.peak_vo2_ml_kg_min),
            ("peak_workload_w", summary.peak_workload_w),
            ("peak_hr_bpm", summary.peak_hr_bpm),
            ("peak_rer", summary.peak_rer),
            ("ve_vco2_slope", summary.ve_vco2_slope),
            ("at_vo2_ml_min", at.and_then(|m| m.vo2_ml_min)),
            ("at_workload_w", at.and_then(|m| m.workload_w)),
            ("fatmax_g_min", fatmax.and_then(|m| m.value)),
            ("fatmax_workload_w", fatmax.and_then(|m| m.workload_w)),
        ];

        let metrics = candidates
            .into_iter()
            .filter_map(|(name, value)| {
                value
                    .filter(|v| v.is_finite())
                    .map(|v| (name.to_string(), v))
            })
            .collect();

        Self {
            test_id: result.test_id.clone(),
            version: result.version,
            groups: result.groups.clone(),
            metrics,
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileEntry {
    pub percentile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub label: String,
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupComparison {
    pub group_key: String,
    pub first: GroupStats,
    pub second: GroupStats,
    /// `first - second`.
    pub mean_difference: f64,
    pub median_difference: f64,
    /// Absent when both groups have zero spread.
    pub cohens_d: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub group_key: String,
    pub first: String,
    pub second: String,
}

/// Distribution of one metric across a cohort. Always recomputed from stored
/// results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub cohort: String,
    pub metric: String,
    pub n: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<PercentileEntry>,
    pub comparison: Option<GroupComparison>,
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

/// Nearest-rank percentile of ascending `sorted_values`: rank = ceil(p/100 * n).
pub fn nearest_rank(sorted_values: &[f64], percentile: f64) -> Option<f64> {
    if sorted_values.is_empty() {
        return None;
    }
    let n = sorted_values.len();
    let rank = ((percentile / 100.0) * n as f64).ceil() as usize;
    Some(sorted_values[rank.clamp(1, n) - 1])
}

pub fn percentile_table(values: &[f64], percentiles: &[f64]) -> Vec<PercentileEntry> {
    let sorted_values = sorted(values.to_vec());
    percentiles
        .iter()
        .filter_map(|&percentile| {
            nearest_rank(&sorted_values, percentile).map(|value| PercentileEntry { percentile, value })
        })
        .collect()
}

/// Share of the cohort at or below `value`, in percent.
pub fn percentile_rank(values: &[f64], value: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let at_or_below = values.iter().filter(|v| **v <= value).count();
    Some(100.0 * at_or_below as f64 / values.len() as f64)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(sorted_values: &[f64]) -> f64 {
    let n = sorted_values.len();
    if n % 2 == 1 {
        sorted_values[n / 2]
    } else {
        (sorted_values[n / 2 - 1] + sorted_values[n / 2]) / 2.0
    }
}

fn sample_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}

fn group_stats(label: &str, values: Vec<f64>) -> GroupStats {
    let values = sorted(values);
    GroupStats {
        label: label.to_string(),
        n: values.len(),
        mean: mean(&values),
        median: median(&values),
        std_dev: sample_variance(&values).sqrt(),
    }
}

fn cohens_d(first: &GroupStats, second: &GroupStats) -> Option<f64> {
    let (n1, n2) = (first.n as f64, second.n as f64);
    let pooled = (((n1 - 1.0) * first.std_dev.powi(2) + (n2 - 1.0) * second.std_dev.powi(2))
        / (n1 + n2 - 2.0))
        .sqrt();
    (pooled > f64::EPSILON).then(|| (first.mean - second.mean) / pooled)
}

fn metric_values<'a>(
    records: impl Iterator<Item = &'a CohortRecord>,
    metric: &str,
) -> Vec<f64> {
    records.filter_map(|r| r.metric(metric)).collect()
}

fn compare_groups(
    cohort: &str,
    records: &[CohortRecord],
    metric: &str,
    request: &ComparisonRequest,
) -> Result<GroupComparison> {
    let group = |label: &str| -> Result<GroupStats> {
        let values = metric_values(
            records
                .iter()
                .filter(|r| r.groups.get(&request.group_key).map(String::as_str) == Some(label)),
            metric,
        );
        if values.len() < 2 {
            return Err(EngineError::EmptyCohort {
                cohort: format!("{cohort} [{}={label}]", request.group_key),
                metric: metric.to_string(),
                found: values.len(),
            });
        }
        Ok(group_stats(label, values))
    };

    let first = group(request.first.as_str())?;
    let second = group(request.second.as_str())?;

    Ok(GroupComparison {
        group_key: request.group_key.clone(),
        mean_difference: first.mean - second.mean,
        median_difference: first.median - second.median,
        cohens_d: cohens_d(&first, &second),
        first,
        second,
    })
}

/// Percentile distribution of `metric` over the cohort, plus an optional
/// two-group comparison. Needs at least two qualifying tests overall and in
/// each compared group.
pub fn summarize_cohort(
    cohort: &str,
    records: &[CohortRecord],
    metric: &str,
    percentiles: &[f64],
    comparison: Option<&ComparisonRequest>,
) -> Result<CohortSummary> {
    if !COHORT_METRICS.contains(&metric) {
        return Err(EngineError::InvalidInput(format!(
            "unknown cohort metric '{metric}'"
        )));
    }

    let values = metric_values(records.iter(), metric);
    if values.len() < 2 {
        return Err(EngineError::EmptyCohort {
            cohort: cohort.to_string(),
            metric: metric.to_string(),
            found: values.len(),
        });
    }

    let comparison = comparison
        .map(|request| compare_groups(cohort, records, metric, request))
        .transpose()?;

    let sorted_values = sorted(values);
    let summary = CohortSummary {
        cohort: cohort.to_string(),
        metric: metric.to_string(),
        n: sorted_values.len(),
        mean: mean(&sorted_values),
        min: sorted_values[0],
        max: sorted_values[sorted_values.len() - 1],
        percentiles: percentile_table(&sorted_values, percentiles),
        comparison,
    };

    info!(cohort, metric, n = summary.n, "cohort summarized");
    Ok(summary)
}
