use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::Table;
use cpet_core::aggregation::{summarize_cohort, CohortRecord, CohortSummary, ComparisonRequest};
use cpet_core::flatten::cohort_frame;
use cpet_core::outputs::write_parquet_bytes;
use cpet_core::storage::ResultStore;
use tracing::info;

/// Parses `key=first,second`, e.g. `sex=m,f`.
pub fn parse_comparison(raw: &str) -> std::result::Result<ComparisonRequest, String> {
    let (key, labels) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=first,second, got '{raw}'"))?;
    let (first, second) = labels
        .split_once(',')
        .ok_or_else(|| format!("expected two comma-separated labels, got '{labels}'"))?;

    let (key, first, second) = (key.trim(), first.trim(), second.trim());
    if key.is_empty() || first.is_empty() || second.is_empty() {
        return Err(format!("empty group key or label in '{raw}'"));
    }
    if first == second {
        return Err(format!("cannot compare group '{first}' with itself"));
    }
    Ok(ComparisonRequest {
        group_key: key.to_string(),
        first: first.to_string(),
        second: second.to_string(),
    })
}

pub struct CohortArgs<'a> {
    pub cohort: &'a str,
    pub metric: &'a str,
    pub percentiles: &'a [f64],
    pub compare: Option<&'a ComparisonRequest>,
    pub parquet: Option<&'a Path>,
}

/// Summarises the latest stored version of every test in the cohort.
pub fn run(store: &dyn ResultStore, args: &CohortArgs<'_>) -> Result<CohortSummary> {
    let results = store
        .read_cohort(args.cohort)
        .with_context(|| format!("Failed to read cohort '{}'", args.cohort))?;
    let records: Vec<CohortRecord> = results.iter().map(CohortRecord::from_result).collect();
    info!(cohort = args.cohort, tests = records.len(), "cohort loaded");

    let summary = summarize_cohort(
        args.cohort,
        &records,
        args.metric,
        args.percentiles,
        args.compare,
    )?;

    // Only a cohort that could be summarised gets a parquet file.
    if let Some(path) = args.parquet {
        let bytes = write_parquet_bytes(&cohort_frame(&records)?)?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
    }
    Ok(summary)
}

pub fn summary_table(summary: &CohortSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["statistic", summary.metric.as_str()]);
    table.add_row(vec!["n".to_string(), summary.n.to_string()]);
    table.add_row(vec!["mean".to_string(), format!("{:.2}", summary.mean)]);
    table.add_row(vec!["min".to_string(), format!("{:.2}", summary.min)]);
    table.add_row(vec!["max".to_string(), format!("{:.2}", summary.max)]);
    for entry in &summary.percentiles {
        table.add_row(vec![
            format!("p{}", entry.percentile),
            format!("{:.2}", entry.value),
        ]);
    }
    table
}

pub fn comparison_table(summary: &CohortSummary) -> Option<Table> {
    let comparison = summary.comparison.as_ref()?;
    let mut table = Table::new();
    table.set_header(vec![
        comparison.group_key.as_str(),
        "n",
        "mean",
        "median",
        "sd",
    ]);
    for group in [&comparison.first, &comparison.second] {
        table.add_row(vec![
            group.label.clone(),
            group.n.to_string(),
            format!("{:.2}", group.mean),
            format!("{:.2}", group.median),
            format!("{:.2}", group.std_dev),
        ]);
    }
    table.add_row(vec![
        "difference".to_string(),
        String::new(),
        format!("{:.2}", comparison.mean_difference),
        format!("{:.2}", comparison.median_difference),
        comparison
            .cohens_d
            .map_or_else(|| "d = -".to_string(), |d| format!("d = {d:.2}")),
    ]);
    Some(table)
}
