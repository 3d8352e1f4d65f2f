use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::Table;
use cpet_core::config::EngineConfig;
use cpet_core::flatten::{breath_frame, summary_frame};
use cpet_core::outputs::{publish_result, write_parquet_bytes, PublishOutcome};
use cpet_core::pipelines::{analyze_session, CancelFlag};
use cpet_core::storage::ResultStore;
use cpet_core::types::{AnalysisResult, MarkerKind};
use tokio::task::JoinSet;
use tracing::{error, info};

use super::manifest::SessionEntry;

/// What happened to one manifest session.
#[derive(Debug)]
pub enum SessionStatus {
    Published {
        outcome: PublishOutcome,
        result: Box<AnalysisResult>,
    },
    Failed(String),
}

#[derive(Debug)]
pub struct SessionReport {
    pub test_id: String,
    pub status: SessionStatus,
}

impl SessionReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, SessionStatus::Failed(_))
    }
}

fn analyze_one(
    entry: &SessionEntry,
    store: &dyn ResultStore,
    config: &EngineConfig,
    cancel: &CancelFlag,
    parquet_dir: Option<&Path>,
) -> Result<(PublishOutcome, AnalysisResult)> {
    let input = entry.to_input()?;
    let result = analyze_session(&input, config, cancel)
        .with_context(|| format!("Analysis of '{}' failed", entry.test_id))?;
    let (outcome, stored) = publish_result(store, result)
        .with_context(|| format!("Could not publish '{}'", entry.test_id))?;

    if let Some(dir) = parquet_dir {
        write_frames(dir, &stored)?;
    }
    Ok((outcome, stored))
}

fn write_frames(dir: &Path, result: &AnalysisResult) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory '{}'", dir.display()))?;
    let stem = format!("{}_v{}", result.test_id, result.version);

    let breaths = write_parquet_bytes(&breath_frame(result)?)?;
    let path = dir.join(format!("{stem}_breaths.parquet"));
    std::fs::write(&path, breaths)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;

    let summary = write_parquet_bytes(&summary_frame(result)?)?;
    let path = dir.join(format!("{stem}_summary.parquet"));
    std::fs::write(&path, summary)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    Ok(())
}

/// Analyses every session on its own blocking worker. One session failing
/// never stops the others; its error is reported in the returned list.
pub async fn run(
    sessions: Vec<SessionEntry>,
    store: Arc<dyn ResultStore>,
    config: Arc<EngineConfig>,
    cancel: CancelFlag,
    parquet_dir: Option<PathBuf>,
) -> Vec<SessionReport> {
    let mut workers = JoinSet::new();
    for entry in sessions {
        let store = Arc::clone(&store);
        let config = Arc::clone(&config);
        let cancel = cancel.clone();
        let parquet_dir = parquet_dir.clone();
        workers.spawn_blocking(move || {
            let outcome = analyze_one(
                &entry,
                store.as_ref(),
                &config,
                &cancel,
                parquet_dir.as_deref(),
            );
            (entry.test_id, outcome)
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = workers.join_next().await {
        let report = match joined {
            Ok((test_id, Ok((outcome, result)))) => {
                info!(test_id = %test_id, version = outcome.version(), ?outcome, "session published");
                SessionReport {
                    test_id,
                    status: SessionStatus::Published {
                        outcome,
                        result: Box::new(result),
                    },
                }
            }
            Ok((test_id, Err(err))) => {
                error!(test_id = %test_id, error = %format!("{err:#}"), "session failed");
                SessionReport {
                    test_id,
                    status: SessionStatus::Failed(format!("{err:#}")),
                }
            }
            Err(err) => {
                error!(error = %err, "analysis worker panicked");
                SessionReport {
                    test_id: "<unknown>".to_string(),
                    status: SessionStatus::Failed(format!("worker panicked: {err}")),
                }
            }
        };
        reports.push(report);
    }
    reports.sort_by(|a, b| a.test_id.cmp(&b.test_id));
    reports
}

fn fmt_opt(value: Option<f64>, digits: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.digits$}"))
}

pub fn report_table(reports: &[SessionReport]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "test_id", "status", "version", "peak VO2", "AT VO2", "FATMAX W", "detail",
    ]);
    for report in reports {
        match &report.status {
            SessionStatus::Published { outcome, result } => {
                let status = match outcome {
                    PublishOutcome::Created { .. } => "created",
                    PublishOutcome::Unchanged { .. } => "unchanged",
                };
                let at = result.marker(MarkerKind::AnaerobicThreshold);
                let fatmax = result.marker(MarkerKind::Fatmax);
                let notes: Vec<&str> = result
                    .markers
                    .iter()
                    .filter_map(|m| m.note.as_deref())
                    .collect();
                table.add_row(vec![
                    report.test_id.clone(),
                    status.to_string(),
                    outcome.version().to_string(),
                    fmt_opt(result.summary.peak_vo2_ml_min, 0),
                    fmt_opt(at.and_then(|m| m.vo2_ml_min), 0),
                    fmt_opt(fatmax.and_then(|m| m.workload_w), 0),
                    notes.join("; "),
                ]);
            }
            SessionStatus::Failed(reason) => {
                table.add_row(vec![
                    report.test_id.clone(),
                    "failed".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    reason.clone(),
                ]);
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use cpet_core::storage::MemoryResultStore;
    use cpet_parser::ProtocolType;

    use super::*;

    fn ramp_csv(breaths: usize) -> String {
        let mut csv = String::from(
            "CPET,Synthetic Cart,SN-0001,2.3,ramp\nt,Phase,VO2,VCO2,VE,HR,Load\ns,,mL/min,mL/min,L/min,bpm,W\n",
        );
        for i in 0..breaths {
            let load = 50.0 + 5.0 * i as f64;
            let vo2 = 500.0 + 10.0 * load;
            let vco2 = 0.9 * vo2;
            csv.push_str(&format!(
                "{},Exercise,{vo2},{vco2},{},{},{load}\n",
                5 * i,
                0.03 * vco2,
                70.0 + 0.45 * load
            ));
        }
        csv
    }

    fn entry(test_id: &str, path: PathBuf) -> SessionEntry {
        SessionEntry {
            test_id: test_id.to_string(),
            path,
            protocol: ProtocolType::Ramp,
            body_mass_kg: 70.0,
            height_cm: Some(175.0),
            cohort: Some("pilot".to_string()),
            groups: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn one_failing_session_does_not_stop_the_batch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("good.csv"), ramp_csv(60))?;
        std::fs::write(dir.path().join("short.csv"), ramp_csv(8))?;

        let sessions = vec![
            entry("A-good", dir.path().join("good.csv")),
            entry("B-short", dir.path().join("short.csv")),
            entry("C-missing", dir.path().join("missing.csv")),
        ];
        let store: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new());
        let parquet = dir.path().join("frames");

        let reports = run(
            sessions,
            Arc::clone(&store),
            Arc::new(EngineConfig::default()),
            CancelFlag::new(),
            Some(parquet.clone()),
        )
        .await;

        let ids: Vec<&str> = reports.iter().map(|r| r.test_id.as_str()).collect();
        assert_eq!(ids, vec!["A-good", "B-short", "C-missing"]);
        assert!(!reports[0].is_failure());
        assert!(reports[1].is_failure());
        assert!(reports[2].is_failure());

        assert_eq!(store.latest_result("A-good")?.map(|r| r.version), Some(1));
        assert!(store.latest_result("B-short")?.is_none());
        assert!(parquet.join("A-good_v1_breaths.parquet").is_file());
        assert!(parquet.join("A-good_v1_summary.parquet").is_file());

        let rendered = report_table(&reports).to_string();
        assert!(rendered.contains("created"));
        assert!(rendered.contains("failed"));
        Ok(())
    }

    #[tokio::test]
    async fn rerunning_a_batch_reports_unchanged() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("good.csv"), ramp_csv(40))?;
        let store: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new());
        let config = Arc::new(EngineConfig::default());

        for expected in ["created", "unchanged"] {
            let reports = run(
                vec![entry("A-good", dir.path().join("good.csv"))],
                Arc::clone(&store),
                Arc::clone(&config),
                CancelFlag::new(),
                None,
            )
            .await;
            match &reports[0].status {
                SessionStatus::Published { outcome, .. } => {
                    assert_eq!(outcome.version(), 1);
                    let label = match outcome {
                        PublishOutcome::Created { .. } => "created",
                        PublishOutcome::Unchanged { .. } => "unchanged",
                    };
                    assert_eq!(label, expected);
                }
                SessionStatus::Failed(reason) => panic!("unexpected failure: {reason}"),
            }
        }
        Ok(())
    }
}
