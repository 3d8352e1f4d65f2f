use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use cpet_core::aggregation::ComparisonRequest;
use cpet_core::config::EngineConfig;
use cpet_core::pipelines::{all_pipeline_descriptors, CancelFlag};
use cpet_core::storage::{FsResultStore, ResultStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::analyze;
use commands::cohort::{self, parse_comparison, CohortArgs};
use commands::manifest::load_manifests;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cardiopulmonary exercise test analysis", long_about = None)]
struct Cli {
    /// Engine configuration (TOML). Falls back to $CPET_CONFIG, then defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding versioned analysis results.
    #[arg(long, global = true, default_value = "cpet-results")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse every session listed in one or more manifests
    Analyze(AnalyzeArgs),
    /// Summarise one metric across a cohort of stored results
    Cohort(CohortCommandArgs),
    /// List the registered analysis pipelines
    Pipelines,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Manifest file or glob pattern, e.g. "manifests/*.toml"
    #[arg(short, long)]
    manifest: String,

    /// Also write per-breath and summary parquet files here
    #[arg(long)]
    parquet_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CohortCommandArgs {
    #[arg(short, long)]
    cohort: String,

    #[arg(short, long, default_value = "peak_vo2_ml_min")]
    metric: String,

    /// Two-group comparison as key=first,second (e.g. sex=m,f)
    #[arg(long, value_parser = parse_comparison)]
    compare: Option<ComparisonRequest>,

    /// Print the summary as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Write the cohort's per-test metric table to this parquet file
    #[arg(long)]
    parquet: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze(args) => run_analyze(args, &cli.store, config).await,
        Command::Cohort(args) => run_cohort(args, &cli.store, &config),
        Command::Pipelines => {
            let mut table = Table::new();
            table.set_header(vec!["code", "version", "description"]);
            for descriptor in all_pipeline_descriptors() {
                table.add_row(vec![descriptor.code, descriptor.version, descriptor.description]);
            }
            println!("{table}");
            Ok(())
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var_os("CPET_CONFIG").map(PathBuf::from),
    };
    match path {
        Some(path) => {
            let config = EngineConfig::load(&path)
                .with_context(|| format!("Failed to load config from '{}'", path.display()))?;
            info!(path = %path.display(), fingerprint = %config.fingerprint(), "config loaded");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

async fn run_analyze(args: AnalyzeArgs, store_root: &Path, config: EngineConfig) -> Result<()> {
    let sessions = load_manifests(&args.manifest)?;
    let store: Arc<dyn ResultStore> = Arc::new(
        FsResultStore::new(store_root)
            .with_context(|| format!("Failed to open result store '{}'", store_root.display()))?,
    );
    info!(sessions = sessions.len(), store = %store_root.display(), "starting batch analysis");

    let cancel = CancelFlag::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling remaining analyses");
            interrupt.cancel();
        }
    });

    let reports = analyze::run(sessions, store, Arc::new(config), cancel, args.parquet_dir).await;
    println!("{}", analyze::report_table(&reports));

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.is_failure())
        .map(|r| r.test_id.as_str())
        .collect();
    if !failed.is_empty() {
        bail!(
            "{} of {} sessions failed: {}",
            failed.len(),
            reports.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

fn run_cohort(args: CohortCommandArgs, store_root: &Path, config: &EngineConfig) -> Result<()> {
    let store = FsResultStore::new(store_root)
        .with_context(|| format!("Failed to open result store '{}'", store_root.display()))?;
    let summary = cohort::run(
        &store,
        &CohortArgs {
            cohort: &args.cohort,
            metric: &args.metric,
            percentiles: &config.cohort.percentiles,
            compare: args.compare.as_ref(),
            parquet: args.parquet.as_deref(),
        },
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("{}", cohort::summary_table(&summary));
    if let Some(table) = cohort::comparison_table(&summary) {
        println!("{table}");
    }
    Ok(())
}
