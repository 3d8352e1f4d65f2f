use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpet_parser::ProtocolType;
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::calculator::{derive_window, summarize};
use crate::cleaning::clean_series;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ingestion::{ingest_export, ExportInput};
use crate::thresholds::detect_thresholds;
use crate::trimming::trim_session;
use crate::types::{
    AnalysisResult, DerivedBreathSample, ImputationReport, SessionSummary, SubjectInfo,
    ThresholdMarker, TrimWindow,
};

/// Everything needed to analyse one test, supplied in memory by the caller.
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub test_id: String,
    pub cohort: Option<String>,
    pub groups: BTreeMap<String, String>,
    pub protocol: ProtocolType,
    pub subject: SubjectInfo,
    pub export: Vec<u8>,
}

/// Cooperative abort signal checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled { stage });
        }
        Ok(())
    }
}

pub trait AnalysisPipeline: Send + Sync {
    fn code_identifier(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn run(
        &self,
        input: &SessionInput,
        config: &EngineConfig,
        cancel: &CancelFlag,
    ) -> Result<AnalysisResult>;
}

#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub code: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

static PIPELINES: Lazy<Vec<PipelineDescriptor>> = Lazy::new(|| {
    vec![PipelineDescriptor {
        code: StandardPipeline::CODE,
        version: StandardPipeline::VERSION,
        description: "Ingest + clean/impute + trim + breath metrics + AT/FATMAX detection",
    }]
});

pub fn all_pipeline_descriptors() -> &'static [PipelineDescriptor] {
    PIPELINES.as_slice()
}

static PIPELINE_IMPLEMENTATIONS: Lazy<Vec<&'static dyn AnalysisPipeline>> =
    Lazy::new(|| vec![&StandardPipeline as &dyn AnalysisPipeline]);

pub fn all_pipelines() -> &'static [&'static dyn AnalysisPipeline] {
    PIPELINE_IMPLEMENTATIONS.as_slice()
}

pub fn pipeline_by_code(code: &str) -> Option<&'static dyn AnalysisPipeline> {
    all_pipelines()
        .iter()
        .copied()
        .find(|pipeline| pipeline.code_identifier() == code)
}

/// Analytical content of a result; the version is deliberately absent so
/// identical input and config always digest to the same hash.
#[derive(Serialize)]
struct ResultContent<'a> {
    test_id: &'a str,
    cohort: Option<&'a str>,
    groups: &'a BTreeMap<String, String>,
    pipeline: &'a str,
    pipeline_version: &'a str,
    input_hash: &'a str,
    config_fingerprint: &'a str,
    protocol: ProtocolType,
    subject: &'a SubjectInfo,
    window: &'a TrimWindow,
    imputation: &'a ImputationReport,
    samples: &'a [DerivedBreathSample],
    summary: &'a SessionSummary,
    markers: &'a [ThresholdMarker],
}

pub fn content_hash(result: &AnalysisResult) -> Result<String> {
    let content = ResultContent {
        test_id: &result.test_id,
        cohort: result.cohort.as_deref(),
        groups: &result.groups,
        pipeline: &result.pipeline,
        pipeline_version: &result.pipeline_version,
        input_hash: &result.input_hash,
        config_fingerprint: &result.config_fingerprint,
        protocol: result.protocol,
        subject: &result.subject,
        window: &result.window,
        imputation: &result.imputation,
        samples: &result.samples,
        summary: &result.summary,
        markers: &result.markers,
    };
    let bytes = serde_json::to_vec(&content)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

struct StandardPipeline;

impl StandardPipeline {
    const CODE: &'static str = "cpet_standard_v1";
    const VERSION: &'static str = "0.1.0";
}

impl AnalysisPipeline for StandardPipeline {
    fn code_identifier(&self) -> &'static str {
        Self::CODE
    }

    fn version(&self) -> &'static str {
        Self::VERSION
    }

    fn run(
        &self,
        input: &SessionInput,
        config: &EngineConfig,
        cancel: &CancelFlag,
    ) -> Result<AnalysisResult> {
        let _span = info_span!("analyze_session", test_id = %input.test_id).entered();
        config.validate()?;

        cancel.check("ingest")?;
        let ingested = ingest_export(
            &ExportInput {
                test_id: &input.test_id,
                contents: &input.export,
                protocol: input.protocol,
            },
            &config.ingest,
        )?;

        cancel.check("clean")?;
        let cleaned = clean_series(&ingested.export.breaths);

        cancel.check("trim")?;
        let window = trim_session(&cleaned, &config.trimming)?;

        cancel.check("metrics")?;
        let samples = derive_window(&cleaned, &window, &input.subject);
        let summary = summarize(&samples, &input.subject, &config.metrics);
        debug!(
            peak_vo2_ml_min = ?summary.peak_vo2_ml_min,
            peak_workload_w = ?summary.peak_workload_w,
            "metrics computed"
        );

        cancel.check("thresholds")?;
        let markers = detect_thresholds(&samples, &config.thresholds);

        cancel.check("finalize")?;
        let mut result = AnalysisResult {
            test_id: input.test_id.clone(),
            version: 0,
            cohort: input.cohort.clone(),
            groups: input.groups.clone(),
            pipeline: Self::CODE.to_string(),
            pipeline_version: Self::VERSION.to_string(),
            input_hash: ingested.hash,
            content_hash: String::new(),
            config_fingerprint: config.fingerprint(),
            protocol: input.protocol,
            subject: input.subject,
            window,
            imputation: *cleaned.report(),
            samples,
            summary,
            markers,
        };
        result.content_hash = content_hash(&result)?;

        info!(
            window_start = window.start,
            window_end = window.end,
            method = window.method.as_str(),
            samples = result.samples.len(),
            "session analysed"
        );
        Ok(result)
    }
}

/// Runs the standard pipeline over one session. The returned result is not
/// yet versioned; see [`crate::outputs::publish_result`].
pub fn analyze_session(
    input: &SessionInput,
    config: &EngineConfig,
    cancel: &CancelFlag,
) -> Result<AnalysisResult> {
    StandardPipeline.run(input, config, cancel)
}
