use std::collections::BTreeMap;

use cpet_parser::{PhaseTag, ProtocolType};
use serde::{Deserialize, Serialize};

use crate::config::AtMethod;
use crate::error::{EngineError, Result};

/// Anthropometrics valid on the test day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub body_mass_kg: f64,
    pub height_cm: Option<f64>,
}

impl SubjectInfo {
    pub fn new(body_mass_kg: f64, height_cm: Option<f64>) -> Result<Self> {
        if !(body_mass_kg.is_finite() && body_mass_kg > 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "body mass must be a positive number of kg, got {body_mass_kg}"
            )));
        }
        if let Some(height) = height_cm {
            if !(height.is_finite() && height > 0.0) {
                return Err(EngineError::InvalidInput(format!(
                    "height must be a positive number of cm, got {height}"
                )));
            }
        }
        Ok(Self {
            body_mass_kg,
            height_cm,
        })
    }

    pub fn bmi(&self) -> Option<f64> {
        self.height_cm.map(|h| {
            let metres = h / 100.0;
            self.body_mass_kg / (metres * metres)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImputationReport {
    pub sentinels_removed: usize,
    pub incomplete_samples: usize,
    pub fat_imputed: usize,
    pub cho_imputed: usize,
    pub negative_oxidation_clamped: usize,
}

/// One breath of the analysis window with every derived quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedBreathSample {
    /// Position in the raw export.
    pub raw_index: usize,
    pub elapsed_s: f64,
    pub phase: Option<PhaseTag>,
    pub vo2_ml_min: Option<f64>,
    pub vco2_ml_min: Option<f64>,
    pub ve_l_min: Option<f64>,
    pub hr_bpm: Option<f64>,
    pub workload_w: Option<f64>,
    pub rer: Option<f64>,
    pub fat_ox_g_min: Option<f64>,
    pub cho_ox_g_min: Option<f64>,
    pub oxidation_imputed: bool,
    pub vo2_ml_kg_min: Option<f64>,
    pub ve_vo2: Option<f64>,
    pub ve_vco2: Option<f64>,
    pub o2_pulse_ml_beat: Option<f64>,
    pub vo2_ml_min_per_w: Option<f64>,
    pub incomplete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimMethod {
    PhaseTags,
    Workload,
    Untrimmed,
}

impl TrimMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrimMethod::PhaseTags => "phase_tags",
            TrimMethod::Workload => "workload",
            TrimMethod::Untrimmed => "untrimmed",
        }
    }
}

/// Inclusive index range into the raw series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start: usize,
    pub end: usize,
    pub method: TrimMethod,
}

impl TrimWindow {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub sample_count: usize,
    pub complete_sample_count: usize,
    pub duration_s: f64,
    pub peak_vo2_ml_min: Option<f64>,
    pub peak_vo2_ml_kg_min: Option<f64>,
    pub peak_workload_w: Option<f64>,
    pub peak_hr_bpm: Option<f64>,
    pub peak_rer: Option<f64>,
    pub ve_vco2_slope: Option<f64>,
    pub mean_fat_ox_g_min: Option<f64>,
    pub mean_cho_ox_g_min: Option<f64>,
    pub bmi: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    AnaerobicThreshold,
    Fatmax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    VSlope,
    RerCrossing,
    FatOxidationPeak,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::VSlope => "v_slope",
            DetectionMethod::RerCrossing => "rer_crossing",
            DetectionMethod::FatOxidationPeak => "fat_oxidation_peak",
        }
    }
}

impl From<AtMethod> for DetectionMethod {
    fn from(method: AtMethod) -> Self {
        match method {
            AtMethod::VSlope => DetectionMethod::VSlope,
            AtMethod::RerCrossing => DetectionMethod::RerCrossing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdMarker {
    pub kind: MarkerKind,
    pub method: DetectionMethod,
    pub confidence: Confidence,
    /// Index into the result's trimmed samples; `None` when the detector did not converge.
    pub breath_index: Option<usize>,
    pub elapsed_s: Option<f64>,
    pub vo2_ml_min: Option<f64>,
    pub workload_w: Option<f64>,
    pub value: Option<f64>,
    pub note: Option<String>,
}

impl ThresholdMarker {
    pub fn low_confidence(kind: MarkerKind, method: DetectionMethod, note: impl Into<String>) -> Self {
        Self {
            kind,
            method,
            confidence: Confidence::Low,
            breath_index: None,
            elapsed_s: None,
            vo2_ml_min: None,
            workload_w: None,
            value: None,
            note: Some(note.into()),
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }
}

/// Versioned, immutable analysis output for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub test_id: String,
    pub version: u32,
    pub cohort: Option<String>,
    pub groups: BTreeMap<String, String>,
    pub pipeline: String,
    pub pipeline_version: String,
    pub input_hash: String,
    pub content_hash: String,
    pub config_fingerprint: String,
    pub protocol: ProtocolType,
    pub subject: SubjectInfo,
    pub window: TrimWindow,
    pub imputation: ImputationReport,
    pub samples: Vec<DerivedBreathSample>,
    pub summary: SessionSummary,
    pub markers: Vec<ThresholdMarker>,
}

impl AnalysisResult {
    pub fn marker(&self, kind: MarkerKind) -> Option<&ThresholdMarker> {
        self.markers.iter().find(|marker| marker.kind == kind)
    }
}
