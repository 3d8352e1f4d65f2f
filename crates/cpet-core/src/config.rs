use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Engine policy knobs. Every value here can change clinical output, so the
/// whole config is folded into each result's content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub ingest: IngestConfig,
    pub trimming: TrimmingConfig,
    pub metrics: MetricsConfig,
    pub thresholds: ThresholdConfig,
    pub cohort: CohortConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_samples: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_samples: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimmingConfig {
    /// Minimum complete samples in the analysis window.
    pub min_samples: usize,
    pub workload_step_w: f64,
    pub sustain_s: f64,
    pub end_fraction_of_peak: f64,
}

impl Default for TrimmingConfig {
    fn default() -> Self {
        Self {
            min_samples: 20,
            workload_step_w: 5.0,
            sustain_s: 20.0,
            end_fraction_of_peak: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub peak_window_s: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            peak_window_s: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtMethod {
    VSlope,
    RerCrossing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub at_method: AtMethod,
    pub smoothing_window_s: f64,
    pub rer_band: f64,
    pub rer_sustain_samples: usize,
    pub vslope_min_segment: usize,
    pub vslope_min_slope_delta: f64,
    pub min_vo2_span_ml_min: f64,
    pub smooth_fat_oxidation: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            at_method: AtMethod::VSlope,
            smoothing_window_s: 15.0,
            rer_band: 1.0,
            rer_sustain_samples: 5,
            vslope_min_segment: 10,
            vslope_min_slope_delta: 0.1,
            min_vo2_span_ml_min: 200.0,
            smooth_fat_oxidation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    pub percentiles: Vec<f64>,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            percentiles: vec![10.0, 25.0, 50.0, 75.0, 90.0],
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|err| EngineError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|err| match err {
            EngineError::Config(message) => {
                EngineError::Config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(EngineError::Config(format!("{name} must be positive, got {value}")))
            }
        }

        if self.ingest.max_samples == 0 {
            return Err(EngineError::Config("ingest.max_samples must be > 0".into()));
        }
        if self.trimming.min_samples < 2 {
            return Err(EngineError::Config("trimming.min_samples must be >= 2".into()));
        }
        positive("trimming.workload_step_w", self.trimming.workload_step_w)?;
        positive("trimming.sustain_s", self.trimming.sustain_s)?;
        let fraction = self.trimming.end_fraction_of_peak;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(EngineError::Config(format!(
                "trimming.end_fraction_of_peak must be in (0, 1), got {fraction}"
            )));
        }
        positive("metrics.peak_window_s", self.metrics.peak_window_s)?;
        positive("thresholds.smoothing_window_s", self.thresholds.smoothing_window_s)?;
        positive("thresholds.rer_band", self.thresholds.rer_band)?;
        if self.thresholds.rer_sustain_samples == 0 {
            return Err(EngineError::Config(
                "thresholds.rer_sustain_samples must be > 0".into(),
            ));
        }
        if self.thresholds.vslope_min_segment < 3 {
            return Err(EngineError::Config(
                "thresholds.vslope_min_segment must be >= 3".into(),
            ));
        }
        if self.cohort.percentiles.is_empty()
            || self
                .cohort
                .percentiles
                .iter()
                .any(|p| !(*p > 0.0 && *p <= 100.0))
        {
            return Err(EngineError::Config(
                "cohort.percentiles must be non-empty and within (0, 100]".into(),
            ));
        }
        Ok(())
    }

    /// Stable digest of the policy values.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}
