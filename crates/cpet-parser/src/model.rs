use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Test protocol; selects the export layout the parser expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    Ramp,
    Step,
    #[serde(alias = "interval")]
    Mixed,
}

impl ProtocolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolType::Ramp => "ramp",
            ProtocolType::Step => "step",
            ProtocolType::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProtocolType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ramp" => Ok(ProtocolType::Ramp),
            "step" | "incremental" => Ok(ProtocolType::Step),
            "mixed" | "interval" | "intervals" => Ok(ProtocolType::Mixed),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

impl FromStr for ProtocolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProtocolType::try_from(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTag {
    Rest,
    WarmUp,
    Exercise,
    Recovery,
}

impl PhaseTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseTag::Rest => "rest",
            PhaseTag::WarmUp => "warm_up",
            PhaseTag::Exercise => "exercise",
            PhaseTag::Recovery => "recovery",
        }
    }
}

impl fmt::Display for PhaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PhaseTag {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_ascii_lowercase();
        let word = lower
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|part| !part.is_empty())
            .unwrap_or("");
        match word {
            "rest" | "baseline" | "pre" => Ok(PhaseTag::Rest),
            "warm" | "warmup" => Ok(PhaseTag::WarmUp),
            "exercise" | "interval" | "stage" | "step" | "ramp" | "work" | "load" | "test" => {
                Ok(PhaseTag::Exercise)
            }
            "recovery" | "cool" | "cooldown" | "post" => Ok(PhaseTag::Recovery),
            _ => Err(format!("unknown phase '{}'", value.trim())),
        }
    }
}

/// One measurement instant as delivered by the instrument, in canonical units.
///
/// Non-finite numbers from the export (`NaN`, `Infinity`) are kept as-is here;
/// turning them into absent values is the cleaner's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathSample {
    pub elapsed_s: f64,
    pub vo2_ml_min: Option<f64>,
    pub vco2_ml_min: Option<f64>,
    pub ve_l_min: Option<f64>,
    pub hr_bpm: Option<f64>,
    pub workload_w: Option<f64>,
    pub phase: Option<PhaseTag>,
    pub reported_rer: Option<f64>,
    pub reported_fat_g_min: Option<f64>,
    pub reported_cho_g_min: Option<f64>,
}

impl BreathSample {
    pub fn new(elapsed_s: f64) -> Self {
        Self {
            elapsed_s,
            vo2_ml_min: None,
            vco2_ml_min: None,
            ve_l_min: None,
            hr_bpm: None,
            workload_w: None,
            phase: None,
            reported_rer: None,
            reported_fat_g_min: None,
            reported_cho_g_min: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub file_format: String,
    pub instrument: Option<String>,
    pub serial_number: Option<String>,
    pub software_version: Option<String>,
    pub declared_protocol: Option<ProtocolType>,
    pub sections: Vec<String>,
    pub ignored_columns: Vec<String>,
}

impl ExportMetadata {
    pub fn new(
        file_format: impl Into<String>,
        instrument: Option<String>,
        serial_number: Option<String>,
        software_version: Option<String>,
        declared_protocol: Option<ProtocolType>,
    ) -> Self {
        Self {
            file_format: file_format.into(),
            instrument,
            serial_number,
            software_version,
            declared_protocol,
            sections: Vec::new(),
            ignored_columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedExport {
    pub parser: &'static str,
    pub protocol: ProtocolType,
    pub metadata: ExportMetadata,
    pub breaths: Vec<BreathSample>,
}

impl ParsedExport {
    pub fn len(&self) -> usize {
        self.breaths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaths.is_empty()
    }

    pub fn has_phase_tags(&self) -> bool {
        self.breaths.iter().any(|breath| breath.phase.is_some())
    }
}

/// Bounds applied while reading an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_breaths: usize,
}

impl ParseLimits {
    pub fn with_max_breaths(max_breaths: usize) -> Self {
        Self { max_breaths }
    }
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_breaths: usize::MAX,
        }
    }
}
