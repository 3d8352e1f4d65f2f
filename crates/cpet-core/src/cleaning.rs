use cpet_parser::BreathSample;
use tracing::debug;

use crate::types::ImputationReport;

const ML_PER_L: f64 = 1000.0;

/// Fat oxidation (g/min) from gas exchange in mL/min (Frayn).
pub fn fat_oxidation_g_min(vo2_ml_min: f64, vco2_ml_min: f64) -> f64 {
    let vo2 = vo2_ml_min / ML_PER_L;
    let vco2 = vco2_ml_min / ML_PER_L;
    (1.67 * vo2 - 1.67 * vco2).max(0.0)
}

/// Carbohydrate oxidation (g/min) from gas exchange in mL/min (Frayn).
pub fn cho_oxidation_g_min(vo2_ml_min: f64, vco2_ml_min: f64) -> f64 {
    let vo2 = vo2_ml_min / ML_PER_L;
    let vco2 = vco2_ml_min / ML_PER_L;
    (4.55 * vco2 - 3.21 * vo2).max(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedSample {
    pub raw_index: usize,
    /// Measured values with sentinels and impossible gas readings removed.
    pub breath: BreathSample,
    pub fat_ox_g_min: Option<f64>,
    pub cho_ox_g_min: Option<f64>,
    pub oxidation_imputed: bool,
    pub incomplete: bool,
}

impl CleanedSample {
    pub fn is_complete(&self) -> bool {
        !self.incomplete
    }
}

/// Output of the cleaner. Only [`clean_series`] builds one, so anything that
/// takes a `CleanedSeries` runs after imputation.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedSeries {
    samples: Vec<CleanedSample>,
    report: ImputationReport,
}

impl CleanedSeries {
    pub fn samples(&self) -> &[CleanedSample] {
        &self.samples
    }

    pub fn report(&self) -> &ImputationReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn has_phase_tags(&self) -> bool {
        self.samples.iter().any(|s| s.breath.phase.is_some())
    }

    pub fn complete_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_complete()).count()
    }
}

fn finite(value: Option<f64>, removed: &mut usize) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() => Some(v),
        Some(_) => {
            *removed += 1;
            None
        }
        None => None,
    }
}

fn clamp_existing(value: Option<f64>, clamped: &mut usize) -> Option<f64> {
    match value {
        Some(v) if v < 0.0 => {
            *clamped += 1;
            Some(0.0)
        }
        other => other,
    }
}

fn clean_breath(raw_index: usize, breath: &BreathSample, report: &mut ImputationReport) -> CleanedSample {
    let removed = &mut report.sentinels_removed;

    let positive_gas = |value: Option<f64>, removed: &mut usize| {
        finite(value, removed).filter(|v| *v > 0.0)
    };
    let mut vo2 = positive_gas(breath.vo2_ml_min, removed);
    let mut vco2 = positive_gas(breath.vco2_ml_min, removed);
    if vo2.is_none() || vco2.is_none() {
        vo2 = None;
        vco2 = None;
    }

    let cleaned = BreathSample {
        elapsed_s: breath.elapsed_s,
        vo2_ml_min: vo2,
        vco2_ml_min: vco2,
        ve_l_min: finite(breath.ve_l_min, removed),
        hr_bpm: finite(breath.hr_bpm, removed),
        workload_w: finite(breath.workload_w, removed),
        phase: breath.phase,
        reported_rer: finite(breath.reported_rer, removed),
        reported_fat_g_min: finite(breath.reported_fat_g_min, removed),
        reported_cho_g_min: finite(breath.reported_cho_g_min, removed),
    };

    let clamped = &mut report.negative_oxidation_clamped;
    let fat_ox_g_min = clamp_existing(cleaned.reported_fat_g_min, clamped);
    let cho_ox_g_min = clamp_existing(cleaned.reported_cho_g_min, clamped);

    let incomplete = vo2.is_none();
    if incomplete {
        report.incomplete_samples += 1;
    }

    CleanedSample {
        raw_index,
        breath: cleaned,
        fat_ox_g_min,
        cho_ox_g_min,
        oxidation_imputed: false,
        incomplete,
    }
}

/// Fills absent fat/CHO rates from VO2/VCO2. Existing values are never
/// overwritten, so a second pass changes nothing. Returns (fat, cho) counts.
pub fn impute_missing_oxidation(samples: &mut [CleanedSample]) -> (usize, usize) {
    let mut fat_count = 0;
    let mut cho_count = 0;

    for sample in samples.iter_mut() {
        let (Some(vo2), Some(vco2)) = (sample.breath.vo2_ml_min, sample.breath.vco2_ml_min) else {
            continue;
        };
        if sample.fat_ox_g_min.is_none() {
            sample.fat_ox_g_min = Some(fat_oxidation_g_min(vo2, vco2));
            sample.oxidation_imputed = true;
            fat_count += 1;
        }
        if sample.cho_ox_g_min.is_none() {
            sample.cho_ox_g_min = Some(cho_oxidation_g_min(vo2, vco2));
            sample.oxidation_imputed = true;
            cho_count += 1;
        }
    }

    (fat_count, cho_count)
}

/// Repairs sentinels, enforces paired gas readings and imputes oxidation.
/// Never fails: absent inputs produce absent outputs.
pub fn clean_series(breaths: &[BreathSample]) -> CleanedSeries {
    let mut report = ImputationReport::default();
    let mut samples: Vec<CleanedSample> = breaths
        .iter()
        .enumerate()
        .map(|(idx, breath)| clean_breath(idx, breath, &mut report))
        .collect();

    let (fat_imputed, cho_imputed) = impute_missing_oxidation(&mut samples);
    report.fat_imputed = fat_imputed;
    report.cho_imputed = cho_imputed;

    debug!(
        samples = samples.len(),
        sentinels_removed = report.sentinels_removed,
        incomplete = report.incomplete_samples,
        fat_imputed,
        cho_imputed,
        "series cleaned"
    );

    CleanedSeries { samples, report }
}
