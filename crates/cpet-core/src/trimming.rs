use cpet_parser::PhaseTag;
use tracing::{debug, warn};

use crate::cleaning::{CleanedSample, CleanedSeries};
use crate::config::TrimmingConfig;
use crate::error::{EngineError, Result};
use crate::types::{TrimMethod, TrimWindow};

const STAGE: &str = "trim";

fn insufficient(found: usize, config: &TrimmingConfig) -> EngineError {
    EngineError::InsufficientData {
        stage: STAGE,
        found,
        required: config.min_samples,
    }
}

fn exercise_span(samples: &[CleanedSample]) -> Option<(usize, usize)> {
    let is_exercise = |s: &CleanedSample| s.breath.phase == Some(PhaseTag::Exercise);
    let start = samples.iter().position(is_exercise)?;
    let end = samples.iter().rposition(is_exercise)?;
    Some((start, end))
}

/// First index whose workload clears `threshold` and stays above it for
/// `sustain_s` seconds. Samples without a workload value do not break the run.
fn sustained_start(samples: &[CleanedSample], threshold: f64, sustain_s: f64) -> Option<usize> {
    let above = |s: &CleanedSample| s.breath.workload_w.is_some_and(|w| w > threshold);

    'candidates: for (idx, candidate) in samples.iter().enumerate() {
        if !above(candidate) {
            continue;
        }
        let until = candidate.breath.elapsed_s + sustain_s;
        let mut covered = false;
        for later in &samples[idx + 1..] {
            if later.breath.workload_w.is_some() && !above(later) {
                continue 'candidates;
            }
            if later.breath.elapsed_s >= until {
                covered = true;
                break;
            }
        }
        if covered {
            return Some(idx);
        }
    }
    None
}

/// Walks back from `from` while the workload keeps falling, returning the
/// bottom of the rise that ends there. Breaths without workload are skipped.
fn rise_origin(samples: &[CleanedSample], from: usize, floor: usize) -> usize {
    let mut origin = from;
    let mut level = samples[from].breath.workload_w.unwrap_or(f64::INFINITY);
    for idx in (floor..from).rev() {
        let Some(w) = samples[idx].breath.workload_w else {
            continue;
        };
        if w >= level {
            break;
        }
        origin = idx;
        level = w;
    }
    origin
}

/// The exercise start is where the load climbs off the first sustained level
/// (a warm-up plateau, or the first stage). A session that never climbs
/// further is a constant-load effort and starts at that level.
fn workload_span(samples: &[CleanedSample], config: &TrimmingConfig) -> Option<(usize, usize)> {
    let baseline = samples.iter().find_map(|s| s.breath.workload_w)?;
    let first_level = sustained_start(
        samples,
        baseline + config.workload_step_w,
        config.sustain_s,
    )?;

    let level_until = samples[first_level].breath.elapsed_s + config.sustain_s;
    let level = samples[first_level..]
        .iter()
        .take_while(|s| s.breath.elapsed_s <= level_until)
        .filter_map(|s| s.breath.workload_w)
        .fold(f64::NEG_INFINITY, f64::max);

    let start = match sustained_start(
        &samples[first_level..],
        level + config.workload_step_w,
        config.sustain_s,
    ) {
        Some(offset) => rise_origin(samples, first_level + offset, first_level),
        None => first_level,
    };

    let mut peak_idx = start;
    let mut peak = f64::NEG_INFINITY;
    for (idx, sample) in samples.iter().enumerate().skip(start) {
        if let Some(w) = sample.breath.workload_w {
            if w > peak {
                peak = w;
                peak_idx = idx;
            }
        }
    }

    let floor = peak * config.end_fraction_of_peak;
    let end = samples
        .iter()
        .enumerate()
        .skip(peak_idx + 1)
        .find(|(_, s)| s.breath.workload_w.is_some_and(|w| w < floor))
        .map(|(idx, _)| idx - 1)
        .unwrap_or(samples.len() - 1);

    Some((start, end))
}

/// Locates the exercise window of a cleaned series.
///
/// Phase tags win when present. Without tags the window is inferred from the
/// workload signal, and without either the whole series is used.
pub fn trim_session(series: &CleanedSeries, config: &TrimmingConfig) -> Result<TrimWindow> {
    let samples = series.samples();
    if samples.is_empty() {
        return Err(insufficient(0, config));
    }

    let has_workload = samples.iter().any(|s| s.breath.workload_w.is_some());
    let (start, end, method) = if series.has_phase_tags() {
        let (start, end) = exercise_span(samples).ok_or_else(|| insufficient(0, config))?;
        (start, end, TrimMethod::PhaseTags)
    } else if has_workload {
        let (start, end) =
            workload_span(samples, config).ok_or_else(|| insufficient(0, config))?;
        (start, end, TrimMethod::Workload)
    } else {
        warn!(
            samples = samples.len(),
            "no phase tags or workload signal; analysing the untrimmed series"
        );
        (0, samples.len() - 1, TrimMethod::Untrimmed)
    };

    let complete = samples[start..=end]
        .iter()
        .filter(|s| s.is_complete())
        .count();
    if complete < config.min_samples {
        return Err(insufficient(complete, config));
    }

    debug!(start, end, ?method, complete, "analysis window located");
    Ok(TrimWindow { start, end, method })
}
