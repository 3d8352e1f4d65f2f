use tracing::{debug, warn};

use crate::config::{AtMethod, ThresholdConfig};
use crate::smoothing::centred_moving_average;
use crate::types::{Confidence, DerivedBreathSample, DetectionMethod, MarkerKind, ThresholdMarker};

/// A complete breath of the window, with its position in that window.
struct Point<'a> {
    index: usize,
    sample: &'a DerivedBreathSample,
}

fn complete_points(samples: &[DerivedBreathSample]) -> Vec<Point<'_>> {
    samples
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.incomplete)
        .map(|(index, sample)| Point { index, sample })
        .collect()
}

fn smoothed(points: &[Point<'_>], window_s: f64, value: impl Fn(&DerivedBreathSample) -> Option<f64>) -> Vec<f64> {
    let series: Vec<(f64, f64)> = points
        .iter()
        .map(|p| (p.sample.elapsed_s, value(p.sample).unwrap_or(f64::NAN)))
        .collect();
    centred_moving_average(&series, window_s)
}

fn located(
    kind: MarkerKind,
    method: DetectionMethod,
    point: &Point<'_>,
    value: f64,
) -> ThresholdMarker {
    ThresholdMarker {
        kind,
        method,
        confidence: Confidence::High,
        breath_index: Some(point.index),
        elapsed_s: Some(point.sample.elapsed_s),
        vo2_ml_min: point.sample.vo2_ml_min,
        workload_w: point.sample.workload_w,
        value: Some(value),
        note: None,
    }
}

/// Running sums for O(1) least-squares residuals of any prefix range.
struct PrefixSums {
    x: Vec<f64>,
    y: Vec<f64>,
    xx: Vec<f64>,
    xy: Vec<f64>,
    yy: Vec<f64>,
}

impl PrefixSums {
    fn new(xs: &[f64], ys: &[f64]) -> Self {
        let mut sums = PrefixSums {
            x: vec![0.0],
            y: vec![0.0],
            xx: vec![0.0],
            xy: vec![0.0],
            yy: vec![0.0],
        };
        for (i, (x, y)) in xs.iter().zip(ys).enumerate() {
            sums.x.push(sums.x[i] + x);
            sums.y.push(sums.y[i] + y);
            sums.xx.push(sums.xx[i] + x * x);
            sums.xy.push(sums.xy[i] + x * y);
            sums.yy.push(sums.yy[i] + y * y);
        }
        sums
    }

    /// (slope, residual sum of squares) of the fit over `[from, to)`.
    fn fit(&self, from: usize, to: usize) -> Option<(f64, f64)> {
        let n = (to - from) as f64;
        let sx = self.x[to] - self.x[from];
        let sy = self.y[to] - self.y[from];
        let sxx = self.xx[to] - self.xx[from] - sx * sx / n;
        let sxy = self.xy[to] - self.xy[from] - sx * sy / n;
        let syy = self.yy[to] - self.yy[from] - sy * sy / n;
        if sxx <= f64::EPSILON {
            return None;
        }
        Some((sxy / sxx, (syy - sxy * sxy / sxx).max(0.0)))
    }
}

fn detect_vslope(points: &[Point<'_>], config: &ThresholdConfig) -> ThresholdMarker {
    let method = DetectionMethod::VSlope;
    let kind = MarkerKind::AnaerobicThreshold;
    // A line needs two points, so shorter segments are never fitted.
    let min_segment = config.vslope_min_segment.max(2);

    if points.len() < 2 * min_segment {
        return ThresholdMarker::low_confidence(
            kind,
            method,
            format!(
                "{} complete breaths, need {} for two regression segments",
                points.len(),
                2 * min_segment
            ),
        );
    }

    let vo2 = smoothed(points, config.smoothing_window_s, |s| s.vo2_ml_min);
    let vco2 = smoothed(points, config.smoothing_window_s, |s| s.vco2_ml_min);

    let span = vo2.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        - vo2.iter().cloned().fold(f64::INFINITY, f64::min);
    if !(span >= config.min_vo2_span_ml_min) {
        return ThresholdMarker::low_confidence(
            kind,
            method,
            format!("VO2 spans {span:.0} mL/min, too flat for a breakpoint"),
        );
    }

    let sums = PrefixSums::new(&vo2, &vco2);
    let n = points.len();
    let mut best: Option<(usize, f64, f64, f64)> = None;
    for split in min_segment..=(n - min_segment) {
        let (Some((lower, lower_sse)), Some((upper, upper_sse))) =
            (sums.fit(0, split), sums.fit(split, n))
        else {
            continue;
        };
        let total = lower_sse + upper_sse;
        match best {
            Some((_, best_sse, _, _)) if total >= best_sse => {}
            _ => best = Some((split, total, lower, upper)),
        }
    }

    let Some((split, _, lower, upper)) = best else {
        return ThresholdMarker::low_confidence(kind, method, "no segment split could be fitted");
    };
    let delta = upper - lower;
    if delta < config.vslope_min_slope_delta {
        return ThresholdMarker::low_confidence(
            kind,
            method,
            format!("VCO2/VO2 slope rises by {delta:.3}, below {}", config.vslope_min_slope_delta),
        );
    }

    debug!(split, lower, upper, "v-slope breakpoint");
    located(kind, method, &points[split], delta)
}

fn detect_rer_crossing(points: &[Point<'_>], config: &ThresholdConfig) -> ThresholdMarker {
    let method = DetectionMethod::RerCrossing;
    let kind = MarkerKind::AnaerobicThreshold;
    let sustain = config.rer_sustain_samples.max(1);

    if points.len() < sustain {
        return ThresholdMarker::low_confidence(
            kind,
            method,
            format!("{} complete breaths, need {sustain}", points.len()),
        );
    }

    let rer = smoothed(points, config.smoothing_window_s, |s| s.rer);
    if rer[0] >= config.rer_band {
        return ThresholdMarker::low_confidence(
            kind,
            method,
            format!("RER already at {:.2} at window start", rer[0]),
        );
    }

    let crossing = (0..=points.len() - sustain)
        .find(|&start| rer[start..start + sustain].iter().all(|v| *v >= config.rer_band));
    match crossing {
        Some(idx) => located(kind, method, &points[idx], rer[idx]),
        None => ThresholdMarker::low_confidence(
            kind,
            method,
            format!(
                "RER never stays at or above {} for {sustain} breaths",
                config.rer_band
            ),
        ),
    }
}

fn detect_fatmax(points: &[Point<'_>], config: &ThresholdConfig) -> ThresholdMarker {
    let method = DetectionMethod::FatOxidationPeak;
    let kind = MarkerKind::Fatmax;

    let with_fat: Vec<&Point<'_>> = points.iter().filter(|p| p.sample.fat_ox_g_min.is_some()).collect();
    if with_fat.is_empty() {
        return ThresholdMarker::low_confidence(kind, method, "no fat oxidation values in window");
    }

    let raw: Vec<(f64, f64)> = with_fat
        .iter()
        .filter_map(|p| p.sample.fat_ox_g_min.map(|f| (p.sample.elapsed_s, f)))
        .collect();
    let fat = if config.smooth_fat_oxidation {
        centred_moving_average(&raw, config.smoothing_window_s)
    } else {
        raw.iter().map(|(_, f)| *f).collect()
    };

    let mut best = 0;
    for (idx, value) in fat.iter().enumerate() {
        if *value > fat[best] {
            best = idx;
        }
    }
    if !(fat[best] > 0.0) {
        return ThresholdMarker::low_confidence(kind, method, "fat oxidation never rises above zero");
    }

    located(kind, method, with_fat[best], fat[best])
}

/// Detects the anaerobic threshold with the configured method and the FATMAX
/// point. Incomplete breaths are skipped. Returns `[AT, FATMAX]`.
///
/// Never panics: an empty window or a zero segment length yields
/// low-confidence markers.
pub fn detect_thresholds(samples: &[DerivedBreathSample], config: &ThresholdConfig) -> Vec<ThresholdMarker> {
    let points = complete_points(samples);

    let at = match config.at_method {
        AtMethod::VSlope => detect_vslope(&points, config),
        AtMethod::RerCrossing => detect_rer_crossing(&points, config),
    };
    let fatmax = detect_fatmax(&points, config);

    for marker in [&at, &fatmax] {
        if marker.is_low_confidence() {
            warn!(
                kind = ?marker.kind,
                method = ?marker.method,
                reason = marker.note.as_deref().unwrap_or_default(),
                "low-confidence threshold"
            );
        }
    }

    vec![at, fatmax]
}
