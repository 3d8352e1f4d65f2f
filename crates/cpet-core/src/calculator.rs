use crate::cleaning::{CleanedSample, CleanedSeries};
use crate::config::MetricsConfig;
use crate::types::{DerivedBreathSample, SessionSummary, SubjectInfo, TrimWindow};

const ML_PER_L: f64 = 1000.0;

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => Some(n / d),
        _ => None,
    }
}

/// Per-breath quantities. Each breath is computed on its own.
pub fn derive_breath(sample: &CleanedSample, subject: &SubjectInfo) -> DerivedBreathSample {
    let breath = &sample.breath;
    let vo2 = breath.vo2_ml_min;
    let vco2 = breath.vco2_ml_min;

    let rer = ratio(vco2, vo2).or(breath.reported_rer);
    let vo2_ml_kg_min = vo2.map(|v| v / subject.body_mass_kg);
    let ve_vo2 = ratio(breath.ve_l_min, vo2.map(|v| v / ML_PER_L));
    let ve_vco2 = ratio(breath.ve_l_min, vco2.map(|v| v / ML_PER_L));
    let o2_pulse_ml_beat = ratio(vo2, breath.hr_bpm);
    let vo2_ml_min_per_w = ratio(vo2, breath.workload_w);

    DerivedBreathSample {
        raw_index: sample.raw_index,
        elapsed_s: breath.elapsed_s,
        phase: breath.phase,
        vo2_ml_min: vo2,
        vco2_ml_min: vco2,
        ve_l_min: breath.ve_l_min,
        hr_bpm: breath.hr_bpm,
        workload_w: breath.workload_w,
        rer,
        fat_ox_g_min: sample.fat_ox_g_min,
        cho_ox_g_min: sample.cho_ox_g_min,
        oxidation_imputed: sample.oxidation_imputed,
        vo2_ml_kg_min,
        ve_vo2,
        ve_vco2,
        o2_pulse_ml_beat,
        vo2_ml_min_per_w,
        incomplete: sample.incomplete,
    }
}

pub fn derive_window(
    series: &CleanedSeries,
    window: &TrimWindow,
    subject: &SubjectInfo,
) -> Vec<DerivedBreathSample> {
    series.samples()[window.start..=window.end]
        .iter()
        .map(|sample| derive_breath(sample, subject))
        .collect()
}

/// Highest mean over a trailing window of `window_s` seconds.
///
/// Points must be time-ordered. Only windows fully covered by data count: a
/// window ending at `t` qualifies once `t - window_s` reaches the first point.
pub fn rolling_peak(points: &[(f64, f64)], window_s: f64) -> Option<f64> {
    let first_t = points.first()?.0;
    let mut best: Option<f64> = None;
    let mut left = 0;
    let mut sum = 0.0;

    for (right, &(t, value)) in points.iter().enumerate() {
        sum += value;
        while points[left].0 <= t - window_s && left < right {
            sum -= points[left].1;
            left += 1;
        }
        if t - first_t < window_s {
            continue;
        }
        let mean = sum / (right + 1 - left) as f64;
        best = Some(best.map_or(mean, |b: f64| b.max(mean)));
    }
    best
}

/// Ordinary least squares; `None` when x has no spread.
pub fn least_squares(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

fn max_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

pub fn summarize(
    samples: &[DerivedBreathSample],
    subject: &SubjectInfo,
    config: &MetricsConfig,
) -> SessionSummary {
    let complete: Vec<&DerivedBreathSample> = samples.iter().filter(|s| !s.incomplete).collect();

    let duration_s = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => last.elapsed_s - first.elapsed_s,
        _ => 0.0,
    };

    let vo2_points: Vec<(f64, f64)> = complete
        .iter()
        .filter_map(|s| s.vo2_ml_min.map(|v| (s.elapsed_s, v)))
        .collect();
    let peak_vo2_ml_min = rolling_peak(&vo2_points, config.peak_window_s);

    let (ve, vco2_l): (Vec<f64>, Vec<f64>) = complete
        .iter()
        .filter_map(|s| match (s.ve_l_min, s.vco2_ml_min) {
            (Some(ve), Some(vco2)) => Some((ve, vco2 / ML_PER_L)),
            _ => None,
        })
        .unzip();
    let ve_vco2_slope = least_squares(&vco2_l, &ve).map(|(slope, _)| slope);

    SessionSummary {
        sample_count: samples.len(),
        complete_sample_count: complete.len(),
        duration_s,
        peak_vo2_ml_min,
        peak_vo2_ml_kg_min: peak_vo2_ml_min.map(|v| v / subject.body_mass_kg),
        peak_workload_w: max_of(samples.iter().map(|s| s.workload_w)),
        peak_hr_bpm: max_of(samples.iter().map(|s| s.hr_bpm)),
        peak_rer: max_of(samples.iter().map(|s| s.rer)),
        ve_vco2_slope,
        mean_fat_ox_g_min: mean_of(samples.iter().map(|s| s.fat_ox_g_min)),
        mean_cho_ox_g_min: mean_of(samples.iter().map(|s| s.cho_ox_g_min)),
        bmi: subject.bmi(),
    }
}
