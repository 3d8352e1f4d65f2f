#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt::Write;

use cpet_core::pipelines::SessionInput;
use cpet_core::types::SubjectInfo;
use cpet_core::{BreathSample, PhaseTag, ProtocolType};

pub const STEP_S: f64 = 5.0;
/// Rest idx 0..12, warm-up 12..24, exercise 24..120, recovery 120..132.
pub const EXERCISE_START: usize = 24;
pub const EXERCISE_END: usize = 119;
pub const BREATHS: usize = 132;
/// VO2 at which VCO2 starts rising faster than VO2.
pub const AT_VO2: f64 = 2200.0;

pub fn phase(idx: usize) -> &'static str {
    match idx {
        0..=11 => "Rest",
        12..=23 => "Warm-up",
        24..=119 => "Exercise",
        _ => "Recovery",
    }
}

pub fn workload(idx: usize) -> f64 {
    match idx {
        0..=11 => 0.0,
        12..=23 => 50.0,
        24..=119 => 50.0 + 2.5 * (idx - EXERCISE_START) as f64,
        _ => 25.0,
    }
}

pub fn vo2(idx: usize) -> f64 {
    match idx {
        0..=11 => 400.0,
        12..=23 => 1000.0,
        24..=119 => 500.0 + 10.0 * workload(idx),
        _ => 1200.0,
    }
}

pub fn vco2(idx: usize) -> f64 {
    let v = vo2(idx);
    if v <= AT_VO2 {
        0.85 * v
    } else {
        0.85 * AT_VO2 + 1.4 * (v - AT_VO2)
    }
}

/// Ramp export with a clear ventilatory breakpoint at `AT_VO2`.
pub struct RampExport {
    pub with_phases: bool,
    pub with_workload: bool,
    /// Every n-th breath reports `NaN` for RER.
    pub nan_rer_every: Option<usize>,
    pub breaths: usize,
}

impl Default for RampExport {
    fn default() -> Self {
        Self {
            with_phases: true,
            with_workload: true,
            nan_rer_every: None,
            breaths: BREATHS,
        }
    }
}

impl RampExport {
    pub fn render(&self) -> String {
        let mut names = vec!["t"];
        let mut units = vec!["s"];
        if self.with_phases {
            names.push("Phase");
            units.push("");
        }
        names.extend(["VO2", "VCO2", "VE", "HR"]);
        units.extend(["mL/min", "mL/min", "L/min", "bpm"]);
        if self.with_workload {
            names.push("Load");
            units.push("W");
        }
        names.push("RER");
        units.push("");

        let mut out = String::from("CPET,Synthetic Cart,SN-0001,2.3,ramp\n");
        out.push_str(&names.join(","));
        out.push('\n');
        out.push_str(&units.join(","));
        out.push('\n');

        for idx in 0..self.breaths {
            let mut cells = vec![format!("{}", idx as f64 * STEP_S)];
            if self.with_phases {
                cells.push(phase(idx).to_string());
            }
            let (o2, co2) = (vo2(idx), vco2(idx));
            cells.push(format!("{o2}"));
            cells.push(format!("{co2}"));
            cells.push(format!("{}", 0.03 * co2));
            cells.push(format!("{}", 70.0 + 0.45 * workload(idx)));
            if self.with_workload {
                cells.push(format!("{}", workload(idx)));
            }
            let rer = match self.nan_rer_every {
                Some(n) if idx % n == 0 => "NaN".to_string(),
                _ => format!("{}", co2 / o2),
            };
            cells.push(rer);
            let _ = writeln!(out, "{}", cells.join(","));
        }
        out
    }
}

/// The same ramp as [`RampExport`], already in canonical form.
pub fn ramp_breaths(with_phases: bool, with_workload: bool) -> Vec<BreathSample> {
    (0..BREATHS)
        .map(|idx| {
            let mut breath = BreathSample::new(idx as f64 * STEP_S);
            breath.vo2_ml_min = Some(vo2(idx));
            breath.vco2_ml_min = Some(vco2(idx));
            if with_workload {
                breath.workload_w = Some(workload(idx));
            }
            if with_phases {
                breath.phase = Some(match phase(idx) {
                    "Rest" => PhaseTag::Rest,
                    "Warm-up" => PhaseTag::WarmUp,
                    "Exercise" => PhaseTag::Exercise,
                    _ => PhaseTag::Recovery,
                });
            }
            breath
        })
        .collect()
}

pub fn subject() -> SubjectInfo {
    SubjectInfo::new(75.0, Some(180.0)).expect("valid subject")
}

pub fn session(test_id: &str, export: String) -> SessionInput {
    SessionInput {
        test_id: test_id.to_string(),
        cohort: Some("pilot".to_string()),
        groups: BTreeMap::new(),
        protocol: ProtocolType::Ramp,
        subject: subject(),
        export: export.into_bytes(),
    }
}

pub fn approx(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance
}
