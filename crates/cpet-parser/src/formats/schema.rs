use super::common::{Quantity, TimeUnit};

pub const REQUIRED_QUANTITIES: [Quantity; 3] = [Quantity::Elapsed, Quantity::Vo2, Quantity::Vco2];

pub const CANONICAL_COLUMNS: [&str; 10] = [
    "elapsed_s",
    "phase",
    "vo2_ml_min",
    "vco2_ml_min",
    "ve_l_min",
    "hr_bpm",
    "workload_w",
    "reported_rer",
    "reported_fat_g_min",
    "reported_cho_g_min",
];

pub fn quantity_for_header(name: &str) -> Option<Quantity> {
    use Quantity::*;

    let normalized: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let quantity = match normalized.as_str() {
        "t" | "time" | "elapsed" | "elapsedtime" => Elapsed,
        "phase" | "marker" => Phase,
        "vo2" | "v'o2" => Vo2,
        "vco2" | "v'co2" => Vco2,
        "ve" | "v'e" => Ve,
        "hr" | "heartrate" => HeartRate,
        "load" | "power" | "work" | "watt" | "workload" => Workload,
        "rer" | "rq" => Rer,
        "fat" | "fatox" | "fat_ox" => FatOx,
        "cho" | "choox" | "cho_ox" => ChoOx,
        _ => return None,
    };
    Some(quantity)
}

/// Scale that converts a value in `unit` into the quantity's canonical unit.
pub fn unit_scale(quantity: Quantity, unit: &str) -> Option<f64> {
    use Quantity::*;

    let unit = unit.trim();
    let lower = unit.to_ascii_lowercase();
    match quantity {
        Elapsed | Phase => None,
        Vo2 | Vco2 => match lower.as_str() {
            "ml/min" => Some(1.0),
            "l/min" => Some(1000.0),
            _ => None,
        },
        Ve => match lower.as_str() {
            "l/min" => Some(1.0),
            "ml/min" => Some(0.001),
            _ => None,
        },
        HeartRate => match lower.as_str() {
            "bpm" | "1/min" | "/min" => Some(1.0),
            _ => None,
        },
        Workload => match lower.as_str() {
            "w" | "watt" | "watts" => Some(1.0),
            _ => None,
        },
        Rer => match lower.as_str() {
            "" | "-" | "ratio" => Some(1.0),
            _ => None,
        },
        FatOx | ChoOx => match lower.as_str() {
            "g/min" => Some(1.0),
            "g/h" => Some(1.0 / 60.0),
            _ => None,
        },
    }
}

pub fn time_unit(unit: &str) -> Option<TimeUnit> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" => Some(TimeUnit::Seconds),
        "min" => Some(TimeUnit::Minutes),
        "hh:mm:ss" | "h:mm:ss" | "mm:ss" => Some(TimeUnit::Clock),
        _ => None,
    }
}
