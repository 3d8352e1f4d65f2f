use chrono::{NaiveTime, Timelike};
use csv::StringRecord;

use crate::errors::ParserError;
use crate::model::{BreathSample, ExportMetadata, ParseLimits, PhaseTag, ProtocolType};

use super::schema::{quantity_for_header, time_unit, unit_scale, REQUIRED_QUANTITIES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Elapsed,
    Phase,
    Vo2,
    Vco2,
    Ve,
    HeartRate,
    Workload,
    Rer,
    FatOx,
    ChoOx,
}

impl Quantity {
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Quantity::Elapsed => "elapsed_s",
            Quantity::Phase => "phase",
            Quantity::Vo2 => "vo2_ml_min",
            Quantity::Vco2 => "vco2_ml_min",
            Quantity::Ve => "ve_l_min",
            Quantity::HeartRate => "hr_bpm",
            Quantity::Workload => "workload_w",
            Quantity::Rer => "reported_rer",
            Quantity::FatOx => "reported_fat_g_min",
            Quantity::ChoOx => "reported_cho_g_min",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Clock,
}

#[derive(Debug, Clone, Copy)]
pub enum ColumnRole {
    Elapsed(TimeUnit),
    Phase,
    Scaled { quantity: Quantity, scale: f64 },
    Ignored,
}

/// Column roles of one table, resolved from its name and unit rows.
#[derive(Debug, Clone)]
pub(crate) struct ColumnLayout {
    roles: Vec<ColumnRole>,
    names: Vec<String>,
    ignored: Vec<String>,
}

impl ColumnLayout {
    pub fn classify(
        parser: &'static str,
        names: &StringRecord,
        units: &StringRecord,
        units_row: usize,
    ) -> Result<Self, ParserError> {
        if units.len() != names.len() {
            return Err(ParserError::InvalidHeader {
                parser,
                row_index: units_row,
                message: format!(
                    "expected {} unit columns, found {}",
                    names.len(),
                    units.len()
                ),
            });
        }

        let mut roles = Vec::with_capacity(names.len());
        let mut seen: Vec<(Quantity, String)> = Vec::new();
        let mut ignored = Vec::new();

        for (name, unit) in names.iter().zip(units.iter()) {
            let header = name.trim();
            let Some(quantity) = quantity_for_header(header) else {
                if !header.is_empty() {
                    ignored.push(header.to_string());
                }
                roles.push(ColumnRole::Ignored);
                continue;
            };

            if let Some((_, first)) = seen.iter().find(|(q, _)| *q == quantity) {
                return Err(ParserError::AmbiguousColumn {
                    parser,
                    column: header.to_string(),
                    message: format!(
                        "both '{first}' and '{header}' map to {}",
                        quantity.canonical_name()
                    ),
                });
            }
            seen.push((quantity, header.to_string()));

            let role = match quantity {
                Quantity::Elapsed => ColumnRole::Elapsed(time_unit(unit).ok_or_else(|| {
                    ParserError::UnknownUnit {
                        parser,
                        column: header.to_string(),
                        unit: unit.trim().to_string(),
                    }
                })?),
                Quantity::Phase => {
                    if !unit.trim().is_empty() {
                        return Err(ParserError::UnknownUnit {
                            parser,
                            column: header.to_string(),
                            unit: unit.trim().to_string(),
                        });
                    }
                    ColumnRole::Phase
                }
                other => ColumnRole::Scaled {
                    quantity: other,
                    scale: unit_scale(other, unit).ok_or_else(|| ParserError::UnknownUnit {
                        parser,
                        column: header.to_string(),
                        unit: unit.trim().to_string(),
                    })?,
                },
            };
            roles.push(role);
        }

        for required in REQUIRED_QUANTITIES {
            if !seen.iter().any(|(q, _)| *q == required) {
                return Err(ParserError::MissingColumn {
                    parser,
                    column: required.canonical_name(),
                });
            }
        }

        Ok(Self {
            roles,
            names: names.iter().map(|n| n.trim().to_string()).collect(),
            ignored,
        })
    }

    pub fn ignored_columns(&self) -> &[String] {
        &self.ignored
    }

    pub fn row_to_sample(
        &self,
        parser: &'static str,
        record: &StringRecord,
        line_index: usize,
        section_phase: Option<PhaseTag>,
    ) -> Result<BreathSample, ParserError> {
        if record.len() != self.roles.len() {
            return Err(ParserError::DataRow {
                parser,
                line_index,
                message: format!(
                    "expected {} columns but found {}",
                    self.roles.len(),
                    record.len()
                ),
            });
        }

        let mut elapsed = None;
        let mut sample = BreathSample::new(0.0);

        for (idx, role) in self.roles.iter().enumerate() {
            let header = self.names[idx].as_str();
            let value = record.get(idx).unwrap_or("");
            match role {
                ColumnRole::Elapsed(unit) => {
                    elapsed = Some(parse_elapsed(parser, value, *unit, line_index, header)?);
                }
                ColumnRole::Phase => {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        let tag = PhaseTag::try_from(trimmed).map_err(|err| {
                            ParserError::DataRow {
                                parser,
                                line_index,
                                message: format!("{header}: {err}"),
                            }
                        })?;
                        sample.phase = Some(tag);
                    }
                }
                ColumnRole::Scaled { quantity, scale } => {
                    let parsed = parse_optional_f64(parser, value, line_index, header)?
                        .map(|v| v * scale);
                    match quantity {
                        Quantity::Vo2 => sample.vo2_ml_min = parsed,
                        Quantity::Vco2 => sample.vco2_ml_min = parsed,
                        Quantity::Ve => sample.ve_l_min = parsed,
                        Quantity::HeartRate => sample.hr_bpm = parsed,
                        Quantity::Workload => sample.workload_w = parsed,
                        Quantity::Rer => sample.reported_rer = parsed,
                        Quantity::FatOx => sample.reported_fat_g_min = parsed,
                        Quantity::ChoOx => sample.reported_cho_g_min = parsed,
                        Quantity::Elapsed | Quantity::Phase => {}
                    }
                }
                ColumnRole::Ignored => {}
            }
        }

        sample.elapsed_s = elapsed.ok_or(ParserError::DataRow {
            parser,
            line_index,
            message: "missing elapsed time".to_string(),
        })?;
        if section_phase.is_some() {
            sample.phase = section_phase;
        }
        Ok(sample)
    }
}

/// Accumulates breaths across one or more tables, enforcing monotonic time
/// and the breath ceiling.
pub(crate) struct SeriesBuilder {
    parser: &'static str,
    limits: ParseLimits,
    breaths: Vec<BreathSample>,
}

impl SeriesBuilder {
    pub fn new(parser: &'static str, limits: ParseLimits) -> Self {
        Self {
            parser,
            limits,
            breaths: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: BreathSample, line_index: usize) -> Result<(), ParserError> {
        if self.breaths.len() >= self.limits.max_breaths {
            return Err(ParserError::TooManyBreaths {
                parser: self.parser,
                limit: self.limits.max_breaths,
                line_index,
            });
        }
        if let Some(previous) = self.breaths.last() {
            if sample.elapsed_s <= previous.elapsed_s {
                return Err(ParserError::DataRow {
                    parser: self.parser,
                    line_index,
                    message: format!(
                        "elapsed time {} s does not increase (previous {} s)",
                        sample.elapsed_s, previous.elapsed_s
                    ),
                });
            }
        }
        self.breaths.push(sample);
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<BreathSample>, ParserError> {
        if self.breaths.is_empty() {
            return Err(ParserError::EmptyData {
                parser: self.parser,
            });
        }
        Ok(self.breaths)
    }
}

pub(crate) fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).flexible(true).trim(csv::Trim::All);
    builder
}

/// Reads a name row, a unit row and the data rows of one table into `series`.
///
/// `line_offset` is the 1-based line of `text`'s first line in the whole export.
pub(crate) fn read_table(
    parser: &'static str,
    text: &str,
    line_offset: usize,
    section_phase: Option<PhaseTag>,
    series: &mut SeriesBuilder,
) -> Result<ColumnLayout, ParserError> {
    let mut reader = reader_builder().from_reader(text.as_bytes());
    let mut records = reader.records();

    let names = records
        .next()
        .ok_or(ParserError::FormatMismatch {
            parser,
            reason: "export missing column name row".to_string(),
        })?
        .map_err(|err| ParserError::Csv {
            parser,
            source: err,
        })?;
    let units = records
        .next()
        .ok_or(ParserError::FormatMismatch {
            parser,
            reason: "export missing unit row".to_string(),
        })?
        .map_err(|err| ParserError::Csv {
            parser,
            source: err,
        })?;

    let units_line = units
        .position()
        .map(|pos| pos.line() as usize + line_offset - 1)
        .unwrap_or(line_offset + 1);
    let layout = ColumnLayout::classify(parser, &names, &units, units_line)?;

    for record in records {
        let record = record.map_err(|err| ParserError::Csv {
            parser,
            source: err,
        })?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let line_index = record
            .position()
            .map(|pos| pos.line() as usize + line_offset - 1)
            .unwrap_or(line_offset);
        let sample = layout.row_to_sample(parser, &record, line_index, section_phase)?;
        series.push(sample, line_index)?;
    }

    Ok(layout)
}

pub(crate) fn parse_metadata(
    parser: &'static str,
    line: &str,
    requested: ProtocolType,
) -> Result<ExportMetadata, ParserError> {
    let mut reader = reader_builder().from_reader(line.as_bytes());
    let header = reader
        .records()
        .next()
        .ok_or(ParserError::FormatMismatch {
            parser,
            reason: "export missing metadata row".to_string(),
        })?
        .map_err(|err| ParserError::Csv {
            parser,
            source: err,
        })?;

    let file_format = header.get(0).unwrap_or_default();
    if !file_format.eq_ignore_ascii_case("cpet") {
        return Err(ParserError::FormatMismatch {
            parser,
            reason: format!("unsupported file format '{file_format}'"),
        });
    }

    let declared_protocol = match clean_optional(header.get(4)) {
        Some(text) => {
            let declared =
                ProtocolType::try_from(text.as_str()).map_err(|err| ParserError::InvalidHeader {
                    parser,
                    row_index: 1,
                    message: err,
                })?;
            if declared != requested {
                return Err(ParserError::Validation {
                    parser,
                    message: format!(
                        "export declares protocol '{declared}' but '{requested}' was requested"
                    ),
                });
            }
            Some(declared)
        }
        None => None,
    };

    Ok(ExportMetadata::new(
        file_format.to_ascii_uppercase(),
        clean_optional(header.get(1)),
        clean_optional(header.get(2)),
        clean_optional(header.get(3)),
        declared_protocol,
    ))
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Parses a numeric cell. Empty cells are absent; `NaN`/`Infinity` survive as
/// non-finite values.
pub(crate) fn parse_optional_f64(
    parser: &'static str,
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<Option<f64>, ParserError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|err| ParserError::DataRow {
            parser,
            line_index,
            message: format!("failed to parse column '{column}' as float: {err}"),
        })
}

pub(crate) fn parse_elapsed(
    parser: &'static str,
    value: &str,
    unit: TimeUnit,
    line_index: usize,
    column: &str,
) -> Result<f64, ParserError> {
    let trimmed = value.trim();
    let seconds = match unit {
        TimeUnit::Seconds => parse_optional_f64(parser, trimmed, line_index, column)?,
        TimeUnit::Minutes => {
            parse_optional_f64(parser, trimmed, line_index, column)?.map(|m| m * 60.0)
        }
        TimeUnit::Clock => Some(parse_clock(parser, trimmed, line_index)?),
    };

    match seconds {
        Some(s) if s.is_finite() => Ok(s),
        _ => Err(ParserError::DataRow {
            parser,
            line_index,
            message: format!("invalid elapsed time '{trimmed}'"),
        }),
    }
}

fn parse_clock(parser: &'static str, value: &str, line_index: usize) -> Result<f64, ParserError> {
    static FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S"];
    let padded = if value.matches(':').count() == 1 {
        format!("0:{value}")
    } else {
        value.to_string()
    };
    for fmt in FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(&padded, fmt) {
            let whole = time.num_seconds_from_midnight() as f64;
            return Ok(whole + f64::from(time.nanosecond()) / 1e9);
        }
    }
    Err(ParserError::DataRow {
        parser,
        line_index,
        message: format!("invalid clock time '{value}'"),
    })
}
