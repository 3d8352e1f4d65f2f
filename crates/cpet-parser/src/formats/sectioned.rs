use crate::errors::ParserError;
use crate::model::{ParseLimits, ParsedExport, PhaseTag, ProtocolType};
use crate::registry::ExportParser;

use super::{parse_metadata, read_table, SeriesBuilder};

/// Interval/mixed export: breath data spread over named sections, each with
/// its own name and unit rows. The section name is the phase of its rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct SectionedParser;

struct Section {
    name: String,
    first_line: usize,
    body: String,
}

impl SectionedParser {
    const NAME: &'static str = "SECTIONED";

    fn section_name(line: &str) -> Option<&str> {
        let trimmed = line.trim().trim_end_matches(',');
        trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .map(str::trim)
    }

    fn split_sections(lines: &[&str]) -> Result<Vec<Section>, ParserError> {
        let mut sections: Vec<Section> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            // metadata occupies line 1
            let line_number = idx + 2;
            if let Some(name) = Self::section_name(line) {
                if name.is_empty() {
                    return Err(ParserError::InvalidSection {
                        parser: Self::NAME,
                        section: String::new(),
                        message: format!("empty section name at line {line_number}"),
                    });
                }
                sections.push(Section {
                    name: name.to_string(),
                    first_line: line_number + 1,
                    body: String::new(),
                });
                continue;
            }

            match sections.last_mut() {
                Some(section) => {
                    section.body.push_str(line);
                    section.body.push('\n');
                }
                None if line.trim().is_empty() => {}
                None => {
                    return Err(ParserError::FormatMismatch {
                        parser: Self::NAME,
                        reason: format!("line {line_number} appears before the first [section]"),
                    });
                }
            }
        }

        if sections.is_empty() {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "export contains no [section] headers".to_string(),
            });
        }
        Ok(sections)
    }
}

impl ExportParser for SectionedParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn supports(&self, protocol: ProtocolType) -> bool {
        protocol == ProtocolType::Mixed
    }

    fn parse(
        &self,
        content: &str,
        protocol: ProtocolType,
        limits: ParseLimits,
    ) -> Result<ParsedExport, ParserError> {
        if !self.supports(protocol) {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: format!("protocol '{protocol}' is not a sectioned layout"),
            });
        }

        let content = content.trim_start_matches('\u{feff}');
        let mut lines = content.lines();
        let metadata_line = lines.next().ok_or(ParserError::FormatMismatch {
            parser: Self::NAME,
            reason: "export is empty".to_string(),
        })?;
        let mut metadata = parse_metadata(Self::NAME, metadata_line, protocol)?;

        let rest: Vec<&str> = lines.collect();
        let sections = Self::split_sections(&rest)?;

        let mut series = SeriesBuilder::new(Self::NAME, limits);
        for section in &sections {
            let phase =
                PhaseTag::try_from(section.name.as_str()).map_err(|err| {
                    ParserError::InvalidSection {
                        parser: Self::NAME,
                        section: section.name.clone(),
                        message: err,
                    }
                })?;

            let layout = read_table(
                Self::NAME,
                &section.body,
                section.first_line,
                Some(phase),
                &mut series,
            )
            .map_err(|err| match err {
                ParserError::FormatMismatch { reason, .. } => ParserError::InvalidSection {
                    parser: Self::NAME,
                    section: section.name.clone(),
                    message: reason,
                },
                other => other,
            })?;

            for column in layout.ignored_columns() {
                if !metadata.ignored_columns.contains(column) {
                    metadata.ignored_columns.push(column.clone());
                }
            }
            metadata.sections.push(section.name.clone());
        }

        Ok(ParsedExport {
            parser: Self::NAME,
            protocol,
            metadata,
            breaths: series.finish()?,
        })
    }
}
