use crate::errors::ParserError;
use crate::model::{ParseLimits, ParsedExport, ProtocolType};
use crate::registry::ExportParser;

use super::{parse_metadata, read_table, SeriesBuilder};

/// Single-sheet export used by ramp and step protocols: metadata row, column
/// names, units, then one row per breath.
#[derive(Debug, Default, Clone, Copy)]
pub struct BreathTableParser;

impl BreathTableParser {
    const NAME: &'static str = "BREATH_TABLE";

    fn split_metadata(content: &str) -> Result<(&str, &str), ParserError> {
        let content = content.trim_start_matches('\u{feff}');
        content
            .split_once('\n')
            .map(|(first, rest)| (first.trim_end_matches('\r'), rest))
            .ok_or(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "export has no rows after the metadata row".to_string(),
            })
    }
}

impl ExportParser for BreathTableParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn supports(&self, protocol: ProtocolType) -> bool {
        matches!(protocol, ProtocolType::Ramp | ProtocolType::Step)
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
                reason: format!("protocol '{protocol}' is not a single-sheet layout"),
            });
        }

        let (metadata_line, body) = Self::split_metadata(content)?;
        let mut metadata = parse_metadata(Self::NAME, metadata_line, protocol)?;

        let mut series = SeriesBuilder::new(Self::NAME, limits);
        let layout = read_table(Self::NAME, body, 2, None, &mut series)?;
        metadata.ignored_columns = layout.ignored_columns().to_vec();

        Ok(ParsedExport {
            parser: Self::NAME,
            protocol,
            metadata,
            breaths: series.finish()?,
        })
    }
}
