use crate::errors::ParserError;
use crate::formats::{BreathTableParser, SectionedParser};
use crate::model::{ParseLimits, ParsedExport, ProtocolType};

pub trait ExportParser: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, protocol: ProtocolType) -> bool;
    fn parse(
        &self,
        content: &str,
        protocol: ProtocolType,
        limits: ParseLimits,
    ) -> Result<ParsedExport, ParserError>;
}

/// Layouts are a closed set keyed by the protocol tag; nothing is sniffed.
pub fn parser_for(protocol: ProtocolType) -> &'static dyn ExportParser {
    match protocol {
        ProtocolType::Ramp | ProtocolType::Step => &BreathTableParser,
        ProtocolType::Mixed => &SectionedParser,
    }
}

pub fn parse_export(content: &str, protocol: ProtocolType) -> Result<ParsedExport, ParserError> {
    parser_for(protocol).parse(content, protocol, ParseLimits::default())
}

/// Decodes raw export bytes and parses them, stopping as soon as the breath
/// ceiling in `limits` is passed.
pub fn parse_export_bytes(
    bytes: &[u8],
    protocol: ProtocolType,
    limits: ParseLimits,
) -> Result<ParsedExport, ParserError> {
    let content = std::str::from_utf8(bytes).map_err(|err| ParserError::InvalidEncoding {
        valid_up_to: err.valid_up_to(),
    })?;
    parser_for(protocol).parse(content, protocol, limits)
}
