use blake3::Hasher;
use cpet_parser::{parse_export_bytes, ParseLimits, ParsedExport, ParserError, ProtocolType};
use tracing::debug;

use crate::config::IngestConfig;
use crate::error::{EngineError, Result};

#[derive(Debug)]
pub struct ExportInput<'a> {
    pub test_id: &'a str,
    pub contents: &'a [u8],
    pub protocol: ProtocolType,
}

/// A parsed export together with the digest of the bytes it came from.
#[derive(Debug, Clone)]
pub struct IngestedExport {
    pub hash: String,
    pub export: ParsedExport,
}

pub fn ingest_export(input: &ExportInput<'_>, config: &IngestConfig) -> Result<IngestedExport> {
    let hash = compute_hash(input.contents);

    // Parsing stops at the first breath past the ceiling.
    let limits = ParseLimits::with_max_breaths(config.max_samples);
    let export = match parse_export_bytes(input.contents, input.protocol, limits) {
        Ok(export) => export,
        Err(ParserError::TooManyBreaths { limit, .. }) => {
            return Err(EngineError::ExportTooLarge { limit });
        }
        Err(err) => return Err(err.into()),
    };

    debug!(
        test_id = input.test_id,
        parser = export.parser,
        protocol = %input.protocol,
        breaths = export.len(),
        ignored_columns = ?export.metadata.ignored_columns,
        "export parsed"
    );

    Ok(IngestedExport { hash, export })
}

pub fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    hasher.finalize().to_hex().to_string()
}
