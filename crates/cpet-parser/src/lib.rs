pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::ParserError;
pub use model::{
    BreathSample, ExportMetadata, ParseLimits, ParsedExport, PhaseTag, ProtocolType,
};
pub use registry::{parse_export, parse_export_bytes, parser_for, ExportParser};
