pub mod aggregation;
pub mod calculator;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod flatten;
pub mod ingestion;
pub mod outputs;
pub mod pipelines;
pub mod smoothing;
pub mod storage;
pub mod thresholds;
pub mod trimming;
pub mod types;

pub use cpet_parser::{BreathSample, ParserError, PhaseTag, ProtocolType};
pub use error::{EngineError, Result};
