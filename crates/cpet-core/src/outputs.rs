use std::io::Cursor;

use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::DataFrame;
use tracing::info;

use crate::error::Result;
use crate::storage::{ResultStore, UpsertOutcome};
use crate::types::AnalysisResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new version was written.
    Created { version: u32 },
    /// The latest stored version already holds identical content.
    Unchanged { version: u32 },
}

impl PublishOutcome {
    pub fn version(&self) -> u32 {
        match self {
            PublishOutcome::Created { version } | PublishOutcome::Unchanged { version } => *version,
        }
    }
}

/// Stores `result` as the next version of its test unless the latest stored
/// version has the same content hash. History is never rewritten.
pub fn publish_result(
    store: &dyn ResultStore,
    mut result: AnalysisResult,
) -> Result<(PublishOutcome, AnalysisResult)> {
    match store.latest_result(&result.test_id)? {
        Some(existing) if existing.content_hash == result.content_hash => {
            info!(
                test_id = %existing.test_id,
                version = existing.version,
                "result unchanged"
            );
            let version = existing.version;
            return Ok((PublishOutcome::Unchanged { version }, existing));
        }
        Some(existing) => result.version = existing.version + 1,
        None => result.version = 1,
    }

    let outcome = match store.upsert_result(&result)? {
        UpsertOutcome::Inserted => PublishOutcome::Created {
            version: result.version,
        },
        UpsertOutcome::Unchanged => PublishOutcome::Unchanged {
            version: result.version,
        },
    };
    info!(test_id = %result.test_id, version = result.version, "result published");
    Ok((outcome, result))
}

pub fn write_parquet_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut clone = df.clone();
        ParquetWriter::new(&mut cursor)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)?;
    }
    Ok(buffer)
}
