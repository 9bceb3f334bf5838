//! Error kinds of a generation run

use std::path::PathBuf;
use thiserror::Error;

/// Errors that decide whether a run, a record or an artifact fails
#[derive(Debug, Error)]
pub enum ActError {
    /// Source or template workbook is absent; the run stops before any record
    #[error("{what} not found: {}", path.display())]
    MissingInputFile { what: &'static str, path: PathBuf },

    /// A single record could not be turned into an act; the batch continues
    #[error("record {record_id} (row {row}): {reason}")]
    RecordProcessing {
        record_id: String,
        row: u32,
        reason: String,
    },

    /// Writing an act or the aggregate workbook failed
    #[error("failed to write {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },
}

/// Normalization failures of one input row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("'{field}' holds {found} lines, at most {max} are supported")]
    TooManyParts {
        field: &'static str,
        found: usize,
        max: usize,
    },

    #[error("'{field}' splits into {parts} part(s) but '{paired}' splits into {paired_parts}")]
    MismatchedParts {
        field: &'static str,
        parts: usize,
        paired: &'static str,
        paired_parts: usize,
    },
}

impl ActError {
    pub fn record(record_id: impl Into<String>, row: u32, reason: impl std::fmt::Display) -> Self {
        ActError::RecordProcessing {
            record_id: record_id.into(),
            row,
            reason: reason.to_string(),
        }
    }
}
