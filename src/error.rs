//! Error types for terminology loading, matching and corpus processing.

use std::path::PathBuf;

use thiserror::Error;

use crate::terminology::TermId;

/// Top-level error type for the terminology engine.
#[derive(Debug, Error)]
pub enum TermError {
    /// Malformed terminology table.
    #[error("terminology error at line {line}: {message}")]
    Load { line: u64, message: String },

    /// A matcher was requested over zero eligible terms.
    #[error("cannot build matcher over an empty term set ({0})")]
    EmptyIndex(String),

    /// Text longer than the annotator currently admits.
    #[error("text of {len} bytes exceeds annotator capacity of {capacity} bytes")]
    AnnotationOverflow { len: usize, capacity: usize },

    /// A single input shard could not be read or decoded.
    #[error("failed to read shard {}: {source}", path.display())]
    Shard {
        path: PathBuf,
        #[source]
        source: Box<TermError>,
    },

    /// A term id that the terminology does not know.
    #[error("unknown term id {0}")]
    UnknownTermId(TermId),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl TermError {
    pub(crate) fn load(line: u64, message: impl Into<String>) -> Self {
        TermError::Load {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn shard(path: impl Into<PathBuf>, source: TermError) -> Self {
        TermError::Shard {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for terminology operations.
pub type Result<T> = std::result::Result<T, TermError>;
