use thiserror::Error;

/// Errors raised by sinks and their write handles
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("invalid connection parameters: {0}")]
    InvalidParams(String),

    #[error("unknown type '{0}' in sink")]
    UnknownType(String),

    #[error("row does not fit schema: attribute '{attribute}': {detail}")]
    ShapeMismatch { attribute: String, detail: String },

    #[error("sink connection already disposed")]
    Disposed,
}

impl SinkError {
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, SinkError::ShapeMismatch { .. })
    }
}

impl From<flk_sdk::ShapeMismatch> for SinkError {
    fn from(m: flk_sdk::ShapeMismatch) -> Self {
        SinkError::ShapeMismatch {
            attribute: m.attribute,
            detail: m.detail,
        }
    }
}

pub type Result<T> = std::result::Result<T, SinkError>;
