use crate::io::sink::SinkError;
use thiserror::Error;

/// Errors raised by the write stage
#[derive(Debug, Error)]
pub enum WriteError {
    /// The sink could not be opened when the stage was built
    #[error(
        "opening sink failed; sink could not be found, a driver is missing or access was denied\nused parameters: {params}\ncause: {cause}"
    )]
    Initialization { params: String, cause: String },

    #[error("schema synchronization failed for type '{type_name}': {source}")]
    SchemaSync {
        type_name: String,
        #[source]
        source: SinkError,
    },

    #[error("could not create a '{type_name}' row out of feature {feature_id}: {detail}")]
    AttributeShapeMismatch {
        feature_id: String,
        type_name: String,
        detail: String,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("write stage is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, WriteError>;
