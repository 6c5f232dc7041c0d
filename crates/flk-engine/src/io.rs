// Reader trait and implementations
pub mod reader;

pub use reader::{
    geojson::GeoJsonReader,
    multi_file::{expand_inputs, MultiFileReader},
    FeatureReader, ReaderOptions, DEFAULT_GEOMETRY_FIELD,
};

// Sink traits and stores
pub mod sink;

pub use sink::{open_sink, ConnectionParams, Sink, SinkError, WriteHandle, WriteMode};
