pub mod io;
pub mod write;

pub use io::{open_sink, ConnectionParams, FeatureReader, MultiFileReader, ReaderOptions};
pub use write::{SinkWriter, WriteError, WriteStats};
