use flk_sdk::TypeDescriptor;
use serde_json::{Map, Value};

pub mod directory;
pub mod error;
pub mod params;
pub mod sqlite;

pub use directory::{DirectoryStore, FileFormat};
pub use error::{Result, SinkError};
pub use params::{ConnectionParams, DEFAULT_MAX_CONNECTIONS, MAX_CONNECTIONS};
pub use sqlite::SqliteStore;

/// Type alias for sink opening function
pub type SinkOpenFn = Box<dyn Fn(&ConnectionParams) -> Result<Box<dyn Sink>>>;

/// How a write handle treats rows already stored for its type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Keep existing rows and add new ones after them
    Append,
    /// Remove existing rows before the first write
    Overwrite,
}

/// Per-type channel into a sink
/// Rows may be buffered; closing flushes them
pub trait WriteHandle {
    fn type_name(&self) -> &str;

    /// Append one row; the attributes must fit the type's schema
    fn append_row(&mut self, attributes: &Map<String, Value>) -> Result<()>;

    /// Flush and release the handle
    /// Returns the number of rows written through this handle
    fn close(self: Box<Self>) -> Result<usize>;
}

/// Table-level operations offered by sinks with real schema control
pub trait StructuralOps {
    /// Drop the table and its entry in the geometry catalog
    fn drop_table(&mut self, name: &str) -> Result<()>;

    /// Remove every row while keeping the table
    fn truncate_table(&mut self, name: &str) -> Result<()>;
}

/// Open connection to a storage target
pub trait Sink {
    /// Names of the types stored in the sink
    fn type_names(&self) -> Result<Vec<String>>;

    fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.type_names()?.iter().any(|n| n == name))
    }

    /// Create storage for a type; an existing type with the same name is replaced
    fn create_schema(&mut self, descriptor: &TypeDescriptor) -> Result<()>;

    /// Structural schema operations, if the sink supports them
    fn structural(&mut self) -> Option<&mut dyn StructuralOps> {
        None
    }

    fn open_write_handle(&mut self, name: &str, mode: WriteMode) -> Result<Box<dyn WriteHandle>>;

    /// Release the connection; later calls fail with `SinkError::Disposed`
    fn dispose(&mut self) -> Result<()>;
}

/// Open a sink from connection parameters
/// `dbtype` picks the sink; without it a `database` key means SQLite and a
/// `directory` key means a directory store
pub fn open_sink(params: &ConnectionParams) -> Result<Box<dyn Sink>> {
    let dbtype = match params.get("dbtype") {
        Some(t) => t.to_ascii_lowercase(),
        None if params.contains_key("database") => "sqlite".to_string(),
        None if params.contains_key("directory") => "directory".to_string(),
        None => {
            return Err(SinkError::InvalidParams(
                "no 'dbtype', 'database' or 'directory' parameter".to_string(),
            ))
        }
    };

    let sink: Box<dyn Sink> = match dbtype.as_str() {
        "sqlite" | "sqlite3" => Box::new(SqliteStore::open(params)?),
        "directory" | "file" => Box::new(DirectoryStore::open(params, None)?),
        "jsonl" | "geojsonl" => Box::new(DirectoryStore::open(params, Some(FileFormat::Jsonl))?),
        "parquet" => Box::new(DirectoryStore::open(params, Some(FileFormat::Parquet))?),
        other => {
            return Err(SinkError::InvalidParams(format!(
                "unsupported dbtype '{}'",
                other
            )))
        }
    };
    Ok(sink)
}

/// Quote an identifier for SQL, doubling embedded quotes
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
