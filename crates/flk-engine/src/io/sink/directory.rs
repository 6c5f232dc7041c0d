use super::{ConnectionParams, Result, Sink, SinkError, WriteHandle, WriteMode};
use flk_sdk::TypeDescriptor;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod jsonl;
pub mod parquet;

pub use self::jsonl::JsonlHandle;
pub use self::parquet::ParquetHandle;

const SCHEMA_SUFFIX: &str = ".schema.json";

/// Data file format of a directory store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `<type>.jsonl`, one JSON object per row
    Jsonl,
    /// `<type>/part-NNNNNNNN.parquet`, one part per handle session
    Parquet,
}

impl FileFormat {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "jsonl" | "geojsonl" | "json" => Ok(FileFormat::Jsonl),
            "parquet" => Ok(FileFormat::Parquet),
            other => Err(SinkError::InvalidParams(format!(
                "unsupported file format '{}'",
                other
            ))),
        }
    }
}

/// File-based sink: one schema file plus data per type inside a directory
/// Offers no structural operations; recreating a schema clears its data
pub struct DirectoryStore {
    root: PathBuf,
    format: FileFormat,
    disposed: bool,
}

impl DirectoryStore {
    /// Open the directory named by `directory` (or `url`), creating it if needed
    /// `format` overrides the `format` parameter
    pub fn open(params: &ConnectionParams, format: Option<FileFormat>) -> Result<Self> {
        let root = params
            .get("directory")
            .or_else(|| params.get("url"))
            .ok_or_else(|| {
                SinkError::InvalidParams("directory store needs a 'directory' parameter".to_string())
            })?;

        let format = match format {
            Some(f) => f,
            None => params
                .get("format")
                .map(FileFormat::parse)
                .transpose()?
                .unwrap_or(FileFormat::Jsonl),
        };

        let root = PathBuf::from(root);
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            format,
            disposed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    fn schema_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, SCHEMA_SUFFIX))
    }

    fn data_path(&self, name: &str) -> PathBuf {
        match self.format {
            FileFormat::Jsonl => self.root.join(format!("{}.jsonl", name)),
            FileFormat::Parquet => self.root.join(name),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed {
            return Err(SinkError::Disposed);
        }
        Ok(())
    }

    /// Read the stored descriptor of a type
    pub fn describe(&self, name: &str) -> Result<TypeDescriptor> {
        self.ensure_open()?;
        let path = self.schema_path(name);
        if !path.exists() {
            return Err(SinkError::UnknownType(name.to_string()));
        }
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Number of rows stored for a type
    pub fn row_count(&self, name: &str) -> Result<usize> {
        self.ensure_open()?;
        let path = self.data_path(name);
        if !path.exists() {
            return Ok(0);
        }
        match self.format {
            FileFormat::Jsonl => {
                let reader = BufReader::new(File::open(path)?);
                let mut count = 0;
                for line in reader.lines() {
                    if !line?.trim().is_empty() {
                        count += 1;
                    }
                }
                Ok(count)
            }
            FileFormat::Parquet => self::parquet::count_rows(&path),
        }
    }
}

impl Sink for DirectoryStore {
    fn type_names(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let pattern = format!(
            "{}/*{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            SCHEMA_SUFFIX
        );
        let entries =
            glob::glob(&pattern).map_err(|e| SinkError::InvalidParams(e.to_string()))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| SinkError::Io(e.into_error()))?;
            if let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(SCHEMA_SUFFIX))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn create_schema(&mut self, descriptor: &TypeDescriptor) -> Result<()> {
        self.ensure_open()?;
        let json = serde_json::to_string_pretty(descriptor)?;
        fs::write(self.schema_path(&descriptor.name), json)?;

        // A fresh schema starts without rows
        let data = self.data_path(&descriptor.name);
        match self.format {
            FileFormat::Jsonl => {
                File::create(&data)?;
            }
            FileFormat::Parquet => {
                if data.exists() {
                    fs::remove_dir_all(&data)?;
                }
                fs::create_dir_all(&data)?;
            }
        }
        debug!(type_name = %descriptor.name, root = %self.root.display(), "schema file written");
        Ok(())
    }

    fn open_write_handle(&mut self, name: &str, mode: WriteMode) -> Result<Box<dyn WriteHandle>> {
        let descriptor = self.describe(name)?;
        let data = self.data_path(name);
        let handle: Box<dyn WriteHandle> = match self.format {
            FileFormat::Jsonl => Box::new(JsonlHandle::open(&data, descriptor, mode)?),
            FileFormat::Parquet => Box::new(ParquetHandle::open(&data, descriptor, mode)?),
        };
        Ok(handle)
    }

    fn dispose(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.disposed = true;
        Ok(())
    }
}
