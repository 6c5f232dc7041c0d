use crate::io::sink::{Result, SinkError, WriteHandle, WriteMode};
use ::parquet::arrow::ArrowWriter;
use ::parquet::file::reader::{FileReader, SerializedFileReader};
use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use flk_sdk::{AttributeKind, TypeDescriptor};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes one `part-NNNNNNNN.parquet` file per handle session
/// A row whose append fails is not kept
pub struct ParquetHandle {
    writer: Option<ArrowWriter<File>>,
    descriptor: TypeDescriptor,
    schema: Arc<Schema>,
    buffer: Vec<Map<String, Value>>,
    partition_size: usize,
    path: PathBuf,
    rows_written: usize,
}

impl ParquetHandle {
    pub fn open(dir: &Path, descriptor: TypeDescriptor, mode: WriteMode) -> Result<Self> {
        if mode == WriteMode::Overwrite {
            for part in list_parts(dir)? {
                fs::remove_file(part)?;
            }
        }
        fs::create_dir_all(dir)?;

        let next_id = list_parts(dir)?.len();
        let path = dir.join(format!("part-{:08}.parquet", next_id));

        Ok(Self {
            writer: None, // Created on first flush
            schema: arrow_schema(&descriptor),
            descriptor,
            buffer: Vec::new(),
            partition_size: 10000,
            path,
            rows_written: 0,
        })
    }

    /// Flush buffer to disk
    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = rows_to_batch(&self.buffer, &self.descriptor, &self.schema)?;
        if self.writer.is_none() {
            let file = File::create(&self.path)?;
            self.writer = Some(ArrowWriter::try_new(file, self.schema.clone(), None)?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write(&batch)?;
        }
        self.rows_written += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }
}

impl WriteHandle for ParquetHandle {
    fn type_name(&self) -> &str {
        &self.descriptor.name
    }

    fn append_row(&mut self, attributes: &Map<String, Value>) -> Result<()> {
        self.descriptor.check(attributes)?;
        self.buffer.push(attributes.clone());

        if self.buffer.len() >= self.partition_size {
            if let Err(e) = self.flush() {
                self.buffer.pop();
                return Err(e);
            }
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<usize> {
        self.flush()?;
        // Sessions without rows never create their part file
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(self.rows_written)
    }
}

fn list_parts(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let pattern = format!(
        "{}/part-*.parquet",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let entries = glob::glob(&pattern).map_err(|e| SinkError::InvalidParams(e.to_string()))?;
    let mut parts = Vec::new();
    for entry in entries {
        parts.push(entry.map_err(|e| SinkError::Io(e.into_error()))?);
    }
    parts.sort();
    Ok(parts)
}

/// Total rows across all part files of a type
pub(crate) fn count_rows(dir: &Path) -> Result<usize> {
    let mut total = 0;
    for part in list_parts(dir)? {
        let reader = SerializedFileReader::new(File::open(part)?)?;
        total += reader.metadata().file_metadata().num_rows() as usize;
    }
    Ok(total)
}

/// Geometries are stored as GeoJSON text
fn arrow_schema(descriptor: &TypeDescriptor) -> Arc<Schema> {
    let fields: Vec<Field> = descriptor
        .attributes
        .iter()
        .map(|attr| {
            let data_type = match attr.kind {
                AttributeKind::String | AttributeKind::Geometry => DataType::Utf8,
                AttributeKind::Integer => DataType::Int64,
                AttributeKind::Float => DataType::Float64,
                AttributeKind::Boolean => DataType::Boolean,
            };
            Field::new(attr.name.as_str(), data_type, true)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

fn rows_to_batch(
    rows: &[Map<String, Value>],
    descriptor: &TypeDescriptor,
    schema: &Arc<Schema>,
) -> Result<RecordBatch> {
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(descriptor.attributes.len());

    for attr in &descriptor.attributes {
        let name = attr.name.as_str();
        let array: ArrayRef = match attr.kind {
            AttributeKind::String => {
                let mut builder = StringBuilder::new();
                for row in rows {
                    match row.get(name) {
                        Some(Value::String(s)) => builder.append_value(s),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            AttributeKind::Geometry => {
                let mut builder = StringBuilder::new();
                for row in rows {
                    match row.get(name) {
                        None | Some(Value::Null) => builder.append_null(),
                        Some(geometry) => builder.append_value(geometry.to_string()),
                    }
                }
                Arc::new(builder.finish())
            }
            AttributeKind::Integer => {
                let mut builder = Int64Builder::new();
                for row in rows {
                    builder.append_option(row.get(name).and_then(Value::as_i64));
                }
                Arc::new(builder.finish())
            }
            AttributeKind::Float => {
                let mut builder = Float64Builder::new();
                for row in rows {
                    builder.append_option(row.get(name).and_then(Value::as_f64));
                }
                Arc::new(builder.finish())
            }
            AttributeKind::Boolean => {
                let mut builder = BooleanBuilder::new();
                for row in rows {
                    builder.append_option(row.get(name).and_then(Value::as_bool));
                }
                Arc::new(builder.finish())
            }
        };
        arrays.push(array);
    }

    Ok(RecordBatch::try_new(Arc::clone(schema), arrays)?)
}
