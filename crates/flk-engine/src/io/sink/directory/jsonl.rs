use crate::io::sink::{Result, WriteHandle, WriteMode};
use flk_sdk::TypeDescriptor;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Buffers rows and writes them as JSON lines
/// A row whose append fails is not kept, so a retried row is written once
pub struct JsonlHandle<W: Write = BufWriter<File>> {
    writer: W,
    descriptor: TypeDescriptor,
    buffer: Vec<Map<String, Value>>,
    partition_size: usize,
    rows_written: usize,
}

impl JsonlHandle {
    pub fn open(path: &Path, descriptor: TypeDescriptor, mode: WriteMode) -> Result<Self> {
        let file = match mode {
            WriteMode::Append => OpenOptions::new().create(true).append(true).open(path)?,
            WriteMode::Overwrite => File::create(path)?,
        };
        Ok(Self::from_writer(BufWriter::new(file), descriptor, 50000))
    }
}

impl<W: Write> JsonlHandle<W> {
    pub fn from_writer(writer: W, descriptor: TypeDescriptor, partition_size: usize) -> Self {
        Self {
            writer,
            descriptor,
            buffer: Vec::new(),
            partition_size,
            rows_written: 0,
        }
    }

    /// Flush buffer to disk
    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        // One write call for the whole buffer
        let mut output = String::with_capacity(self.buffer.len() * 200);
        for row in &self.buffer {
            output.push_str(&serde_json::to_string(row)?);
            output.push('\n');
        }

        self.writer.write_all(output.as_bytes())?;
        self.rows_written += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write> WriteHandle for JsonlHandle<W> {
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
        self.writer.flush()?;
        Ok(self.rows_written)
    }
}
