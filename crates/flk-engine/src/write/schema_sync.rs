use super::error::{Result, WriteError};
use crate::io::sink::{ConnectionParams, Sink, SinkError};
use flk_sdk::TypeDescriptor;
use std::collections::HashSet;
use tracing::info;

/// Brings each type's storage into the requested state once per writer
#[derive(Debug)]
pub struct SchemaSynchronizer {
    drop_first: bool,
    append: bool,
    checked: HashSet<String>,
}

impl SchemaSynchronizer {
    pub fn new(drop_first: bool, append: bool) -> Self {
        Self {
            drop_first,
            append,
            checked: HashSet::new(),
        }
    }

    /// Number of (parameters, type) pairs synchronized so far
    pub fn synchronized(&self) -> usize {
        self.checked.len()
    }

    pub fn is_checked(&self, params: &ConnectionParams, type_name: &str) -> bool {
        self.checked.contains(&check_key(params, type_name))
    }

    /// Synchronize the type's schema unless done already for these parameters
    /// Returns whether any sink work was done
    pub fn ensure(
        &mut self,
        sink: &mut dyn Sink,
        params: &ConnectionParams,
        descriptor: &TypeDescriptor,
    ) -> Result<bool> {
        let key = check_key(params, &descriptor.name);
        if self.checked.contains(&key) {
            return Ok(false);
        }

        self.synchronize(sink, descriptor)
            .map_err(|source| WriteError::SchemaSync {
                type_name: descriptor.name.clone(),
                source,
            })?;

        self.checked.insert(key);
        Ok(true)
    }

    fn synchronize(
        &self,
        sink: &mut dyn Sink,
        descriptor: &TypeDescriptor,
    ) -> std::result::Result<(), SinkError> {
        let name = descriptor.name.as_str();
        let mut exists = sink.table_exists(name)?;

        if self.drop_first && exists {
            if let Some(ops) = sink.structural() {
                ops.drop_table(name)?;
            }
            exists = false;
        }

        if !exists {
            sink.create_schema(descriptor)?;
            info!(type_name = %name, "creating new table");
        } else if !self.append {
            // Sinks without structural operations keep their rows
            if let Some(ops) = sink.structural() {
                ops.truncate_table(name)?;
            }
        }
        Ok(())
    }
}

fn check_key(params: &ConnectionParams, type_name: &str) -> String {
    format!("{}{}", params.cache_key(), type_name)
}
