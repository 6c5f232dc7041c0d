use flk_engine::WriteStats;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Record of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub pipeline_name: String,
    pub input_files: Vec<String>,
    /// Connection parameters with credentials masked
    pub output: String,
    pub features_read: usize,
    #[serde(flatten)]
    pub stats: WriteStats,
}

impl RunManifest {
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
