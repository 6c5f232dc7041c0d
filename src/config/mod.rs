use anyhow::{Context, Result};
use flk_engine::{ConnectionParams, ReaderOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub input: InputConfig,
    pub output: OutputConfig,
    /// Where to write the run manifest, if anywhere
    #[serde(default)]
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Glob pattern of GeoJSON files
    pub path: String,
    #[serde(flatten)]
    pub reader: ReaderOptions,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Connection parameters of the sink
    pub params: serde_yaml::Mapping,
    #[serde(default)]
    pub append: bool,
    #[serde(default = "default_drop_first")]
    pub drop_first: bool,
}

fn default_drop_first() -> bool {
    true
}

impl PipelineConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        // Validate
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.input.path.trim().is_empty() {
            anyhow::bail!("Pipeline '{}' has an empty input path", self.name);
        }
        if self.input.limit == Some(0) {
            anyhow::bail!("Pipeline '{}' has an input limit of 0", self.name);
        }
        if self.output.params.is_empty() {
            anyhow::bail!("Pipeline '{}' has no output connection parameters", self.name);
        }
        self.output.connection_params()?;
        Ok(())
    }
}

impl OutputConfig {
    pub fn connection_params(&self) -> Result<ConnectionParams> {
        ConnectionParams::from_yaml(&self.params).context("Invalid output connection parameters")
    }
}
