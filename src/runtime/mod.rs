use anyhow::{Context, Result};
use flk_engine::{FeatureReader, MultiFileReader, SinkWriter};
use flk_sdk::{Action, Feature};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::PipelineConfig;

mod manifest;
pub use manifest::RunManifest;

pub fn run_pipeline(config: &PipelineConfig) -> Result<RunManifest> {
    println!("Running pipeline: {}", config.name);

    let reader = MultiFileReader::open(&config.input.path, &config.input.reader)?;
    let input_files = reader.sources();
    info!(pipeline = %config.name, files = input_files.len(), "reading input");

    let params = config.output.connection_params()?;
    let mut writer =
        SinkWriter::with_options(params, config.output.append, config.output.drop_first);
    println!("  {}", writer);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} features ({per_sec})")?,
    );

    let limit = config.input.limit.unwrap_or(usize::MAX);
    let written = write_features(reader.take(limit), &mut writer, &pb);
    // Close even after a failure so buffered rows reach the sink
    let closed = writer.close().context("Failed to close datastore writer");

    let features_read = match (written, closed) {
        (Ok(read), Ok(())) => read,
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "closing after a failed run also failed");
            }
            pb.abandon_with_message("failed");
            return Err(e);
        }
        (Ok(_), Err(e)) => {
            pb.abandon_with_message("failed");
            return Err(e);
        }
    };
    pb.finish_with_message("done");

    let manifest = RunManifest {
        pipeline_name: config.name.clone(),
        input_files,
        output: writer.params().to_string(),
        features_read,
        stats: writer.stats(),
    };

    println!("  Features read: {}", manifest.features_read);
    println!("  Features written: {}", manifest.stats.features_written);
    println!("  Features skipped: {}", manifest.stats.features_skipped);
    println!("  Types synchronized: {}", manifest.stats.types_synchronized);

    if let Some(path) = &config.manifest {
        manifest
            .write_to_file(path)
            .with_context(|| format!("Failed to write manifest: {:?}", path))?;
        println!("  Manifest written to: {:?}", path);
    }

    Ok(manifest)
}

/// Push every feature through the action; returns the number read
fn write_features(
    features: impl Iterator<Item = Result<Feature>>,
    action: &mut dyn Action,
    pb: &ProgressBar,
) -> Result<usize> {
    let mut read = 0;
    for feature in features {
        let feature = feature?;
        read += 1;
        let label = feature.to_string();
        action
            .execute(feature)
            .with_context(|| format!("{} failed on feature {}", action.name(), label))?;
        pb.inc(1);
    }
    Ok(read)
}
