use super::geojson::GeoJsonReader;
use super::{FeatureReader, ReaderOptions};
use anyhow::Context;
use flk_sdk::Feature;

/// A reader that wraps multiple readers and reads from them sequentially
/// Each file infers its own type descriptors
pub struct MultiFileReader {
    readers: Vec<Box<dyn FeatureReader>>,
    current_reader_index: usize,
}

impl MultiFileReader {
    /// Create a new MultiFileReader from a list of readers
    pub fn new(readers: Vec<Box<dyn FeatureReader>>) -> anyhow::Result<Self> {
        if readers.is_empty() {
            return Err(anyhow::anyhow!(
                "MultiFileReader requires at least one reader"
            ));
        }
        Ok(Self {
            readers,
            current_reader_index: 0,
        })
    }

    /// Open every GeoJSON file matching a glob pattern, in path order
    pub fn open(pattern: &str, options: &ReaderOptions) -> anyhow::Result<Self> {
        let readers = expand_inputs(pattern)?
            .iter()
            .map(|path| {
                GeoJsonReader::new(path, options.clone())
                    .map(|r| Box::new(r) as Box<dyn FeatureReader>)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::new(readers)
    }
}

/// Resolve a glob pattern to the sorted list of matching files
pub fn expand_inputs(pattern: &str) -> anyhow::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("invalid input pattern '{}'", pattern))? {
        let path = entry?;
        if path.is_file() {
            files.push(path.to_string_lossy().to_string());
        }
    }
    if files.is_empty() {
        anyhow::bail!("no input files match '{}'", pattern);
    }
    files.sort();
    Ok(files)
}

impl Iterator for MultiFileReader {
    type Item = anyhow::Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_reader_index < self.readers.len() {
            if let Some(result) = self.readers[self.current_reader_index].next() {
                return Some(result);
            }

            // Current reader is exhausted, move to next
            self.current_reader_index += 1;
        }

        None
    }
}

impl FeatureReader for MultiFileReader {
    fn sources(&self) -> Vec<String> {
        self.readers.iter().flat_map(|r| r.sources()).collect()
    }
}
