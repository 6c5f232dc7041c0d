use super::{FeatureBuilder, FeatureReader, ReaderOptions};
use ::geojson::{feature::Id, GeoJson};
use anyhow::{anyhow, bail, Context};
use flk_sdk::Feature;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// Record separator allowed in front of GeoJSON text sequence entries
const RECORD_SEPARATOR: char = '\u{1e}';

enum Source {
    Collection(std::vec::IntoIter<::geojson::Feature>),
    Lines(Lines<BufReader<File>>),
}

/// Reads a GeoJSON `FeatureCollection` file or a GeoJSON sequence file
/// (`.jsonl`, `.geojsonl`, `.geojsons`, `.ndjson`), one feature at a time
pub struct GeoJsonReader {
    path: String,
    stem: String,
    source: Source,
    builder: FeatureBuilder,
    line: usize,
}

impl GeoJsonReader {
    /// Open a GeoJSON file
    /// Collections are parsed up front, sequences line by line. Every feature's
    /// properties are scanned first so each type gets one descriptor covering all of them
    pub fn new(path: &str, options: ReaderOptions) -> anyhow::Result<Self> {
        let stem = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("features")
            .to_string();
        let mut builder = FeatureBuilder::new(options);

        let source = if is_sequence(path) {
            for line in open(path)?.lines() {
                let line = line.with_context(|| format!("failed to read {}", path))?;
                // Unparsable lines are reported while iterating
                if let Ok(entry) = serde_json::from_str::<SequenceEntry>(sequence_text(&line)) {
                    builder.observe(&entry.properties.unwrap_or_default(), &stem);
                }
            }
            Source::Lines(open(path)?.lines())
        } else {
            let document: GeoJson = serde_json::from_reader(open(path)?)
                .with_context(|| format!("failed to parse GeoJSON in {}", path))?;
            let features = match document {
                GeoJson::FeatureCollection(collection) => collection.features,
                GeoJson::Feature(feature) => vec![feature],
                GeoJson::Geometry(_) => {
                    bail!("{} holds a bare geometry, expected features", path)
                }
            };
            let empty = Map::new();
            for feature in &features {
                builder.observe(feature.properties.as_ref().unwrap_or(&empty), &stem);
            }
            Source::Collection(features.into_iter())
        };

        Ok(Self {
            path: path.to_string(),
            stem,
            source,
            builder,
            line: 0,
        })
    }

    fn convert(&mut self, raw: ::geojson::Feature) -> anyhow::Result<Feature> {
        let id = raw.id.map(|id| match id {
            Id::String(s) => s,
            Id::Number(n) => n.to_string(),
        });
        let geometry = raw.geometry.map(serde_json::to_value).transpose()?;
        Ok(self
            .builder
            .build(id, raw.properties.unwrap_or_default(), geometry, &self.stem))
    }
}

/// Properties of one sequence line, enough to learn its attribute kinds
#[derive(Deserialize)]
struct SequenceEntry {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

fn open(path: &str) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
    Ok(BufReader::new(file))
}

fn sequence_text(line: &str) -> &str {
    line.trim().trim_start_matches(RECORD_SEPARATOR)
}

fn is_sequence(path: &str) -> bool {
    matches!(
        Path::new(path).extension().and_then(|e| e.to_str()),
        Some("jsonl" | "geojsonl" | "geojsons" | "ndjson")
    )
}

impl Iterator for GeoJsonReader {
    type Item = anyhow::Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match &mut self.source {
            Source::Collection(features) => features.next()?,
            Source::Lines(lines) => loop {
                let line = match lines.next()? {
                    Ok(line) => line,
                    Err(e) => return Some(Err(anyhow!("failed to read {}: {}", self.path, e))),
                };
                self.line += 1;

                let text = sequence_text(&line);
                if text.is_empty() {
                    continue;
                }
                match serde_json::from_str::<::geojson::Feature>(text) {
                    Ok(feature) => break feature,
                    Err(e) => {
                        return Some(Err(anyhow!(
                            "{}:{}: invalid GeoJSON feature: {}",
                            self.path,
                            self.line,
                            e
                        )))
                    }
                }
            },
        };
        Some(self.convert(raw))
    }
}

impl FeatureReader for GeoJsonReader {
    fn sources(&self) -> Vec<String> {
        vec![self.path.clone()]
    }
}
