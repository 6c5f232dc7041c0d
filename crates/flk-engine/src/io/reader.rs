use flk_sdk::{AttributeKind, Feature, TypeDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute name used for geometries when none is configured
pub const DEFAULT_GEOMETRY_FIELD: &str = "the_geom";

/// Unified reader trait for feature sources
/// Returns features one by one (generator-like API)
pub trait FeatureReader: Iterator<Item = anyhow::Result<Feature>> {
    /// Files this reader draws from
    fn sources(&self) -> Vec<String>;
}

pub mod geojson;
pub mod multi_file;

/// How raw GeoJSON features become typed features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderOptions {
    /// Property holding the type name; the file stem is used when unset or absent
    #[serde(default)]
    pub type_field: Option<String>,
    /// Attribute the geometry is stored under
    #[serde(default = "default_geometry_field")]
    pub geometry_field: String,
}

fn default_geometry_field() -> String {
    DEFAULT_GEOMETRY_FIELD.to_string()
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            type_field: None,
            geometry_field: default_geometry_field(),
        }
    }
}

/// Kinds seen per attribute of one type, in first-seen order
/// `None` marks an attribute that has only held nulls so far
type ObservedKinds = Vec<(String, Option<AttributeKind>)>;

/// Turns raw properties into features with one descriptor per type
/// Descriptors merge every observed feature of a type; types never observed
/// are inferred from their first feature
#[derive(Debug, Default)]
pub(crate) struct FeatureBuilder {
    options: ReaderOptions,
    observed: HashMap<String, ObservedKinds>,
    descriptors: HashMap<String, Arc<TypeDescriptor>>,
}

impl FeatureBuilder {
    pub fn new(options: ReaderOptions) -> Self {
        Self {
            options,
            observed: HashMap::new(),
            descriptors: HashMap::new(),
        }
    }

    fn type_name(&self, properties: &Map<String, Value>, fallback_type: &str) -> String {
        match self
            .options
            .type_field
            .as_deref()
            .and_then(|field| properties.get(field))
        {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            Some(Value::String(_) | Value::Null) | None => fallback_type.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Record the attribute kinds of a feature before any feature is built
    pub fn observe(&mut self, properties: &Map<String, Value>, fallback_type: &str) {
        let type_name = self.type_name(properties, fallback_type);
        let type_field = self.options.type_field.as_deref();
        let geometry_field = self.options.geometry_field.as_str();
        let kinds = self.observed.entry(type_name).or_default();

        for (name, value) in properties {
            if Some(name.as_str()) == type_field || name == geometry_field {
                continue;
            }
            let kind = (!value.is_null()).then(|| AttributeKind::infer(value));
            match kinds.iter_mut().find(|(seen, _)| seen == name) {
                Some((_, seen)) => {
                    *seen = match (*seen, kind) {
                        (Some(a), Some(b)) => Some(a.widen(b)),
                        (a, b) => a.or(b),
                    }
                }
                None => kinds.push((name.clone(), kind)),
            }
        }
    }

    fn descriptor(
        &mut self,
        type_name: &str,
        attributes: &Map<String, Value>,
    ) -> Arc<TypeDescriptor> {
        if let Some(descriptor) = self.descriptors.get(type_name) {
            return descriptor.clone();
        }

        let geometry_field = self.options.geometry_field.as_str();
        let descriptor = match self.observed.get(type_name) {
            Some(kinds) => {
                let mut descriptor = TypeDescriptor::new(type_name);
                for (name, kind) in kinds {
                    descriptor = descriptor
                        .with_attribute(name.clone(), kind.unwrap_or(AttributeKind::String));
                }
                descriptor.with_geometry(geometry_field)
            }
            None => TypeDescriptor::infer(type_name, attributes, Some(geometry_field)),
        };

        let descriptor = Arc::new(descriptor);
        self.descriptors
            .insert(type_name.to_string(), descriptor.clone());
        descriptor
    }

    pub fn build(
        &mut self,
        id: Option<String>,
        mut attributes: Map<String, Value>,
        geometry: Option<Value>,
        fallback_type: &str,
    ) -> Feature {
        let type_name = self.type_name(&attributes, fallback_type);
        if let Some(field) = self.options.type_field.as_deref() {
            attributes.remove(field);
        }
        attributes.insert(
            self.options.geometry_field.clone(),
            geometry.unwrap_or(Value::Null),
        );

        let descriptor = self.descriptor(&type_name, &attributes);
        let feature = Feature::from_attributes(descriptor, attributes);
        match id {
            Some(id) => feature.with_id(id),
            None => feature,
        }
    }
}
