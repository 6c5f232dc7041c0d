use crate::geometry::GeometryLookup;
use crate::schema::TypeDescriptor;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Feature is one geographic record: an id, its type descriptor and an attribute map
/// Features of the same type share their descriptor until one of them is renamed
#[derive(Clone, Debug)]
pub struct Feature {
    id: String,
    descriptor: Arc<TypeDescriptor>,
    attributes: Map<String, Value>,
}

impl Feature {
    /// Create an empty feature with a generated id
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            descriptor,
            attributes: Map::new(),
        }
    }

    /// Create from an attribute map
    pub fn from_attributes(descriptor: Arc<TypeDescriptor>, attributes: Map<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            descriptor,
            attributes,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.descriptor.name
    }

    /// Rename the feature's type; the descriptor is copied if it is shared
    pub fn set_type_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.descriptor.name != name {
            Arc::make_mut(&mut self.descriptor).name = name;
        }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.attributes
    }

    /// Look up the geometry under the descriptor's declared geometry field
    pub fn geometry(&self) -> GeometryLookup {
        let Some(field) = self.descriptor.geometry_field.as_deref() else {
            return GeometryLookup::Missing(format!(
                "type '{}' declares no geometry field",
                self.descriptor.name
            ));
        };
        match self.attributes.get(field) {
            Some(value) => GeometryLookup::from_value(value),
            None => GeometryLookup::Missing(format!("attribute '{}' is absent", field)),
        }
    }

    // --- getters ---
    pub fn get(&self, k: &str) -> Option<&Value> {
        self.attributes.get(k)
    }

    pub fn get_str(&self, k: &str) -> Option<&str> {
        self.attributes.get(k)?.as_str()
    }

    pub fn get_i64(&self, k: &str) -> Option<i64> {
        self.attributes.get(k)?.as_i64()
    }

    pub fn get_f64(&self, k: &str) -> Option<f64> {
        self.attributes.get(k)?.as_f64()
    }

    pub fn get_bool(&self, k: &str) -> Option<bool> {
        self.attributes.get(k)?.as_bool()
    }

    // --- setters ---
    pub fn set_str(&mut self, k: impl Into<String>, v: impl Into<String>) {
        self.attributes.insert(k.into(), Value::String(v.into()));
    }

    pub fn set_i64(&mut self, k: impl Into<String>, v: i64) {
        self.attributes.insert(k.into(), Value::Number(v.into()));
    }

    pub fn set_f64(&mut self, k: impl Into<String>, v: f64) {
        let number = serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number);
        self.attributes.insert(k.into(), number);
    }

    pub fn set_bool(&mut self, k: impl Into<String>, v: bool) {
        self.attributes.insert(k.into(), Value::Bool(v));
    }

    pub fn set_value(&mut self, k: impl Into<String>, v: Value) {
        self.attributes.insert(k.into(), v);
    }

    pub fn remove(&mut self, k: &str) -> Option<Value> {
        self.attributes.remove(k)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.descriptor.name, self.id)
    }
}
