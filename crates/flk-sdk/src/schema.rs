use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of value an attribute holds in a sink schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Integer,
    Float,
    Boolean,
    /// GeoJSON geometry object
    Geometry,
}

impl AttributeKind {
    /// Infer the kind of a JSON value
    /// Arrays, objects and nulls default to String, except GeoJSON geometries
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::String(_) => AttributeKind::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => AttributeKind::Integer,
            Value::Number(_) => AttributeKind::Float,
            Value::Bool(_) => AttributeKind::Boolean,
            Value::Object(obj) if looks_like_geometry(obj) => AttributeKind::Geometry,
            _ => AttributeKind::String,
        }
    }

    /// Smallest kind holding values of both kinds
    /// Integers widen to Float; any other conflict falls back to String
    pub fn widen(self, other: AttributeKind) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (AttributeKind::Integer, AttributeKind::Float)
            | (AttributeKind::Float, AttributeKind::Integer) => AttributeKind::Float,
            _ => AttributeKind::String,
        }
    }

    /// Whether a JSON value can be stored in an attribute of this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (AttributeKind::String, Value::String(_)) => true,
            // Integers widen into float columns
            (AttributeKind::Float, Value::Number(_)) => true,
            (AttributeKind::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (AttributeKind::Boolean, Value::Bool(_)) => true,
            (AttributeKind::Geometry, Value::Object(obj)) => looks_like_geometry(obj),
            _ => false,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::String => "string",
            AttributeKind::Integer => "integer",
            AttributeKind::Float => "float",
            AttributeKind::Boolean => "boolean",
            AttributeKind::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

fn looks_like_geometry(obj: &Map<String, Value>) -> bool {
    matches!(
        obj.get("type").and_then(Value::as_str),
        Some(
            "Point"
                | "MultiPoint"
                | "LineString"
                | "MultiLineString"
                | "Polygon"
                | "MultiPolygon"
                | "GeometryCollection"
        )
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Schema of a feature type: its name, ordered attributes and geometry field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub attributes: Vec<AttributeDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_field: Option<String>,
}

/// First attribute of a row that does not fit a type descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub attribute: String,
    pub detail: String,
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attribute '{}': {}", self.attribute, self.detail)
    }
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            geometry_field: None,
        }
    }

    /// Builder-style attribute registration
    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescriptor::new(name, kind));
        self
    }

    /// Declare the geometry field, adding it as a geometry attribute if missing
    pub fn with_geometry(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.attribute(&name).is_none() {
            self.attributes
                .push(AttributeDescriptor::new(name.clone(), AttributeKind::Geometry));
        }
        self.geometry_field = Some(name);
        self
    }

    /// Infer a descriptor from one feature's attributes
    /// The geometry field is only declared when the feature carries it
    pub fn infer(
        name: impl Into<String>,
        attributes: &Map<String, Value>,
        geometry_field: Option<&str>,
    ) -> Self {
        let mut descriptor = Self::new(name);
        for (attr_name, value) in attributes {
            let kind = if Some(attr_name.as_str()) == geometry_field {
                AttributeKind::Geometry
            } else {
                AttributeKind::infer(value)
            };
            descriptor
                .attributes
                .push(AttributeDescriptor::new(attr_name.clone(), kind));
        }
        if let Some(geom) = geometry_field {
            if descriptor.attribute(geom).is_some() {
                descriptor.geometry_field = Some(geom.to_string());
            }
        }
        descriptor
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// Check that every attribute of a row exists in this descriptor with a compatible kind
    pub fn check(&self, attributes: &Map<String, Value>) -> Result<(), ShapeMismatch> {
        for (name, value) in attributes {
            let Some(descriptor) = self.attribute(name) else {
                return Err(ShapeMismatch {
                    attribute: name.clone(),
                    detail: format!("not present in schema '{}'", self.name),
                });
            };
            if !descriptor.kind.accepts(value) {
                return Err(ShapeMismatch {
                    attribute: name.clone(),
                    detail: format!("expected {}, got {}", descriptor.kind, json_kind(value)),
                });
            }
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
