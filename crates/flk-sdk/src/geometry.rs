use geo_types::Geometry;
use serde_json::Value;

/// Outcome of reading a feature's geometry attribute
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryLookup {
    /// A usable geometry
    Present(Geometry<f64>),
    /// A geometry collection with zero members
    EmptyCollection,
    /// No geometry could be read; the reason is meant for logs
    Missing(String),
}

impl GeometryLookup {
    /// Interpret a GeoJSON geometry value
    pub fn from_value(value: &Value) -> Self {
        if value.is_null() {
            return GeometryLookup::Missing("geometry attribute is null".to_string());
        }

        let geojson = match serde_json::from_value::<geojson::Geometry>(value.clone()) {
            Ok(g) => g,
            Err(e) => return GeometryLookup::Missing(format!("invalid GeoJSON geometry: {}", e)),
        };

        match Geometry::<f64>::try_from(geojson) {
            Ok(Geometry::GeometryCollection(collection)) if collection.0.is_empty() => {
                GeometryLookup::EmptyCollection
            }
            Ok(geometry) => GeometryLookup::Present(geometry),
            Err(e) => GeometryLookup::Missing(format!("unsupported geometry: {}", e)),
        }
    }

    pub fn is_empty_collection(&self) -> bool {
        matches!(self, GeometryLookup::EmptyCollection)
    }
}
