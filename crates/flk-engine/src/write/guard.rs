use flk_sdk::{Feature, GeometryLookup};
use serde_json::Value;
use tracing::warn;

/// Skips features whose geometry is an empty geometry collection
#[derive(Debug, Default, Clone, Copy)]
pub struct GeometryGuard;

impl GeometryGuard {
    pub fn should_skip(&self, feature: &Feature) -> bool {
        match feature.geometry() {
            GeometryLookup::EmptyCollection => {
                let dump = Value::Object(feature.attributes().clone()).to_string();
                warn!(
                    feature = %feature,
                    attributes = %dump,
                    "skipping feature with empty GeometryCollection"
                );
                true
            }
            GeometryLookup::Missing(reason) => {
                warn!(feature = %feature, reason = %reason, "no geometry descriptor found, writing feature as is");
                false
            }
            GeometryLookup::Present(_) => false,
        }
    }
}
