pub mod action;
pub mod feature;
pub mod geometry;
pub mod schema;

pub use action::Action;
pub use feature::Feature;
pub use geometry::GeometryLookup;
pub use schema::{AttributeDescriptor, AttributeKind, ShapeMismatch, TypeDescriptor};

// Re-export anyhow for convenience
pub use anyhow::{Error, Result};
