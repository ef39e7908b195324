//! Shape System
//!
//! Declarative record shapes: TOML definitions, an in-memory registry and
//! a file-backed manager with live reload.

pub mod manager;
pub mod registry;
pub mod schema;

pub use manager::{LoadedShape, ShapeManager, ShapePriority, ShapeResolution, ShapeSelectionConfig};
pub use registry::{detect_shape_directive, shape_directive, ShapeRegistry, SHAPE_DIRECTIVE_KEY};
pub use schema::{
    Bound, CompareOp, Constraint, FieldDef, FieldType, RefinementDef, Shape, ShapeError,
    ShapeFile, EMAIL_PATTERN,
};
