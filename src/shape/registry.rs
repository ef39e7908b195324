//! Shape Registry
//!
//! Simple in-memory registry of shapes, seeded with the built-in business
//! shapes and optionally extended from a directory of TOML files.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use super::schema::Shape;
use crate::lsp::locate::KeyIndex;

/// Payload key naming the shape a document should be validated against
pub const SHAPE_DIRECTIVE_KEY: &str = "$shape";

/// Built-in shapes embedded in the binary, by name
pub const BUILTIN_SHAPES: &[(&str, &str)] = &[
    ("contract", include_str!("../../resources/shapes/contract.toml")),
    ("customer", include_str!("../../resources/shapes/customer.toml")),
    ("payment", include_str!("../../resources/shapes/payment.toml")),
    ("installment", include_str!("../../resources/shapes/installment.toml")),
    ("supplier", include_str!("../../resources/shapes/supplier.toml")),
    ("invoice", include_str!("../../resources/shapes/invoice.toml")),
    ("purchase", include_str!("../../resources/shapes/purchase.toml")),
    ("claim", include_str!("../../resources/shapes/claim.toml")),
];

/// Simple in-memory shape registry
#[derive(Debug, Clone, Default)]
pub struct ShapeRegistry {
    shapes: HashMap<String, Shape>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in shape
    pub fn with_builtin_shapes() -> Self {
        let mut registry = Self::new();
        registry.add_builtin_shapes();
        registry
    }

    /// Add a shape, returning the one it replaced
    pub fn add_shape(&mut self, shape: Shape) -> Option<Shape> {
        self.shapes.insert(shape.name.clone(), shape)
    }

    /// Add the embedded business shapes
    pub fn add_builtin_shapes(&mut self) {
        for (name, content) in BUILTIN_SHAPES {
            match Shape::from_toml(content) {
                Ok(shape) => {
                    self.add_shape(shape);
                }
                Err(e) => {
                    log::warn!("Failed to load built-in shape '{}': {}", name, e);
                }
            }
        }
    }

    pub fn get_shape(&self, name: &str) -> Option<&Shape> {
        self.shapes.get(name)
    }

    /// Sorted shape names
    pub fn list_shapes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.shapes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Load a single shape file, replacing any shape of the same name
    pub fn load_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read shape file: {}", path.display()))?;
        let shape = Shape::from_toml(&content)
            .with_context(|| format!("Failed to load shape file: {}", path.display()))?;
        let name = shape.name.clone();

        if self.add_shape(shape).is_some() {
            log::info!("Shape '{}' overridden by {}", name, path.display());
        }
        Ok(name)
    }

    /// Load every `.toml` file in a directory.
    ///
    /// A broken file is logged and skipped so one bad shape does not hide
    /// the others. Returns the number of shapes loaded.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read shape directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_shape_file(path))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.load_file(&path) {
                Ok(_) => loaded += 1,
                Err(e) => log::error!("{:#}", e),
            }
        }

        Ok(loaded)
    }
}

/// Whether a path looks like a shape definition file
pub fn is_shape_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

/// Shape named by the root-level directive of a parsed payload
pub fn shape_directive(payload: &Value) -> Option<&str> {
    payload.get(SHAPE_DIRECTIVE_KEY).and_then(Value::as_str)
}

/// Detect the shape directive in payload content.
///
/// Only the root object's key counts. A document that does not parse yet
/// is scanned for its root-level key instead.
pub fn detect_shape_directive(content: &str) -> Option<String> {
    match serde_json::from_str::<Value>(content) {
        Ok(payload) => shape_directive(&payload).map(str::to_string),
        Err(_) => KeyIndex::build(content)
            .string_value(SHAPE_DIRECTIVE_KEY)
            .map(str::to_string),
    }
}
