use crate::lsp::locate::KeyIndex;
use crate::shape::{Shape, ShapeResolution};

/// State for each open document
#[derive(Debug)]
pub struct DocumentState {
    pub content: String,
    /// Shape picked from the `$shape` directive or the configured default
    pub resolution: ShapeResolution,
    pub keys: KeyIndex,
}

impl DocumentState {
    pub fn new(content: String, resolution: ShapeResolution) -> Self {
        let keys = KeyIndex::build(&content);
        Self {
            content,
            resolution,
            keys,
        }
    }

    pub fn shape(&self) -> Option<&Shape> {
        match &self.resolution {
            ShapeResolution::Found(loaded) => Some(&loaded.shape),
            _ => None,
        }
    }
}
