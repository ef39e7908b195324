//! LSP Protocol Implementation
//!
//! Language server for JSON payload documents: diagnostics, hover and
//! completion driven by the document's shape.

pub mod backend;
pub mod document;
pub mod handlers;
pub mod locate;
pub mod server;

pub use backend::Backend;
pub use locate::KeyIndex;
