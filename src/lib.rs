//! Shape Language Server
//!
//! Declarative record shapes and a validator for form payloads, served
//! through a Language Server and a command-line checker.
//!
//! This library provides:
//! - Shape definitions loaded from TOML, with load-time checking
//! - Payload validation with per-field errors and normalized records
//! - Immutable form state and error routing
//! - LSP protocol implementation
//! - Configuration management

pub mod config;
pub mod core;
pub mod lsp;
pub mod shape;
pub mod validation;

pub use config::Config;
pub use crate::core::{ErrorRouter, FormState};
pub use shape::{Shape, ShapeRegistry};
pub use validation::{
    validate, validate_report, ErrorKind, FieldError, FieldErrors, NormalizedRecord,
};
