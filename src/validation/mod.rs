//! Validation Engine
//!
//! Pure, synchronous validation of payloads against shapes, separated from
//! shape loading and LSP concerns.

pub mod coerce;
pub mod engine;
pub mod error;
pub mod path;

pub use engine::{validate, validate_report, NormalizedRecord, ValidationReport};
pub use error::{ErrorKind, FieldError, FieldErrors};
