//! Core Form Logic
//!
//! Form state transitions and routing of validation errors to inputs.

pub mod form;
pub mod routing;

pub use form::{FormState, FormStatus};
pub use routing::{ErrorRouter, RoutedErrors};
