//! Error Routing
//!
//! Attaches field errors to the inputs a form actually renders. An error
//! whose path names no rendered input goes to the nearest rendered
//! ancestor; failing that it becomes a form-level error. Nothing is dropped.

use std::collections::{BTreeMap, BTreeSet};

use crate::shape::Shape;
use crate::validation::path::parent_path;
use crate::validation::{FieldError, FieldErrors};

/// Errors split between rendered inputs and the form as a whole
#[derive(Debug, Default, PartialEq)]
pub struct RoutedErrors<'a> {
    /// Errors per input path, in check order
    pub inline: BTreeMap<String, Vec<&'a FieldError>>,
    /// Errors with no rendered input to show them
    pub form_level: Vec<&'a FieldError>,
}

impl<'a> RoutedErrors<'a> {
    /// Message shown under an input: the first error routed to it
    pub fn message_for(&self, input: &str) -> Option<&'a str> {
        self.inline
            .get(input)
            .and_then(|errors| errors.first())
            .map(|e| e.message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.inline.is_empty() && self.form_level.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inline.values().map(Vec::len).sum::<usize>() + self.form_level.len()
    }
}

/// Set of input paths a form renders
#[derive(Debug, Clone, Default)]
pub struct ErrorRouter {
    inputs: BTreeSet<String>,
}

impl ErrorRouter {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Router over every top-level field of a shape
    pub fn for_shape(shape: &Shape) -> Self {
        Self::new(shape.fields.iter().map(|f| f.name.clone()))
    }

    pub fn renders(&self, input: &str) -> bool {
        self.inputs.contains(input)
    }

    /// Input that should display an error at `path`, if any
    pub fn input_for<'p>(&'p self, path: &'p str) -> Option<&'p str> {
        let mut current = Some(path);
        while let Some(candidate) = current {
            if candidate.is_empty() {
                return None;
            }
            if let Some(input) = self.inputs.get(candidate) {
                return Some(input.as_str());
            }
            current = parent_path(candidate);
        }
        None
    }

    pub fn route<'a>(&self, errors: &'a FieldErrors) -> RoutedErrors<'a> {
        let mut routed = RoutedErrors::default();

        for error in errors {
            match self.input_for(&error.path) {
                Some(input) => routed.inline.entry(input.to_string()).or_default().push(error),
                None => {
                    if !error.path.is_empty() {
                        log::warn!(
                            "No input rendered for field '{}', showing at form level: {}",
                            error.path,
                            error.message
                        );
                    }
                    routed.form_level.push(error);
                }
            }
        }

        routed
    }
}
