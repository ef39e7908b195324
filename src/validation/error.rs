//! Validation Errors
//!
//! Expected validation failures are values, never panics. Every failure
//! carries the path of the field it belongs to and a pre-authored message.

use std::fmt;

use serde::Serialize;

/// Classification of a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Required field absent or empty
    MissingRequiredField,
    /// Value does not coerce to the declared type
    TypeMismatch,
    /// Correctly typed value outside its declared bounds
    ConstraintViolation,
    /// Individually valid fields that break a relational rule
    CrossFieldViolation,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::MissingRequiredField => "missing_required_field",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::CrossFieldViolation => "cross_field_violation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single failed check, attached to a field path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
    pub kind: ErrorKind,
}

impl FieldError {
    pub fn new(kind: ErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Ordered list of field errors, in the order the checks ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// First error reported for exactly this path
    pub fn first_for(&self, path: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.path == path)
    }

    /// Whether any error is reported for this path
    pub fn has_path(&self, path: &str) -> bool {
        self.first_for(path).is_some()
    }

    /// Keep only the errors matching a predicate
    pub fn retain(&mut self, keep: impl FnMut(&FieldError) -> bool) {
        self.0.retain(keep);
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }
}

impl From<Vec<FieldError>> for FieldErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_for_keeps_order() {
        let errors = FieldErrors::from(vec![
            FieldError::new(ErrorKind::ConstraintViolation, "amount", "first"),
            FieldError::new(ErrorKind::CrossFieldViolation, "amount", "second"),
        ]);
        assert_eq!(errors.first_for("amount").unwrap().message, "first");
        assert!(!errors.has_path("title"));
    }

    #[test]
    fn test_display_root_error_has_no_path() {
        let error = FieldError::new(ErrorKind::TypeMismatch, "", "البيانات يجب أن تكون كائناً");
        assert_eq!(error.to_string(), "البيانات يجب أن تكون كائناً");

        let errors = FieldErrors::from(vec![
            FieldError::new(ErrorKind::MissingRequiredField, "title", "العنوان مطلوب"),
            error,
        ]);
        assert_eq!(errors.to_string(), "title: العنوان مطلوب\nالبيانات يجب أن تكون كائناً");
    }

    #[test]
    fn test_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::CrossFieldViolation).unwrap();
        assert_eq!(json, "\"cross_field_violation\"");
    }
}
