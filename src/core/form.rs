//! Form State
//!
//! One immutable value per form step. Editing a field or submitting the
//! form produces a new state; existing states never change.

use serde_json::{Map, Value};

use crate::shape::Shape;
use crate::validation::path::{self, is_within};
use crate::validation::{validate, FieldErrors, NormalizedRecord};

/// Where a form is in its edit/submit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormStatus {
    #[default]
    Editing,
    Rejected,
    Accepted,
}

/// Immutable snapshot of a form's values and validation outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    values: Map<String, Value>,
    errors: FieldErrors,
    record: Option<NormalizedRecord>,
    status: FormStatus,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing values, e.g. a record loaded for editing
    pub fn from_values(values: Map<String, Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// New state with one field set.
    ///
    /// Errors at or below the edited path are cleared so the input stops
    /// showing a stale message; other errors stay until the next submit.
    pub fn with_value(&self, field_path: &str, value: Value) -> Self {
        let mut values = self.values.clone();
        if !path::assign(&mut values, field_path, value) {
            log::warn!("Cannot set form value at '{}'", field_path);
            return self.clone();
        }
        self.edited(values, field_path)
    }

    /// New state with one field removed
    pub fn without_value(&self, field_path: &str) -> Self {
        let mut values = self.values.clone();
        if path::remove(&mut values, field_path).is_none() {
            return self.clone();
        }
        self.edited(values, field_path)
    }

    fn edited(&self, values: Map<String, Value>, field_path: &str) -> Self {
        let mut errors = self.errors.clone();
        errors.retain(|e| !is_within(&e.path, field_path));

        Self {
            values,
            errors,
            record: None,
            status: FormStatus::Editing,
        }
    }

    /// New state holding the outcome of validating the current values
    pub fn submit(&self, shape: &Shape) -> Self {
        let candidate = Value::Object(self.values.clone());
        match validate(shape, &candidate) {
            Ok(record) => Self {
                values: self.values.clone(),
                errors: FieldErrors::new(),
                record: Some(record),
                status: FormStatus::Accepted,
            },
            Err(errors) => Self {
                values: self.values.clone(),
                errors,
                record: None,
                status: FormStatus::Rejected,
            },
        }
    }

    pub fn value(&self, field_path: &str) -> Option<&Value> {
        self.values.get(field_path).or_else(|| {
            field_path
                .split_once('.')
                .and_then(|(head, rest)| path::lookup(self.values.get(head)?, rest))
        })
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Inline message for an input
    pub fn error_for(&self, field_path: &str) -> Option<&str> {
        self.errors.first_for(field_path).map(|e| e.message.as_str())
    }

    /// Normalized record of an accepted submit
    pub fn record(&self) -> Option<&NormalizedRecord> {
        self.record.as_ref()
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    pub fn is_accepted(&self) -> bool {
        self.status == FormStatus::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LEAVE: &str = r#"
[shape]
name = "leave"

[[fields]]
name = "reason"
label = "سبب الإجازة"
type = "string"
required = true

[[fields]]
name = "days"
label = "عدد الأيام"
type = "number"
required = true
constraints = [ { kind = "gt", value = 0, message = "عدد الأيام يجب أن يكون أكبر من صفر" } ]
"#;

    fn leave_shape() -> Shape {
        Shape::from_toml(LEAVE).unwrap()
    }

    #[test]
    fn test_with_value_leaves_original_untouched() {
        let empty = FormState::new();
        let edited = empty.with_value("reason", json!("سفر"));

        assert!(empty.values().is_empty());
        assert_eq!(edited.value("reason"), Some(&json!("سفر")));
        assert_eq!(edited.status(), FormStatus::Editing);
    }

    #[test]
    fn test_submit_rejects_then_accepts() {
        let shape = leave_shape();
        let rejected = FormState::new()
            .with_value("days", json!("0"))
            .submit(&shape);

        assert_eq!(rejected.status(), FormStatus::Rejected);
        assert_eq!(rejected.error_for("reason"), Some("سبب الإجازة مطلوب"));
        assert_eq!(rejected.error_for("days"), Some("عدد الأيام يجب أن يكون أكبر من صفر"));
        assert!(rejected.record().is_none());

        let fixed = rejected.with_value("days", json!("3"));
        assert_eq!(fixed.error_for("days"), None);
        assert_eq!(fixed.error_for("reason"), Some("سبب الإجازة مطلوب"));

        let accepted = fixed.with_value("reason", json!("سفر")).submit(&shape);
        assert!(accepted.is_accepted());
        assert_eq!(accepted.record().unwrap().get("days"), Some(&json!(3)));
        assert!(accepted.errors().is_empty());
    }

    #[test]
    fn test_nested_values_and_removal() {
        let state = FormState::new()
            .with_value("guarantor.name", json!("سالم"))
            .with_value("phones", json!(["0501111111", "0502222222"]));

        assert_eq!(state.value("guarantor.name"), Some(&json!("سالم")));
        assert_eq!(state.value("phones.1"), Some(&json!("0502222222")));

        let removed = state.without_value("phones.0");
        assert_eq!(removed.value("phones"), Some(&json!(["0502222222"])));
        assert_eq!(state.value("phones.0"), Some(&json!("0501111111")));
    }

    #[test]
    fn test_unreachable_path_keeps_state() {
        let state = FormState::new().with_value("title", json!("عقد"));
        let same = state.with_value("title.part", json!("x"));
        assert_eq!(same, state);
    }
}
