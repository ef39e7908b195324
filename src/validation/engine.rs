//! Validation Engine
//!
//! Checks a candidate payload against a shape. Fields are checked in
//! declaration order; the first failing constraint of a field is the one
//! reported, while every field is still checked. Refinements of a record
//! run only once all of that record's fields passed.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::shape::{Constraint, FieldDef, FieldType, RefinementDef, Shape};
use crate::validation::coerce::{self, compare_values, parse_date};
use crate::validation::error::{ErrorKind, FieldError, FieldErrors};
use crate::validation::path::join_path;

const ROOT_TYPE_MESSAGE: &str = "البيانات يجب أن تكون كائناً";

/// Accepted payload: declared fields only, coerced to their types
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRecord(Map<String, Value>);

impl NormalizedRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Full outcome of a validation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Normalized values of the fields that passed
    pub record: Map<String, Value>,
    pub errors: FieldErrors,
    /// Undeclared payload keys, stripped from the record
    pub unknown_keys: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<NormalizedRecord, FieldErrors> {
        if self.errors.is_empty() {
            Ok(NormalizedRecord(self.record))
        } else {
            Err(self.errors)
        }
    }
}

/// Validate a candidate payload against a shape
pub fn validate(shape: &Shape, candidate: &Value) -> Result<NormalizedRecord, FieldErrors> {
    validate_report(shape, candidate).into_result()
}

/// Validate and keep the partial record and unknown keys alongside errors
pub fn validate_report(shape: &Shape, candidate: &Value) -> ValidationReport {
    let mut validator = Validator {
        shape,
        errors: FieldErrors::new(),
        unknown_keys: Vec::new(),
    };

    let record = match candidate.as_object() {
        Some(object) => validator.validate_record(&shape.fields, &shape.refinements, object, ""),
        None => {
            validator.errors.push(FieldError::new(
                ErrorKind::TypeMismatch,
                "",
                ROOT_TYPE_MESSAGE,
            ));
            Map::new()
        }
    };

    log::debug!(
        "Validated payload against shape '{}': {} error(s), {} unknown key(s)",
        shape.name,
        validator.errors.len(),
        validator.unknown_keys.len()
    );

    ValidationReport {
        record,
        errors: validator.errors,
        unknown_keys: validator.unknown_keys,
    }
}

struct Validator<'a> {
    shape: &'a Shape,
    errors: FieldErrors,
    unknown_keys: Vec<String>,
}

impl Validator<'_> {
    fn validate_record(
        &mut self,
        fields: &[FieldDef],
        refinements: &[RefinementDef],
        object: &Map<String, Value>,
        prefix: &str,
    ) -> Map<String, Value> {
        let errors_before = self.errors.len();
        let mut record = Map::new();

        for field in fields {
            let path = join_path(prefix, &field.name);
            let label = field.display_name();
            let value = object.get(&field.name);
            if let Some(value) = self.validate_field(field, label, field.required, value, &path) {
                record.insert(field.name.clone(), value);
            }
        }

        for key in object.keys() {
            if !key.starts_with('$') && !fields.iter().any(|f| &f.name == key) {
                self.unknown_keys.push(join_path(prefix, key));
            }
        }

        if self.errors.len() == errors_before {
            for refinement in refinements {
                if let Some(error) = check_refinement(refinement, &record, prefix) {
                    self.errors.push(error);
                }
            }
        }

        record
    }

    /// Validate one value; `None` when it is not provided or fails
    fn validate_field(
        &mut self,
        field: &FieldDef,
        label: &str,
        required: bool,
        value: Option<&Value>,
        path: &str,
    ) -> Option<Value> {
        let value = match value {
            Some(value) if !is_blank(value) => value,
            _ => {
                if required {
                    let message = field
                        .required_message
                        .clone()
                        .unwrap_or_else(|| format!("{} مطلوب", label));
                    self.errors
                        .push(FieldError::new(ErrorKind::MissingRequiredField, path, message));
                }
                return None;
            }
        };

        let Some(coerced) = coerce::coerce(field.field_type, value) else {
            let message = field
                .type_message
                .clone()
                .unwrap_or_else(|| type_message(field.field_type, label));
            self.errors
                .push(FieldError::new(ErrorKind::TypeMismatch, path, message));
            return None;
        };

        for constraint in &field.constraints {
            if let Some(message) = self.check_constraint(constraint, field.field_type, &coerced, label)
            {
                self.errors
                    .push(FieldError::new(ErrorKind::ConstraintViolation, path, message));
                return None;
            }
        }

        match (field.field_type, coerced) {
            (FieldType::Object, Value::Object(object)) => Some(Value::Object(
                self.validate_record(&field.fields, &field.refinements, &object, path),
            )),
            (FieldType::Array, Value::Array(elements)) => {
                let items = field.items.as_deref()?;
                let item_label = items.label.as_deref().unwrap_or(label);
                // Elements are always present: a blank one is an error, and
                // failed elements keep their slot so indexes stay stable
                let normalized = elements
                    .iter()
                    .enumerate()
                    .map(|(i, element)| {
                        let item_path = join_path(path, &i.to_string());
                        self.validate_field(items, item_label, true, Some(element), &item_path)
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                Some(Value::Array(normalized))
            }
            (_, coerced) => Some(coerced),
        }
    }

    /// Message of the failing constraint, `None` when it holds
    fn check_constraint(
        &self,
        constraint: &Constraint,
        field_type: FieldType,
        value: &Value,
        label: &str,
    ) -> Option<String> {
        let holds = match constraint {
            Constraint::MinLength { value: min, .. } => {
                value.as_str().is_some_and(|s| s.chars().count() >= *min)
            }
            Constraint::MaxLength { value: max, .. } => {
                value.as_str().is_some_and(|s| s.chars().count() <= *max)
            }
            Constraint::Gt { value: bound, .. } => {
                compare_bound(field_type, value, bound).is_some_and(|o| o.is_gt())
            }
            Constraint::Min { value: bound, .. } => {
                compare_bound(field_type, value, bound).is_some_and(|o| o.is_ge())
            }
            Constraint::Lt { value: bound, .. } => {
                compare_bound(field_type, value, bound).is_some_and(|o| o.is_lt())
            }
            Constraint::Max { value: bound, .. } => {
                compare_bound(field_type, value, bound).is_some_and(|o| o.is_le())
            }
            Constraint::Int { .. } => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            Constraint::Pattern { regex, .. } => self.matches(regex, value),
            Constraint::Email { .. } => self.matches(crate::shape::EMAIL_PATTERN, value),
            Constraint::OneOf { values, .. } => value
                .as_str()
                .is_some_and(|s| values.iter().any(|allowed| allowed == s)),
            Constraint::MinItems { value: min, .. } => {
                value.as_array().is_some_and(|items| items.len() >= *min)
            }
            Constraint::MaxItems { value: max, .. } => {
                value.as_array().is_some_and(|items| items.len() <= *max)
            }
        };

        if holds {
            None
        } else {
            Some(
                constraint
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| default_constraint_message(constraint, label)),
            )
        }
    }

    fn matches(&self, pattern: &str, value: &Value) -> bool {
        match (self.shape.pattern(pattern), value.as_str()) {
            (Some(regex), Some(text)) => regex.is_match(text),
            _ => false,
        }
    }
}

/// Not provided: absent, null, or an empty string
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn compare_bound(
    field_type: FieldType,
    value: &Value,
    bound: &crate::shape::Bound,
) -> Option<std::cmp::Ordering> {
    use crate::shape::Bound;

    match (field_type, bound) {
        (FieldType::Number, Bound::Number(limit)) => value.as_f64()?.partial_cmp(limit),
        (FieldType::Date, Bound::Date(limit)) => {
            parse_date(value.as_str()?)?.partial_cmp(&parse_date(limit)?)
        }
        _ => None,
    }
}

fn check_refinement(
    refinement: &RefinementDef,
    record: &Map<String, Value>,
    prefix: &str,
) -> Option<FieldError> {
    match refinement {
        RefinementDef::Compare {
            field,
            op,
            other,
            message,
        } => {
            let left = record.get(field)?;
            let right = record.get(other)?;
            let ordering = compare_values(left, right)?;
            (!op.holds(ordering)).then(|| {
                FieldError::new(
                    ErrorKind::CrossFieldViolation,
                    join_path(prefix, field),
                    message.clone(),
                )
            })
        }
        RefinementDef::RequiredWhen {
            field,
            when,
            equals,
            message,
        } => {
            let discriminant = record.get(when).map(discriminant_text)?;
            let triggered = equals.iter().any(|e| *e == discriminant);
            (triggered && !record.contains_key(field)).then(|| {
                FieldError::new(
                    ErrorKind::CrossFieldViolation,
                    join_path(prefix, field),
                    message.clone(),
                )
            })
        }
    }
}

fn discriminant_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_message(field_type: FieldType, label: &str) -> String {
    match field_type {
        FieldType::String => format!("{} يجب أن يكون نصاً", label),
        FieldType::Number => format!("{} يجب أن يكون رقماً", label),
        FieldType::Boolean => format!("{} يجب أن يكون قيمة منطقية", label),
        FieldType::Date => format!("{} يجب أن يكون تاريخاً صالحاً", label),
        FieldType::Object => format!("{} يجب أن يكون كائناً", label),
        FieldType::Array => format!("{} يجب أن يكون قائمة", label),
    }
}

fn default_constraint_message(constraint: &Constraint, label: &str) -> String {
    match constraint {
        Constraint::MinLength { value, .. } => {
            format!("{} يجب أن يكون {} أحرف على الأقل", label, value)
        }
        Constraint::MaxLength { value, .. } => {
            format!("{} يجب ألا يتجاوز {} حرفاً", label, value)
        }
        Constraint::Gt { value, .. } => format!("{} يجب أن يكون أكبر من {}", label, value),
        Constraint::Min { value, .. } => format!("{} يجب ألا يقل عن {}", label, value),
        Constraint::Lt { value, .. } => format!("{} يجب أن يكون أقل من {}", label, value),
        Constraint::Max { value, .. } => format!("{} يجب ألا يتجاوز {}", label, value),
        Constraint::Int { .. } => format!("{} يجب أن يكون عدداً صحيحاً", label),
        Constraint::Pattern { .. } => format!("صيغة {} غير صحيحة", label),
        Constraint::Email { .. } => format!("{} يجب أن يكون بريداً إلكترونياً صالحاً", label),
        Constraint::OneOf { values, .. } => {
            format!("{} يجب أن يكون أحد القيم: {}", label, values.join("، "))
        }
        Constraint::MinItems { value, .. } => {
            format!("{} يجب أن يحتوي على {} عنصر على الأقل", label, value)
        }
        Constraint::MaxItems { value, .. } => {
            format!("{} يجب ألا يحتوي على أكثر من {} عناصر", label, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape(toml: &str) -> Shape {
        Shape::from_toml(toml).expect("valid shape")
    }

    const PAYMENT: &str = r#"
[shape]
name = "payment"

[[fields]]
name = "amount"
label = "المبلغ"
type = "number"
required = true
constraints = [
  { kind = "gt", value = 0, message = "المبلغ يجب أن يكون أكبر من صفر" },
  { kind = "max", value = 1000, message = "المبلغ يتجاوز الحد المسموح" },
]

[[fields]]
name = "discount"
label = "الخصم"
type = "number"
constraints = [ { kind = "min", value = 0 } ]

[[fields]]
name = "method"
label = "طريقة الدفع"
type = "string"
required = true
constraints = [ { kind = "one_of", values = ["CASH", "BANK_TRANSFER"], message = "طريقة الدفع غير صالحة" } ]

[[fields]]
name = "notes"
label = "الملاحظات"
type = "string"
constraints = [ { kind = "max_length", value = 10 } ]
"#;

    #[test]
    fn test_valid_payload_is_normalized() {
        let shape = shape(PAYMENT);
        let record = validate(&shape, &json!({ "amount": "250", "method": "CASH", "extra": 1 }))
            .expect("valid");
        assert_eq!(record.get("amount"), Some(&json!(250)));
        assert!(!record.contains_key("discount"));
        assert!(!record.contains_key("extra"));
    }

    #[test]
    fn test_errors_accumulate_across_fields() {
        let shape = shape(PAYMENT);
        let errors = validate(&shape, &json!({ "amount": 0, "method": "CHEQUE" })).unwrap_err();
        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["amount", "method"]);
        assert!(errors.iter().all(|e| e.kind == ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_first_failing_constraint_wins() {
        let shape = shape(PAYMENT);
        let errors = validate(&shape, &json!({ "amount": -5, "method": "CASH" })).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.iter().next().unwrap().message, "المبلغ يجب أن يكون أكبر من صفر");
    }

    #[test]
    fn test_missing_required_default_message() {
        let shape = shape(PAYMENT);
        let errors = validate(&shape, &json!({ "amount": 10 })).unwrap_err();
        let error = errors.first_for("method").unwrap();
        assert_eq!(error.kind, ErrorKind::MissingRequiredField);
        assert_eq!(error.message, "طريقة الدفع مطلوب");
    }

    #[test]
    fn test_type_mismatch() {
        let shape = shape(PAYMENT);
        let errors = validate(&shape, &json!({ "amount": "كثير", "method": "CASH" })).unwrap_err();
        let error = errors.first_for("amount").unwrap();
        assert_eq!(error.kind, ErrorKind::TypeMismatch);
        assert_eq!(error.message, "المبلغ يجب أن يكون رقماً");
    }

    #[test]
    fn test_default_constraint_messages() {
        let shape = shape(PAYMENT);
        let errors = validate(
            &shape,
            &json!({ "amount": 5, "method": "CASH", "discount": -1, "notes": "ملاحظة طويلة جداً" }),
        )
        .unwrap_err();
        assert_eq!(errors.first_for("discount").unwrap().message, "الخصم يجب ألا يقل عن 0");
        assert_eq!(
            errors.first_for("notes").unwrap().message,
            "الملاحظات يجب ألا يتجاوز 10 حرفاً"
        );
    }

    #[test]
    fn test_non_object_candidate() {
        let shape = shape(PAYMENT);
        let errors = validate(&shape, &json!([1, 2])).unwrap_err();
        assert_eq!(errors.len(), 1);
        let error = errors.first_for("").unwrap();
        assert_eq!(error.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_report_lists_unknown_keys_but_not_directives() {
        let shape = shape(PAYMENT);
        let report = validate_report(
            &shape,
            &json!({ "$shape": "payment", "amount": 5, "method": "CASH", "colour": "red" }),
        );
        assert!(report.is_valid());
        assert_eq!(report.unknown_keys, vec!["colour".to_string()]);
    }

    const NESTED: &str = r#"
[shape]
name = "nested"

[[fields]]
name = "guarantor"
label = "الكفيل"
type = "object"
fields = [
  { name = "name", label = "اسم الكفيل", type = "string", required = true },
  { name = "since", type = "date" },
  { name = "until", type = "date" },
]
refinements = [
  { kind = "compare", field = "until", op = "ge", other = "since", message = "نهاية الكفالة قبل بدايتها" },
]

[[fields]]
name = "phones"
label = "أرقام الهاتف"
type = "array"
constraints = [ { kind = "max_items", value = 3 } ]
items = { type = "string", label = "رقم الهاتف", constraints = [ { kind = "pattern", regex = "^05\\d{8}$", message = "رقم الهاتف غير صحيح" } ] }
"#;

    #[test]
    fn test_nested_paths() {
        let shape = shape(NESTED);
        let errors = validate(
            &shape,
            &json!({ "guarantor": {}, "phones": ["0501234567", "12345"] }),
        )
        .unwrap_err();
        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["guarantor.name", "phones.1"]);
        assert_eq!(errors.first_for("phones.1").unwrap().message, "رقم الهاتف غير صحيح");
    }

    #[test]
    fn test_nested_refinement_path() {
        let shape = shape(NESTED);
        let errors = validate(
            &shape,
            &json!({ "guarantor": { "name": "سالم", "since": "2024-05-01", "until": "2024-04-01" } }),
        )
        .unwrap_err();
        let error = errors.first_for("guarantor.until").unwrap();
        assert_eq!(error.kind, ErrorKind::CrossFieldViolation);
    }

    #[test]
    fn test_blank_array_elements_are_reported() {
        let shape = shape(NESTED);
        let report = validate_report(&shape, &json!({ "phones": ["", "0501234567", null] }));
        let paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["phones.0", "phones.2"]);
        assert!(report
            .errors
            .iter()
            .all(|e| e.kind == ErrorKind::MissingRequiredField && e.message == "رقم الهاتف مطلوب"));
        assert_eq!(
            report.record.get("phones"),
            Some(&json!([null, "0501234567", null]))
        );
    }

    #[test]
    fn test_array_item_limit() {
        let shape = shape(NESTED);
        let errors = validate(
            &shape,
            &json!({ "phones": ["0500000001", "0500000002", "0500000003", "0500000004"] }),
        )
        .unwrap_err();
        assert_eq!(
            errors.first_for("phones").unwrap().message,
            "أرقام الهاتف يجب ألا يحتوي على أكثر من 3 عناصر"
        );
    }
}
