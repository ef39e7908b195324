//! Shape Schema Types
//!
//! A shape is the declarative description of a record: ordered fields,
//! their types and constraints, and cross-field refinements. Shapes are
//! written in TOML and checked once at load time, so a malformed shape is
//! rejected before any payload is validated against it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::validation::coerce::{format_number, parse_date};
use crate::validation::path::join_path;

/// Pattern used by the `email` constraint
pub const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Root shape file structure (matches TOML)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ShapeFile {
    pub shape: ShapeMeta,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub refinements: Vec<RefinementDef>,
}

/// Shape metadata
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ShapeMeta {
    pub name: String,
    pub label: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Field value types
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Object => "object",
            FieldType::Array => "array",
        };
        f.write_str(name)
    }
}

/// Field definition.
///
/// Object fields carry nested `fields` and `refinements`; array fields
/// carry an `items` rule, which is a field definition without a name.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FieldDef {
    #[serde(default)]
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    pub required_message: Option<String>,
    pub type_message: Option<String>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub refinements: Vec<RefinementDef>,
    pub items: Option<Box<FieldDef>>,
}

/// Bound of a range constraint: a number, or an ISO date for date fields
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Bound {
    Number(f64),
    Date(String),
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Number(n) => f.write_str(&format_number(*n)),
            Bound::Date(d) => f.write_str(d),
        }
    }
}

/// Single-field constraint, checked in declaration order
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    MinLength {
        value: usize,
        message: Option<String>,
    },
    MaxLength {
        value: usize,
        message: Option<String>,
    },
    /// Strictly greater than
    Gt {
        value: Bound,
        message: Option<String>,
    },
    /// Greater than or equal
    Min {
        value: Bound,
        message: Option<String>,
    },
    /// Strictly less than
    Lt {
        value: Bound,
        message: Option<String>,
    },
    /// Less than or equal
    Max {
        value: Bound,
        message: Option<String>,
    },
    Int {
        message: Option<String>,
    },
    Pattern {
        regex: String,
        message: Option<String>,
    },
    Email {
        message: Option<String>,
    },
    OneOf {
        values: Vec<String>,
        message: Option<String>,
    },
    MinItems {
        value: usize,
        message: Option<String>,
    },
    MaxItems {
        value: usize,
        message: Option<String>,
    },
}

impl Constraint {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constraint::MinLength { .. } => "min_length",
            Constraint::MaxLength { .. } => "max_length",
            Constraint::Gt { .. } => "gt",
            Constraint::Min { .. } => "min",
            Constraint::Lt { .. } => "lt",
            Constraint::Max { .. } => "max",
            Constraint::Int { .. } => "int",
            Constraint::Pattern { .. } => "pattern",
            Constraint::Email { .. } => "email",
            Constraint::OneOf { .. } => "one_of",
            Constraint::MinItems { .. } => "min_items",
            Constraint::MaxItems { .. } => "max_items",
        }
    }

    /// Pre-authored message, if the shape declares one
    pub fn message(&self) -> Option<&str> {
        match self {
            Constraint::MinLength { message, .. }
            | Constraint::MaxLength { message, .. }
            | Constraint::Gt { message, .. }
            | Constraint::Min { message, .. }
            | Constraint::Lt { message, .. }
            | Constraint::Max { message, .. }
            | Constraint::Int { message }
            | Constraint::Pattern { message, .. }
            | Constraint::Email { message }
            | Constraint::OneOf { message, .. }
            | Constraint::MinItems { message, .. }
            | Constraint::MaxItems { message, .. } => message.as_deref(),
        }
    }

    /// Check if this constraint can apply to a field type
    pub fn applies_to(&self, field_type: FieldType) -> bool {
        match self {
            Constraint::MinLength { .. }
            | Constraint::MaxLength { .. }
            | Constraint::Pattern { .. }
            | Constraint::Email { .. }
            | Constraint::OneOf { .. } => field_type == FieldType::String,
            Constraint::Gt { .. }
            | Constraint::Min { .. }
            | Constraint::Lt { .. }
            | Constraint::Max { .. } => {
                matches!(field_type, FieldType::Number | FieldType::Date)
            }
            Constraint::Int { .. } => field_type == FieldType::Number,
            Constraint::MinItems { .. } | Constraint::MaxItems { .. } => {
                field_type == FieldType::Array
            }
        }
    }

    fn bound(&self) -> Option<&Bound> {
        match self {
            Constraint::Gt { value, .. }
            | Constraint::Min { value, .. }
            | Constraint::Lt { value, .. }
            | Constraint::Max { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::MinLength { value, .. } => write!(f, "length >= {}", value),
            Constraint::MaxLength { value, .. } => write!(f, "length <= {}", value),
            Constraint::Gt { value, .. } => write!(f, "> {}", value),
            Constraint::Min { value, .. } => write!(f, ">= {}", value),
            Constraint::Lt { value, .. } => write!(f, "< {}", value),
            Constraint::Max { value, .. } => write!(f, "<= {}", value),
            Constraint::Int { .. } => f.write_str("integer"),
            Constraint::Pattern { regex, .. } => write!(f, "matches `{}`", regex),
            Constraint::Email { .. } => f.write_str("email address"),
            Constraint::OneOf { values, .. } => write!(f, "one of: {}", values.join(", ")),
            Constraint::MinItems { value, .. } => write!(f, "items >= {}", value),
            Constraint::MaxItems { value, .. } => write!(f, "items <= {}", value),
        }
    }
}

/// Comparison operator for `compare` refinements
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    /// Whether `left op right` holds given `left.cmp(right)`
    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;

        match self {
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
        }
    }
}

/// Cross-field rule, evaluated after the record's own fields pass
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefinementDef {
    /// `field op other`; the error is reported at `field`
    Compare {
        field: String,
        op: CompareOp,
        other: String,
        message: String,
    },
    /// `field` must be provided when `when` holds one of `equals`
    RequiredWhen {
        field: String,
        when: String,
        equals: Vec<String>,
        message: String,
    },
}

impl RefinementDef {
    /// Field the error is attached to
    pub fn target(&self) -> &str {
        match self {
            RefinementDef::Compare { field, .. } | RefinementDef::RequiredWhen { field, .. } => {
                field
            }
        }
    }

    fn operands(&self) -> [&str; 2] {
        match self {
            RefinementDef::Compare { field, other, .. } => [field, other],
            RefinementDef::RequiredWhen { field, when, .. } => [field, when],
        }
    }
}

/// Malformed shape definition
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("failed to parse shape TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("shape name must not be empty")]
    EmptyName,

    #[error("shape '{shape}': field at '{path}' has no name")]
    EmptyFieldName { shape: String, path: String },

    #[error("shape '{shape}': duplicate field '{path}'")]
    DuplicateField { shape: String, path: String },

    #[error("shape '{shape}': constraint '{constraint}' cannot apply to {field_type} field '{path}'")]
    IncompatibleConstraint {
        shape: String,
        path: String,
        constraint: &'static str,
        field_type: FieldType,
    },

    #[error("shape '{shape}': bound '{bound}' of '{constraint}' does not fit {field_type} field '{path}'")]
    InvalidBound {
        shape: String,
        path: String,
        constraint: &'static str,
        field_type: FieldType,
        bound: String,
    },

    #[error("shape '{shape}': invalid pattern on field '{path}': {source}")]
    InvalidPattern {
        shape: String,
        path: String,
        #[source]
        source: regex::Error,
    },

    #[error("shape '{shape}': array field '{path}' must declare `items`")]
    MissingItems { shape: String, path: String },

    #[error("shape '{shape}': refinement on '{target}' references unknown field '{field}'")]
    UnknownRefinementField {
        shape: String,
        target: String,
        field: String,
    },

    #[error("shape '{shape}': refinement cannot compare '{field}' ({left}) with '{other}' ({right})")]
    IncomparableFields {
        shape: String,
        field: String,
        left: FieldType,
        other: String,
        right: FieldType,
    },
}

/// Runtime shape: a checked definition with its patterns compiled
#[derive(Debug, Clone)]
pub struct Shape {
    pub name: String,
    pub label: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
    pub refinements: Vec<RefinementDef>,
    patterns: HashMap<String, Regex>,
}

impl TryFrom<ShapeFile> for Shape {
    type Error = ShapeError;

    fn try_from(file: ShapeFile) -> Result<Self, Self::Error> {
        let name = file.shape.name.trim().to_string();
        if name.is_empty() {
            return Err(ShapeError::EmptyName);
        }

        let mut checker = ShapeChecker {
            shape: &name,
            patterns: HashMap::new(),
        };
        checker.check_record("", &file.fields, &file.refinements)?;
        let patterns = checker.patterns;

        Ok(Self {
            name,
            label: file.shape.label,
            version: file.shape.version,
            description: file.shape.description,
            fields: file.fields,
            refinements: file.refinements,
            patterns,
        })
    }
}

impl Shape {
    /// Parse and check a shape from TOML
    pub fn from_toml(content: &str) -> Result<Self, ShapeError> {
        let file: ShapeFile = toml::from_str(content)?;
        Self::try_from(file)
    }

    /// Label for display, falling back to the name
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Find a top-level field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find the field definition governing a payload path.
    ///
    /// Numeric segments step into an array's `items` rule, so
    /// `items.3.quantity` resolves like `items.0.quantity`.
    pub fn field_at(&self, path: &str) -> Option<&FieldDef> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.field(first)?;

        for segment in segments {
            current = match current.field_type {
                FieldType::Array if segment.parse::<usize>().is_ok() => current.items.as_deref()?,
                FieldType::Object => current.fields.iter().find(|f| f.name == segment)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Compiled regex for a pattern declared somewhere in this shape
    pub fn pattern(&self, source: &str) -> Option<&Regex> {
        self.patterns.get(source)
    }
}

impl FieldDef {
    /// Label for messages, falling back to the field name
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

struct ShapeChecker<'a> {
    shape: &'a str,
    patterns: HashMap<String, Regex>,
}

impl ShapeChecker<'_> {
    fn check_record(
        &mut self,
        prefix: &str,
        fields: &[FieldDef],
        refinements: &[RefinementDef],
    ) -> Result<(), ShapeError> {
        let mut seen = HashSet::new();

        for field in fields {
            let path = join_path(prefix, &field.name);
            if field.name.trim().is_empty() {
                return Err(ShapeError::EmptyFieldName {
                    shape: self.shape.to_string(),
                    path: prefix.to_string(),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ShapeError::DuplicateField {
                    shape: self.shape.to_string(),
                    path,
                });
            }
            self.check_field(&path, field)?;
        }

        for refinement in refinements {
            self.check_refinement(prefix, fields, refinement)?;
        }

        Ok(())
    }

    fn check_field(&mut self, path: &str, field: &FieldDef) -> Result<(), ShapeError> {
        for constraint in &field.constraints {
            if !constraint.applies_to(field.field_type) {
                return Err(ShapeError::IncompatibleConstraint {
                    shape: self.shape.to_string(),
                    path: path.to_string(),
                    constraint: constraint.kind_name(),
                    field_type: field.field_type,
                });
            }

            if let Some(bound) = constraint.bound() {
                let fits = match (field.field_type, bound) {
                    (FieldType::Number, Bound::Number(_)) => true,
                    (FieldType::Date, Bound::Date(d)) => parse_date(d).is_some(),
                    _ => false,
                };
                if !fits {
                    return Err(ShapeError::InvalidBound {
                        shape: self.shape.to_string(),
                        path: path.to_string(),
                        constraint: constraint.kind_name(),
                        field_type: field.field_type,
                        bound: bound.to_string(),
                    });
                }
            }

            match constraint {
                Constraint::Pattern { regex, .. } => self.compile(path, regex)?,
                Constraint::Email { .. } => self.compile(path, EMAIL_PATTERN)?,
                _ => {}
            }
        }

        match field.field_type {
            FieldType::Object => self.check_record(path, &field.fields, &field.refinements),
            FieldType::Array => {
                let items = field.items.as_deref().ok_or_else(|| ShapeError::MissingItems {
                    shape: self.shape.to_string(),
                    path: path.to_string(),
                })?;
                self.check_field(&join_path(path, "0"), items)
            }
            _ => Ok(()),
        }
    }

    fn check_refinement(
        &self,
        prefix: &str,
        fields: &[FieldDef],
        refinement: &RefinementDef,
    ) -> Result<(), ShapeError> {
        let lookup = |name: &str| {
            fields
                .iter()
                .find(|f| f.name == name)
                .ok_or_else(|| ShapeError::UnknownRefinementField {
                    shape: self.shape.to_string(),
                    target: join_path(prefix, refinement.target()),
                    field: join_path(prefix, name),
                })
        };

        let [left, right] = refinement.operands();
        let left_def = lookup(left)?;
        let right_def = lookup(right)?;

        if let RefinementDef::Compare { field, other, .. } = refinement {
            let comparable = left_def.field_type == right_def.field_type
                && matches!(left_def.field_type, FieldType::Number | FieldType::Date);
            if !comparable {
                return Err(ShapeError::IncomparableFields {
                    shape: self.shape.to_string(),
                    field: join_path(prefix, field),
                    left: left_def.field_type,
                    other: join_path(prefix, other),
                    right: right_def.field_type,
                });
            }
        }

        Ok(())
    }

    fn compile(&mut self, path: &str, source: &str) -> Result<(), ShapeError> {
        if self.patterns.contains_key(source) {
            return Ok(());
        }
        let regex = Regex::new(source).map_err(|e| ShapeError::InvalidPattern {
            shape: self.shape.to_string(),
            path: path.to_string(),
            source: e,
        })?;
        self.patterns.insert(source.to_string(), regex);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT_TOML: &str = r#"
[shape]
name = "contract"
label = "العقد"

[[fields]]
name = "amount"
label = "المبلغ"
type = "number"
required = true
constraints = [
  { kind = "gt", value = 0, message = "المبلغ يجب أن يكون أكبر من صفر" },
  { kind = "max", value = 100000000 },
]

[[fields]]
name = "startDate"
type = "date"
required = true

[[fields]]
name = "endDate"
type = "date"
required = true

[[fields]]
name = "items"
type = "array"
items = { type = "object", fields = [ { name = "quantity", type = "number", required = true } ] }

[[refinements]]
kind = "compare"
field = "endDate"
op = "gt"
other = "startDate"
message = "تاريخ الانتهاء يجب أن يكون بعد تاريخ البدء"
"#;

    #[test]
    fn test_shape_from_toml() {
        let shape = Shape::from_toml(CONTRACT_TOML).expect("valid shape");
        assert_eq!(shape.name, "contract");
        assert_eq!(shape.display_name(), "العقد");
        assert_eq!(shape.fields.len(), 4);
        assert_eq!(shape.refinements.len(), 1);

        let amount = shape.field("amount").unwrap();
        assert!(amount.required);
        assert_eq!(amount.constraints[0].kind_name(), "gt");
        assert_eq!(amount.constraints[0].message(), Some("المبلغ يجب أن يكون أكبر من صفر"));
        assert_eq!(amount.constraints[1], Constraint::Max {
            value: Bound::Number(100000000.0),
            message: None,
        });
    }

    #[test]
    fn test_field_at_walks_array_items() {
        let shape = Shape::from_toml(CONTRACT_TOML).unwrap();
        let quantity = shape.field_at("items.7.quantity").unwrap();
        assert_eq!(quantity.name, "quantity");
        assert!(shape.field_at("items.quantity").is_none());
        assert!(shape.field_at("nope").is_none());
    }

    #[test]
    fn test_invalid_regex_rejected_at_load() {
        let toml = r#"
[shape]
name = "broken"

[[fields]]
name = "phone"
type = "string"
constraints = [ { kind = "pattern", regex = "^(05" } ]
"#;
        let err = Shape::from_toml(toml).unwrap_err();
        assert!(matches!(err, ShapeError::InvalidPattern { ref path, .. } if path == "phone"));
    }

    #[test]
    fn test_incompatible_constraint_rejected() {
        let toml = r#"
[shape]
name = "broken"

[[fields]]
name = "title"
type = "string"
constraints = [ { kind = "gt", value = 0 } ]
"#;
        let err = Shape::from_toml(toml).unwrap_err();
        assert!(matches!(err, ShapeError::IncompatibleConstraint { constraint: "gt", .. }));
    }

    #[test]
    fn test_number_bound_on_date_rejected() {
        let toml = r#"
[shape]
name = "broken"

[[fields]]
name = "dueDate"
type = "date"
constraints = [ { kind = "min", value = 5 } ]
"#;
        assert!(matches!(
            Shape::from_toml(toml).unwrap_err(),
            ShapeError::InvalidBound { .. }
        ));
    }

    #[test]
    fn test_unknown_refinement_field_rejected() {
        let toml = r#"
[shape]
name = "broken"

[[fields]]
name = "startDate"
type = "date"

[[refinements]]
kind = "compare"
field = "endDate"
op = "gt"
other = "startDate"
message = "x"
"#;
        let err = Shape::from_toml(toml).unwrap_err();
        assert!(matches!(err, ShapeError::UnknownRefinementField { ref field, .. } if field == "endDate"));
    }

    #[test]
    fn test_compare_requires_matching_types() {
        let toml = r#"
[shape]
name = "broken"

[[fields]]
name = "amount"
type = "number"

[[fields]]
name = "dueDate"
type = "date"

[[refinements]]
kind = "compare"
field = "amount"
op = "lt"
other = "dueDate"
message = "x"
"#;
        assert!(matches!(
            Shape::from_toml(toml).unwrap_err(),
            ShapeError::IncomparableFields { .. }
        ));
    }

    #[test]
    fn test_duplicate_and_missing_items_rejected() {
        let duplicate = r#"
[shape]
name = "broken"

[[fields]]
name = "title"
type = "string"

[[fields]]
name = "title"
type = "string"
"#;
        assert!(matches!(
            Shape::from_toml(duplicate).unwrap_err(),
            ShapeError::DuplicateField { .. }
        ));

        let no_items = r#"
[shape]
name = "broken"

[[fields]]
name = "phones"
type = "array"
"#;
        assert!(matches!(
            Shape::from_toml(no_items).unwrap_err(),
            ShapeError::MissingItems { .. }
        ));
    }

    #[test]
    fn test_compare_op_holds() {
        use std::cmp::Ordering;

        assert!(CompareOp::Gt.holds(Ordering::Greater));
        assert!(!CompareOp::Gt.holds(Ordering::Equal));
        assert!(CompareOp::Ge.holds(Ordering::Equal));
        assert!(CompareOp::Ne.holds(Ordering::Less));
    }
}
