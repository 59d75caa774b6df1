//! Field validators.
//!
//! Every validator receives `None` for an absent key and `Some(Value::Null)`
//! for an explicit null. Only [`RequiredValidator`] treats either as a
//! failure; the rest skip them so a missing value is reported once.

use crate::errors::{DataError, Result};
use crate::model::{FieldDefinition, FieldType};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Outcome of running one or more validators
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![message.into()],
        }
    }

    /// Fold another result into this one, keeping every message
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
    }
}

pub trait Validator: Send + Sync + fmt::Debug {
    fn validate(&self, value: Option<&Value>, field: &FieldDefinition) -> ValidationResult;
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredValidator;

impl Validator for RequiredValidator {
    fn validate(&self, value: Option<&Value>, field: &FieldDefinition) -> ValidationResult {
        match present(value) {
            Some(_) => ValidationResult::ok(),
            None => ValidationResult::fail(format!("{} is required", field.name)),
        }
    }
}

/// Checks the value against the field's declared [`FieldType`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeValidator;

impl TypeValidator {
    fn matches(field_type: FieldType, value: &Value) -> bool {
        match field_type {
            FieldType::String => value.is_string(),
            FieldType::Number => value.as_f64().is_some_and(f64::is_finite),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::Date => match value {
                Value::String(s) => parse_instant(s),
                Value::Number(n) => n.as_i64().is_some(),
                _ => false,
            },
        }
    }
}

/// RFC 3339 timestamps, naive date-times and plain dates all count as instants
fn parse_instant(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

impl Validator for TypeValidator {
    fn validate(&self, value: Option<&Value>, field: &FieldDefinition) -> ValidationResult {
        match present(value) {
            Some(v) if !Self::matches(field.field_type, v) => ValidationResult::fail(format!(
                "{} must be of type {}",
                field.name, field.field_type
            )),
            _ => ValidationResult::ok(),
        }
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinLengthValidator(pub usize);

impl Validator for MinLengthValidator {
    fn validate(&self, value: Option<&Value>, field: &FieldDefinition) -> ValidationResult {
        match present(value).and_then(length_of) {
            Some(len) if len < self.0 => ValidationResult::fail(format!(
                "{} must have at least {} characters or items",
                field.name, self.0
            )),
            _ => ValidationResult::ok(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaxLengthValidator(pub usize);

impl Validator for MaxLengthValidator {
    fn validate(&self, value: Option<&Value>, field: &FieldDefinition) -> ValidationResult {
        match present(value).and_then(length_of) {
            Some(len) if len > self.0 => ValidationResult::fail(format!(
                "{} must have at most {} characters or items",
                field.name, self.0
            )),
            _ => ValidationResult::ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Validator for RangeValidator {
    fn validate(&self, value: Option<&Value>, field: &FieldDefinition) -> ValidationResult {
        let Some(n) = present(value).and_then(Value::as_f64) else {
            return ValidationResult::ok();
        };

        let mut result = ValidationResult::ok();
        if let Some(min) = self.min.filter(|min| n < *min) {
            result.merge(ValidationResult::fail(format!(
                "{} must be at least {}",
                field.name, min
            )));
        }
        if let Some(max) = self.max.filter(|max| n > *max) {
            result.merge(ValidationResult::fail(format!(
                "{} must be at most {}",
                field.name, max
            )));
        }
        result
    }
}

#[derive(Debug, Clone)]
pub struct PatternValidator {
    regex: Regex,
}

impl PatternValidator {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| DataError::Schema(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self { regex })
    }
}

impl Validator for PatternValidator {
    fn validate(&self, value: Option<&Value>, field: &FieldDefinition) -> ValidationResult {
        match present(value).and_then(Value::as_str) {
            Some(s) if !self.regex.is_match(s) => ValidationResult::fail(format!(
                "{} does not match pattern {}",
                field.name,
                self.regex.as_str()
            )),
            _ => ValidationResult::ok(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OneOfValidator(pub Vec<Value>);

impl Validator for OneOfValidator {
    fn validate(&self, value: Option<&Value>, field: &FieldDefinition) -> ValidationResult {
        match present(value) {
            Some(v) if !self.0.contains(v) => ValidationResult::fail(format!(
                "{} must be one of {}",
                field.name,
                Value::Array(self.0.clone())
            )),
            _ => ValidationResult::ok(),
        }
    }
}

/// Declarative validator as written in a model definition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Rule {
    MinLength { value: usize },
    MaxLength { value: usize },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Pattern { pattern: String },
    OneOf { values: Vec<Value> },
}

impl Rule {
    pub fn compile(&self) -> Result<Arc<dyn Validator>> {
        Ok(match self {
            Rule::MinLength { value } => Arc::new(MinLengthValidator(*value)),
            Rule::MaxLength { value } => Arc::new(MaxLengthValidator(*value)),
            Rule::Range { min, max } => Arc::new(RangeValidator {
                min: *min,
                max: *max,
            }),
            Rule::Pattern { pattern } => Arc::new(PatternValidator::new(pattern)?),
            Rule::OneOf { values } => Arc::new(OneOfValidator(values.clone())),
        })
    }
}
