//! Model definitions and the compiled [`DataModel`] that validates against them.

use crate::errors::{DataError, Result};
use crate::validator::{RequiredValidator, Rule, TypeValidator, ValidationResult, Validator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Date,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Date => "date",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    /// Filled in by `create_instance` when the key is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Rule>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.validators.push(rule);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToMany,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDefinition {
    pub name: String,
    pub kind: RelationKind,
    /// Id of the related model
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

/// Schema for one kind of persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    pub id: String,
    pub name: String,
    pub version: String,
    pub fields: Vec<FieldDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationDefinition>,
}

impl ModelDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Read a definition from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// One failed check, tied to the field it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Aggregated result of validating a whole document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(DataError::InvalidData {
                messages: self.messages(),
            })
        }
    }
}

struct CompiledField {
    definition: FieldDefinition,
    chain: Vec<Arc<dyn Validator>>,
}

impl CompiledField {
    fn run(&self, value: Option<&Value>) -> ValidationResult {
        let mut result = ValidationResult::ok();
        for validator in &self.chain {
            result.merge(validator.validate(value, &self.definition));
        }
        result
    }
}

/// A [`ModelDefinition`] with its validator chains built.
///
/// Each field runs `Required` (when flagged), then `Type`, then the declared
/// rules, then any custom validators, and every failure is reported.
pub struct DataModel {
    definition: ModelDefinition,
    fields: Vec<CompiledField>,
}

impl DataModel {
    pub fn new(definition: ModelDefinition) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(definition.fields.len());

        for field in &definition.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(DataError::Schema(format!("duplicate field '{}'", field.name)));
            }

            let mut chain: Vec<Arc<dyn Validator>> = Vec::new();
            if field.required {
                chain.push(Arc::new(RequiredValidator));
            }
            chain.push(Arc::new(TypeValidator));
            for rule in &field.validators {
                chain.push(rule.compile()?);
            }

            fields.push(CompiledField {
                definition: field.clone(),
                chain,
            });
        }

        debug!(model = %definition.id, fields = fields.len(), "Compiled data model");
        Ok(Self { definition, fields })
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    /// Append a custom validator to the end of a field's chain
    pub fn add_validator(&mut self, field: &str, validator: Arc<dyn Validator>) -> Result<()> {
        let compiled = self
            .fields
            .iter_mut()
            .find(|f| f.definition.name == field)
            .ok_or_else(|| DataError::Schema(format!("unknown field '{}'", field)))?;
        compiled.chain.push(validator);
        Ok(())
    }

    pub fn validate(&self, data: &Value) -> ValidationReport {
        let Some(object) = data.as_object() else {
            return ValidationReport {
                errors: vec![FieldError {
                    field: String::new(),
                    message: format!("{} must be an object", self.definition.name),
                }],
            };
        };

        let errors = self
            .fields
            .iter()
            .flat_map(|field| {
                let name = &field.definition.name;
                field
                    .run(object.get(name))
                    .errors
                    .into_iter()
                    .map(move |message| FieldError {
                        field: name.clone(),
                        message,
                    })
            })
            .collect();

        ValidationReport { errors }
    }

    /// Validate a single field value
    pub fn validate_field(&self, field: &str, value: Option<&Value>) -> Result<()> {
        let compiled = self
            .fields
            .iter()
            .find(|f| f.definition.name == field)
            .ok_or_else(|| DataError::Schema(format!("unknown field '{}'", field)))?;

        let result = compiled.run(value);
        if result.is_valid {
            Ok(())
        } else {
            Err(DataError::Validation {
                field: field.to_string(),
                messages: result.errors,
            })
        }
    }

    /// Validate, then fill defaults for absent keys. An explicit `null` is kept.
    pub fn create_instance(&self, data: Value) -> Result<Value> {
        self.validate(&data).into_result()?;

        let Value::Object(mut object) = data else {
            return Err(DataError::InvalidData {
                messages: vec![format!("{} must be an object", self.definition.name)],
            });
        };

        for field in &self.fields {
            if let Some(default) = &field.definition.default {
                if !object.contains_key(&field.definition.name) {
                    object.insert(field.definition.name.clone(), default.clone());
                }
            }
        }

        Ok(Value::Object(object))
    }

    /// Fresh instance made only of defaults
    pub fn defaults(&self) -> Value {
        let object: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|f| {
                f.definition
                    .default
                    .clone()
                    .map(|d| (f.definition.name.clone(), d))
            })
            .collect();
        Value::Object(object)
    }
}

impl fmt::Debug for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataModel")
            .field("id", &self.definition.id)
            .field("fields", &self.fields.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationResult;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn user_model() -> DataModel {
        DataModel::new(
            ModelDefinition::new("user", "User", "1.0.0")
                .field(
                    FieldDefinition::new("name", FieldType::String)
                        .required()
                        .with_rule(Rule::MinLength { value: 2 }),
                )
                .field(
                    FieldDefinition::new("age", FieldType::Number).with_rule(Rule::Range {
                        min: Some(0.0),
                        max: None,
                    }),
                )
                .field(FieldDefinition::new("role", FieldType::String).with_default(json!("viewer")))
                .field(FieldDefinition::new("tags", FieldType::Array).with_default(json!([]))),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_aggregates_all_errors() {
        let report = user_model().validate(&json!({ "name": "A", "age": -3, "tags": "x" }));

        assert_eq!(
            report.messages(),
            vec![
                "name must have at least 2 characters or items",
                "age must be at least 0",
                "tags must be of type array",
            ]
        );
    }

    #[test]
    fn test_missing_required_reports_once() {
        let report = user_model().validate(&json!({}));
        assert_eq!(report.messages(), vec!["name is required"]);
    }

    #[test]
    fn test_create_instance_fills_only_absent_keys() {
        let instance = user_model()
            .create_instance(json!({ "name": "Ada", "role": null }))
            .unwrap();

        assert_eq!(instance, json!({ "name": "Ada", "role": null, "tags": [] }));
    }

    #[test]
    fn test_create_instance_rejects_invalid() {
        let err = user_model().create_instance(json!({ "age": "old" })).unwrap_err();
        match err {
            DataError::InvalidData { messages } => assert_eq!(messages.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_field_reports_field_error() {
        let err = user_model()
            .validate_field("name", Some(&json!(5)))
            .unwrap_err();
        assert!(matches!(err, DataError::Validation { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_custom_validator_runs_last() {
        #[derive(Debug)]
        struct NoAdmins;
        impl Validator for NoAdmins {
            fn validate(&self, value: Option<&Value>, _: &FieldDefinition) -> ValidationResult {
                if value == Some(&json!("admin")) {
                    ValidationResult::fail("admins are managed elsewhere")
                } else {
                    ValidationResult::ok()
                }
            }
        }

        let mut model = user_model();
        model.add_validator("role", Arc::new(NoAdmins)).unwrap();
        assert!(model.add_validator("missing", Arc::new(NoAdmins)).is_err());

        let report = model.validate(&json!({ "name": "Ada", "role": "admin" }));
        assert_eq!(report.messages(), vec!["admins are managed elsewhere"]);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let definition = ModelDefinition::new("m", "M", "1.0.0")
            .field(FieldDefinition::new("a", FieldType::String))
            .field(FieldDefinition::new("a", FieldType::Number));
        assert!(matches!(DataModel::new(definition), Err(DataError::Schema(_))));
    }

    #[test]
    fn test_definition_from_json() {
        let definition: ModelDefinition = serde_json::from_value(json!({
            "id": "post",
            "name": "Post",
            "version": "1.0.0",
            "fields": [
                { "name": "title", "type": "string", "required": true,
                  "validators": [{ "type": "maxLength", "value": 80 }] },
                { "name": "publishedAt", "type": "date" }
            ],
            "indexes": [{ "name": "by_title", "fields": ["title"], "unique": true }],
            "relations": [{ "name": "author", "kind": "manyToMany", "target": "user" }]
        }))
        .unwrap();

        let model = DataModel::new(definition).unwrap();
        assert!(model.validate(&json!({ "title": "Hi", "publishedAt": "2024-01-02" })).is_valid());
        assert_eq!(model.definition().relations[0].kind, RelationKind::ManyToMany);
    }
}
