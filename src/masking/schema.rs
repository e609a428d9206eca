//! Schema documents with per-field sensitivity annotations.
//!
//! A schema is a tree of named fields. Leaf fields may carry an integer
//! `sensitivity_level` and/or a string `sensitivity_category`; record fields
//! carry their own nested `fields` list. Annotations are validated here, once,
//! so that mask compilation never fails per message.

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SchemaError;

/// Field names retained regardless of rank when a schema does not say otherwise.
pub const DEFAULT_IDENTITY_FIELDS: &[&str] = &["id"];

/// Declared sensitivity of a single field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sensitivity {
    /// Numeric level (`sensitivity_level`).
    pub level: Option<u32>,
    /// Category label (`sensitivity_category`).
    pub category: Option<String>,
}

impl Sensitivity {
    /// Unannotated fields are always emitted.
    pub fn is_annotated(&self) -> bool {
        self.level.is_some() || self.category.is_some()
    }
}

/// One field definition in a schema tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub sensitivity: Sensitivity,
    /// Child fields for record-typed fields; empty for leaves.
    pub fields: Vec<FieldDef>,
}

impl FieldDef {
    pub fn is_record(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// A parsed, validated schema. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Schema {
    name: Option<String>,
    identity_fields: Vec<String>,
    fields: Vec<FieldDef>,
    fingerprint: u64,
}

#[derive(Deserialize)]
struct RawSchema {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    identity_fields: Option<Vec<String>>,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawField {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sensitivity_level: Option<Value>,
    #[serde(default)]
    sensitivity_category: Option<Value>,
    #[serde(default)]
    fields: Option<Vec<RawField>>,
}

impl Schema {
    /// Parse and validate a schema document.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        if !value.is_object() {
            return Err(SchemaError::Malformed(format!(
                "expected a JSON object, got {}",
                json_kind(value)
            )));
        }
        let raw = RawSchema::deserialize(value)?;
        let fields = convert_fields(raw.fields, "$")?;
        let identity_fields = raw.identity_fields.unwrap_or_else(|| {
            DEFAULT_IDENTITY_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

        // serde_json maps are ordered, so the canonical text is stable.
        let canonical = serde_json::to_string(value)?;
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);

        Ok(Self {
            name: raw.name,
            identity_fields,
            fields,
            fingerprint: hasher.finish(),
        })
    }

    /// Parse a schema from JSON text.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Load a schema document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Top-level fields retained at every emit level.
    pub fn identity_fields(&self) -> &[String] {
        &self.identity_fields
    }

    /// Stable hash of the source document, used to cache compiled masks.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

fn convert_fields(raw: Vec<RawField>, path: &str) -> Result<Vec<FieldDef>, SchemaError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for (idx, field) in raw.into_iter().enumerate() {
        let name = match field.name {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(SchemaError::MissingName {
                    path: format!("{path}[{idx}]"),
                });
            }
        };
        if !seen.insert(name.clone()) {
            return Err(SchemaError::DuplicateField {
                path: path.to_string(),
                field: name,
            });
        }

        let field_path = format!("{path}.{name}");
        let level = match field.sensitivity_level {
            None | Some(Value::Null) => None,
            Some(ref v) => Some(parse_level(v).ok_or_else(|| SchemaError::InvalidLevel {
                field: field_path.clone(),
                found: v.to_string(),
            })?),
        };
        let category = match field.sensitivity_category {
            None | Some(Value::Null) => None,
            Some(Value::String(label)) => Some(label),
            Some(other) => {
                return Err(SchemaError::InvalidCategory {
                    field: field_path,
                    found: other.to_string(),
                });
            }
        };

        let fields = match field.fields {
            Some(children) => convert_fields(children, &field_path)?,
            None => Vec::new(),
        };

        out.push(FieldDef {
            name,
            sensitivity: Sensitivity { level, category },
            fields,
        });
    }

    Ok(out)
}

fn parse_level(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_levels_and_categories() {
        let schema = Schema::from_value(&json!({
            "name": "Person",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "name", "type": "string", "sensitivity_level": 2},
                {"name": "dob", "type": "string", "sensitivity_category": "secret"}
            ]
        }))
        .unwrap();

        assert_eq!(schema.name(), Some("Person"));
        assert_eq!(schema.fields().len(), 3);
        assert!(!schema.fields()[0].sensitivity.is_annotated());
        assert_eq!(schema.fields()[1].sensitivity.level, Some(2));
        assert_eq!(
            schema.fields()[2].sensitivity.category.as_deref(),
            Some("secret")
        );
        assert_eq!(schema.identity_fields(), &["id".to_string()]);
    }

    #[test]
    fn nested_records_keep_their_own_annotations() {
        let schema = Schema::from_value(&json!({
            "fields": [
                {"name": "address", "type": "record", "sensitivity_level": 5, "fields": [
                    {"name": "city"},
                    {"name": "street", "sensitivity_level": 3}
                ]}
            ]
        }))
        .unwrap();

        let address = &schema.fields()[0];
        assert!(address.is_record());
        assert!(!address.fields[0].sensitivity.is_annotated());
        assert_eq!(address.fields[1].sensitivity.level, Some(3));
    }

    #[test]
    fn rejects_string_level() {
        let err = Schema::from_value(&json!({
            "fields": [{"name": "x", "sensitivity_level": "high"}]
        }))
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidLevel { ref field, .. } if field == "$.x"));
    }

    #[test]
    fn rejects_negative_and_fractional_levels() {
        for level in [json!(-1), json!(1.5)] {
            let err = Schema::from_value(&json!({
                "fields": [{"name": "x", "sensitivity_level": level}]
            }))
            .unwrap_err();
            assert!(matches!(err, SchemaError::InvalidLevel { .. }));
        }
    }

    #[test]
    fn rejects_numeric_category() {
        let err = Schema::from_value(&json!({
            "fields": [{"name": "x", "sensitivity_category": 3}]
        }))
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidCategory { .. }));
    }

    #[test]
    fn rejects_nameless_and_duplicate_fields() {
        let err = Schema::from_value(&json!({"fields": [{"type": "string"}]})).unwrap_err();
        assert!(matches!(err, SchemaError::MissingName { .. }));

        let err =
            Schema::from_value(&json!({"fields": [{"name": "a"}, {"name": "a"}]})).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn rejects_non_object_document() {
        let err = Schema::from_value(&json!(["a"])).unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }

    #[test]
    fn null_annotations_count_as_absent() {
        let schema = Schema::from_value(&json!({
            "fields": [{"name": "x", "sensitivity_level": null, "sensitivity_category": null}]
        }))
        .unwrap();
        assert!(!schema.fields()[0].sensitivity.is_annotated());
    }

    #[test]
    fn fingerprint_is_stable_for_equal_documents() {
        let doc = json!({"fields": [{"name": "a", "sensitivity_level": 1}]});
        let a = Schema::from_value(&doc).unwrap();
        let b = Schema::from_json(&doc.to_string()).unwrap();
        let c = Schema::from_value(&json!({"fields": [{"name": "a"}]})).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"identity_fields": ["id", "_rev"], "fields": [{"name": "id"}, {"name": "_rev"}]}"#,
        )
        .unwrap();

        let schema = Schema::from_path(&path).unwrap();
        assert_eq!(schema.identity_fields().len(), 2);

        let missing = Schema::from_path(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, SchemaError::Io(_)));
    }
}
