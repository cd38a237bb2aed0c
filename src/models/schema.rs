//! Company post-field schema model.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input type of a custom field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Select {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
    Checkbox,
}

/// One custom field definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

/// Ordered field definitions for a company.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFieldSchema {
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

/// Field definition as submitted by the schema builder, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSchemaField {
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub label: Option<Value>,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub required: Option<Value>,
    #[serde(default)]
    pub options: Option<Vec<Value>>,
    #[serde(default)]
    pub placeholder: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSchema {
    #[serde(default)]
    pub fields: Vec<RawSchemaField>,
}

/// Request body for saving a schema.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveSchemaRequest {
    pub schema: Option<RawSchema>,
}

/// Stored schema as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySchema {
    pub company_id: String,
    pub schema: PostFieldSchema,
    pub updated_at: Option<String>,
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl RawSchema {
    /// Normalize submitted fields: trim keys, drop empty and repeated keys
    /// (first occurrence wins), default labels and types, clean options.
    pub fn normalize(&self) -> PostFieldSchema {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();

        for raw in &self.fields {
            let key = raw
                .key
                .as_ref()
                .and_then(value_to_string)
                .map(|k| k.trim().to_string())
                .unwrap_or_default();
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }

            let label = raw
                .label
                .as_ref()
                .and_then(value_to_string)
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| key.clone());

            let kind = match raw.field_type.as_deref().map(str::trim) {
                Some("number") => FieldKind::Number,
                Some("checkbox") => FieldKind::Checkbox,
                Some("select") => FieldKind::Select {
                    options: raw
                        .options
                        .iter()
                        .flatten()
                        .filter_map(value_to_string)
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect(),
                },
                _ => FieldKind::Text,
            };

            let placeholder = raw
                .placeholder
                .as_ref()
                .and_then(value_to_string)
                .filter(|p| !p.is_empty());

            fields.push(SchemaField {
                key,
                label,
                kind,
                required: raw.required.as_ref().is_some_and(truthy),
                placeholder,
            });
        }

        PostFieldSchema { fields }
    }
}

impl PostFieldSchema {
    /// Keys of required fields that are absent or blank in `data`.
    pub fn missing_required(&self, data: &serde_json::Map<String, Value>) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .filter(|f| match data.get(&f.key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                // an unchecked required checkbox is still an answer
                Some(_) => false,
            })
            .map(|f| f.key.clone())
            .collect()
    }
}
