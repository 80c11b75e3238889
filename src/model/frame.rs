//! Result frames
//!
//! Column-oriented result tables returned by the backend, and the
//! label/value pairs a selection list is built from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::FieldType;

/// A column-oriented result table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl DataFrame {
    pub fn new(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: Some(ref_id.into()),
            name: None,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Number of rows (length of the longest field)
    pub fn len(&self) -> usize {
        self.fields.iter().map(|f| f.values.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One column of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            field_type,
            values,
        }
    }

    /// String column helper
    pub fn strings<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldType::String,
            values.into_iter().map(|v| Value::String(v.into())).collect(),
        )
    }
}

/// A single entry of a selection list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFindValue {
    pub text: String,
    pub value: String,
}

impl MetricFindValue {
    pub fn new(text: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            value: value.into(),
        }
    }
}
