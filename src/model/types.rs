//! Core query types
//!
//! This module contains the values that flow through the rewrite pipeline:
//! - `Query`: one dashboard target addressed at a database collection
//! - `TimeRange`: the dashboard's `from`/`to` instants
//! - `ScopedVars`: per-request template variable bindings

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single dashboard target
///
/// The aggregation text is opaque here: it is only ever rewritten as a
/// string and parsed by the backend once executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Identifier tying responses back to this target
    pub ref_id: String,
    #[serde(default)]
    pub hide: bool,
    #[serde(default)]
    pub query_type: QueryType,
    /// Target database name (may contain variable references)
    #[serde(default)]
    pub database: Option<String>,
    /// Target collection name (may contain variable references)
    #[serde(default)]
    pub collection: Option<String>,
    /// Raw aggregation pipeline text (may contain variables and time macros)
    #[serde(default)]
    pub aggregation: Option<String>,
    #[serde(default)]
    pub auto_time_bound: bool,
    #[serde(default)]
    pub auto_time_sort: bool,
    #[serde(default)]
    pub timestamp_field: Option<String>,
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default)]
    pub label_fields: Vec<String>,
    #[serde(default)]
    pub value_fields: Vec<String>,
    #[serde(default)]
    pub value_field_types: Vec<FieldType>,
    #[serde(default)]
    pub schema_inference: bool,
    #[serde(default)]
    pub schema_inference_depth: u32,
}

impl Query {
    /// Create an empty time series target
    pub fn new(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            hide: false,
            query_type: QueryType::Timeseries,
            database: None,
            collection: None,
            aggregation: None,
            auto_time_bound: false,
            auto_time_sort: false,
            timestamp_field: None,
            timestamp_format: None,
            label_fields: Vec::new(),
            value_fields: Vec::new(),
            value_field_types: Vec::new(),
            schema_inference: false,
            schema_inference_depth: 0,
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn aggregation(mut self, aggregation: impl Into<String>) -> Self {
        self.aggregation = Some(aggregation.into());
        self
    }

    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }

    pub fn timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = Some(field.into());
        self
    }

    /// Add a value field with its declared type
    pub fn value_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.value_fields.push(name.into());
        self.value_field_types.push(field_type);
        self
    }

    pub fn label_field(mut self, name: impl Into<String>) -> Self {
        self.label_fields.push(name.into());
        self
    }
}

/// How the backend should shape the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryType {
    #[default]
    Timeseries,
    /// Rows are returned as-is, e.g. to populate a selection list
    Table,
}

/// Declared type of a value field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int32,
    Int64,
    Float64,
    String,
    Bool,
    Date,
}

impl FieldType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "int32" | "int" => Some(Self::Int32),
            "int64" | "long" => Some(Self::Int64),
            "float64" | "double" | "number" => Some(Self::Float64),
            "string" => Some(Self::String),
            "bool" | "boolean" => Some(Self::Bool),
            "date" | "time" => Some(Self::Date),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Date => "date",
        };
        f.write_str(name)
    }
}

/// Dashboard time range
///
/// `from <= to` is expected but not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Create a range from epoch milliseconds, returning None if either
    /// bound is outside the representable calendar
    pub fn from_millis(from: i64, to: i64) -> Option<Self> {
        Some(Self {
            from: Utc.timestamp_millis_opt(from).single()?,
            to: Utc.timestamp_millis_opt(to).single()?,
        })
    }

    /// Create a range for the last N hours from now
    ///
    /// Returns None for a negative span or one reaching past the
    /// representable calendar.
    pub fn last_hours(hours: i64) -> Option<Self> {
        if hours < 0 {
            return None;
        }
        let to = Utc::now();
        let from = to.checked_sub_signed(Duration::try_hours(hours)?)?;
        Some(Self { from, to })
    }

    pub fn from_epoch_millis(&self) -> i64 {
        self.from.timestamp_millis()
    }

    pub fn to_epoch_millis(&self) -> i64 {
        self.to.timestamp_millis()
    }
}

/// Per-request variable bindings, keyed by variable name
pub type ScopedVars = BTreeMap<String, ScopedVar>;

/// A single scoped variable binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedVar {
    /// Display text
    #[serde(default)]
    pub text: String,
    /// Substituted value
    pub value: VariableValue,
}

impl ScopedVar {
    pub fn single(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            text: value.clone(),
            value: VariableValue::Single(value),
        }
    }

    pub fn multi<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        Self {
            text: values.join(" + "),
            value: VariableValue::Multi(values),
        }
    }
}

/// Value of a template variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

impl VariableValue {
    /// All values, a single value being a one element slice
    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Multi(vs) => vs,
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for VariableValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_wire_names() {
        let json = r#"{
            "refId": "A",
            "queryType": "Table",
            "database": "metrics",
            "collection": "events",
            "aggregation": "[]",
            "autoTimeBound": true,
            "valueFields": ["count"],
            "valueFieldTypes": ["int64"],
            "schemaInferenceDepth": 20
        }"#;
        let query: Query = serde_json::from_str(json).unwrap();

        assert_eq!(query.ref_id, "A");
        assert_eq!(query.query_type, QueryType::Table);
        assert_eq!(query.collection.as_deref(), Some("events"));
        assert!(query.auto_time_bound);
        assert!(!query.auto_time_sort);
        assert_eq!(query.value_field_types, vec![FieldType::Int64]);
        assert_eq!(query.schema_inference_depth, 20);
        assert!(query.timestamp_field.is_none());
    }

    #[test]
    fn test_time_range_from_millis() {
        let range = TimeRange::from_millis(1_609_459_200_000, 1_609_545_600_000).unwrap();
        assert_eq!(range.from.to_rfc3339(), "2021-01-01T00:00:00+00:00");
        assert_eq!(range.to_epoch_millis(), 1_609_545_600_000);

        assert!(TimeRange::from_millis(i64::MAX, 0).is_none());
    }

    #[test]
    fn test_last_hours() {
        let range = TimeRange::last_hours(6).unwrap();
        assert_eq!(range.to - range.from, Duration::hours(6));

        let empty = TimeRange::last_hours(0).unwrap();
        assert_eq!(empty.from, empty.to);
    }

    #[test]
    fn test_last_hours_out_of_range() {
        assert!(TimeRange::last_hours(-1).is_none());
        assert!(TimeRange::last_hours(i64::MAX / 1000).is_none());
        assert!(TimeRange::last_hours(i64::MAX).is_none());
    }

    #[test]
    fn test_variable_value_untagged() {
        let single: VariableValue = serde_json::from_str(r#""prod""#).unwrap();
        assert_eq!(single, VariableValue::Single("prod".to_string()));

        let multi: VariableValue = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(multi.values(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_field_type_from_str() {
        assert_eq!(FieldType::from_str("STRING"), Some(FieldType::String));
        assert_eq!(FieldType::from_str("double"), Some(FieldType::Float64));
        assert_eq!(FieldType::from_str("decimal"), None);
        assert_eq!(FieldType::Int32.to_string(), "int32");
    }
}
