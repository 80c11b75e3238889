//! Variable Queries
//!
//! Populates dashboard selection lists from a "list distinct values"
//! definition. A single table-shaped target is built, run once through the
//! orchestrator, and the first result frame is turned into label/value
//! pairs.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;

use crate::model::{
    DataFrame, Field, FieldType, MetricFindValue, Query, QueryRequest, QueryType, RequestOptions,
    VariableQuery, DEFAULT_RANGE_HOURS,
};
use crate::query::error::{QueryError, QueryResult};
use crate::query::orchestrator::QueryOrchestrator;

/// `ref_id` of the synthetic target
pub const METRIC_FIND_REF_ID: &str = "metricFindQuery";

/// Turns a result frame into selection-list entries
pub trait FrameConverter: Send + Sync {
    fn to_value_list(&self, frame: &DataFrame) -> Vec<MetricFindValue>;
}

/// Labels from the first string column (or first non-date column); values
/// from a column named `value` when one of matching length exists
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFieldConverter;

impl FrameConverter for FirstFieldConverter {
    fn to_value_list(&self, frame: &DataFrame) -> Vec<MetricFindValue> {
        let label_field = frame
            .fields
            .iter()
            .find(|f| f.field_type == FieldType::String)
            .or_else(|| frame.fields.iter().find(|f| f.field_type != FieldType::Date));

        let Some(label_field) = label_field else {
            return Vec::new();
        };

        let value_field = frame.fields.iter().find(|f| {
            f.name == "value"
                && !std::ptr::eq(*f, label_field)
                && f.values.len() == label_field.values.len()
        });

        label_field
            .values
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let text = value_text(label);
                let value = value_field
                    .map(|f: &Field| value_text(&f.values[i]))
                    .unwrap_or_else(|| text.clone());
                MetricFindValue { text, value }
            })
            .collect()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Anything that can answer a variable query
#[async_trait]
pub trait MetricFindSource: Send + Sync {
    async fn metric_find_query(
        &self,
        query: &VariableQuery,
        options: Option<RequestOptions>,
    ) -> QueryResult<Vec<MetricFindValue>>;
}

/// Runs variable queries through a [`QueryOrchestrator`]
#[derive(Clone)]
pub struct VariableQueryAdapter {
    orchestrator: Arc<QueryOrchestrator>,
    converter: Arc<dyn FrameConverter>,
    default_range_hours: i64,
}

impl VariableQueryAdapter {
    pub fn new(orchestrator: Arc<QueryOrchestrator>) -> Self {
        Self {
            orchestrator,
            converter: Arc::new(FirstFieldConverter),
            default_range_hours: DEFAULT_RANGE_HOURS,
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn FrameConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Range used when the caller's options carry none
    pub fn with_default_range_hours(mut self, hours: i64) -> Self {
        self.default_range_hours = hours;
        self
    }

    /// Build the single-target request for a variable query
    ///
    /// Fails with [`QueryError::InvalidRequest`] when the options carry no
    /// range and the default span cannot be represented.
    pub fn build_request(
        &self,
        query: &VariableQuery,
        options: Option<RequestOptions>,
    ) -> QueryResult<QueryRequest> {
        let target = Query {
            database: query.database.clone(),
            collection: query.collection.clone(),
            aggregation: query.aggregation.clone(),
            auto_time_bound: false,
            auto_time_sort: false,
            schema_inference: false,
            ..Query::new(METRIC_FIND_REF_ID)
                .query_type(QueryType::Table)
                .value_field(query.field_name.clone(), query.field_type)
        };

        QueryRequest::from_options(
            options.unwrap_or_default(),
            vec![target],
            format!("{}-{}", METRIC_FIND_REF_ID, uuid::Uuid::new_v4()),
            self.default_range_hours,
        )
        .ok_or_else(|| {
            QueryError::InvalidRequest(format!(
                "default range of {} hours cannot be represented",
                self.default_range_hours
            ))
        })
    }

    /// Run a variable query and return its selection list
    ///
    /// Only the first emitted response is awaited. An error descriptor
    /// fails the call with its message; a response without frames (or a
    /// stream that ends without emitting) yields an empty list.
    pub async fn list_values(
        &self,
        query: &VariableQuery,
        options: Option<RequestOptions>,
    ) -> QueryResult<Vec<MetricFindValue>> {
        let request = self.build_request(query, options)?;
        let request_id = request.request_id.clone();

        let mut responses = self.orchestrator.run(request)?;
        let Some(response) = responses.next().await else {
            tracing::debug!(request_id = %request_id, "variable query produced no response");
            return Ok(Vec::new());
        };

        if let Some(error) = response.error {
            tracing::warn!(
                request_id = %request_id,
                error = %error.message,
                "variable query failed"
            );
            return Err(QueryError::Backend(error.message));
        }

        let values = response
            .data
            .first()
            .map(|frame| self.converter.to_value_list(frame))
            .unwrap_or_default();

        tracing::debug!(request_id = %request_id, values = values.len(), "variable query complete");
        Ok(values)
    }
}

#[async_trait]
impl MetricFindSource for VariableQueryAdapter {
    async fn metric_find_query(
        &self,
        query: &VariableQuery,
        options: Option<RequestOptions>,
    ) -> QueryResult<Vec<MetricFindValue>> {
        self.list_values(query, options).await
    }
}

impl std::fmt::Debug for VariableQueryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableQueryAdapter")
            .field("orchestrator", &self.orchestrator)
            .field("default_range_hours", &self.default_range_hours)
            .finish_non_exhaustive()
    }
}
