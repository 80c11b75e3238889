//! Request and response envelopes
//!
//! A `QueryRequest` carries every target of one panel refresh together with
//! the shared time range and scoped variables. The executor answers with a
//! stream of `QueryResponse` batches.

use serde::{Deserialize, Serialize};

use super::frame::DataFrame;
use super::types::{FieldType, Query, ScopedVars, TimeRange};

/// Default range used when a caller supplies none
pub const DEFAULT_RANGE_HOURS: i64 = 6;

/// A batch of targets sharing one time range and variable scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub request_id: String,
    pub range: TimeRange,
    #[serde(default)]
    pub scoped_vars: ScopedVars,
    pub targets: Vec<Query>,
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub max_data_points: Option<u64>,
    /// Dashboard time zone name, forwarded to the backend untouched
    #[serde(default)]
    pub timezone: Option<String>,
}

impl QueryRequest {
    pub fn new(request_id: impl Into<String>, range: TimeRange, targets: Vec<Query>) -> Self {
        Self {
            request_id: request_id.into(),
            range,
            scoped_vars: ScopedVars::new(),
            targets,
            interval_ms: None,
            max_data_points: None,
            timezone: None,
        }
    }

    /// Build a request from caller options, filling gaps with defaults
    ///
    /// `default_request_id` and `default_range_hours` apply only when the
    /// options leave those fields unset. Returns None when the default range
    /// is needed but cannot be represented (see [`TimeRange::last_hours`]).
    pub fn from_options(
        options: RequestOptions,
        targets: Vec<Query>,
        default_request_id: impl Into<String>,
        default_range_hours: i64,
    ) -> Option<Self> {
        let range = match options.range {
            Some(range) => range,
            None => TimeRange::last_hours(default_range_hours)?,
        };

        Some(Self {
            request_id: options
                .request_id
                .unwrap_or_else(|| default_request_id.into()),
            range,
            scoped_vars: options.scoped_vars.unwrap_or_default(),
            targets,
            interval_ms: options.interval_ms,
            max_data_points: options.max_data_points,
            timezone: options.timezone,
        })
    }

    pub fn scoped_vars(mut self, scoped_vars: ScopedVars) -> Self {
        self.scoped_vars = scoped_vars;
        self
    }
}

/// Caller-supplied request fields, all optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub range: Option<TimeRange>,
    #[serde(default)]
    pub scoped_vars: Option<ScopedVars>,
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub max_data_points: Option<u64>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl RequestOptions {
    pub fn range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn scoped_vars(mut self, scoped_vars: ScopedVars) -> Self {
        self.scoped_vars = Some(scoped_vars);
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// One batch emitted by the executor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Vec<DataFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl QueryResponse {
    pub fn frames(data: Vec<DataFrame>) -> Self {
        Self {
            data,
            error: None,
            key: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            error: Some(ResponseError::new(message)),
            key: None,
        }
    }
}

/// Error descriptor carried by a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ResponseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ref_id: None,
            status: None,
        }
    }
}

/// Definition of a "list distinct values" dashboard variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableQuery {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub aggregation: Option<String>,
    /// Field whose values populate the list
    pub field_name: String,
    pub field_type: FieldType,
}

impl VariableQuery {
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            database: None,
            collection: None,
            aggregation: None,
            field_name: field_name.into(),
            field_type,
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
}
