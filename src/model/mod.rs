//! Query data model
//!
//! Plain data carried through the rewrite pipeline:
//!
//! - **types**: targets, time ranges and scoped variables
//! - **request**: request/response envelopes exchanged with the executor
//! - **frame**: result frames and selection-list entries
//!
//! Every value here is constructed per request and never mutated in place
//! by the rewrite steps; each step returns a new value.

mod frame;
mod request;
mod types;

pub use frame::{DataFrame, Field, MetricFindValue};
pub use request::{
    QueryRequest, QueryResponse, RequestOptions, ResponseError, VariableQuery,
    DEFAULT_RANGE_HOURS,
};
pub use types::{FieldType, Query, QueryType, ScopedVar, ScopedVars, TimeRange, VariableValue};
