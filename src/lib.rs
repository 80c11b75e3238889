//! # docdb-query
//!
//! Query rewriting for a document-database dashboard connector. Before a
//! dashboard target is executed its text is turned into a concrete query by
//! substituting template variables and expanding time-range macros.
//!
//! ## Features
//!
//! - **Time macros**: `{{ __time_from:date }}` and friends, rendered as
//!   ISO-8601, object identifier prefixes, epoch seconds or milliseconds, or
//!   custom date patterns
//! - **Template variables**: `$var`, `${var}` and `[[var]]` references with
//!   JSON-safe substitution for aggregation pipelines
//! - **Orchestration**: every target rewritten in order, execution delegated
//!   to a pluggable executor whose response stream is returned untouched
//! - **Variable queries**: selection lists built from a one-off table query
//!
//! ## Modules
//!
//! - [`model`]: Targets, requests, responses and frames
//! - [`query`]: Macro expansion, variable resolution and orchestration
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use docdb_query::query::{DisplayZone, TimeMacroExpander};
//! use docdb_query::model::TimeRange;
//!
//! let from = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
//! let range = TimeRange::new(from, from);
//!
//! let expander = TimeMacroExpander::new(DisplayZone::Local);
//! let text = expander
//!     .expand(r#"{"_id":{"$gte":{"$oid":"{{ __time_from:date:toObjectId }}"}}}"#, &range)
//!     .unwrap();
//!
//! assert_eq!(text, r#"{"_id":{"$gte":{"$oid":"5fee66000000000000000000"}}}"#);
//! ```

pub mod config;
pub mod model;
pub mod query;

// Re-export top-level types for convenience
pub use model::{
    DataFrame, Field, FieldType, MetricFindValue, Query, QueryRequest, QueryResponse, QueryType,
    RequestOptions, ResponseError, ScopedVar, ScopedVars, TimeRange, VariableQuery, VariableValue,
};

pub use query::{
    DisplayZone, FirstFieldConverter, FrameConverter, MacroHandler, MacroMatch, MetricFindSource,
    QueryError, QueryExecutor, QueryOrchestrator, QueryResult, ReplaceMode, ResponseStream,
    TemplateRegistry, TemplateVariableResolver, TimeMacroExpander, VariableQueryAdapter,
    VariableRegistry,
};

pub use config::{Config, ConfigError, ExpansionConfig, LoggingConfig};
