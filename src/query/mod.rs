//! Query Rewriting Engine
//!
//! Turns dashboard targets into executable queries:
//!
//! - **Variables**: substitute template variables into database, collection
//!   and aggregation text
//! - **Macros**: expand `{{ __time_from:date }}`-style time macros in the
//!   aggregation text
//! - **Orchestrator**: apply both to every target and hand the request to
//!   an executor
//! - **Variable queries**: build selection lists from a one-off table query
//!
//! # Examples
//!
//! ```rust,ignore
//! use docdb_query::query::{
//!     QueryOrchestrator, TemplateRegistry, TemplateVariableResolver, TimeMacroExpander,
//! };
//!
//! let registry = TemplateRegistry::new().with_variable("host", "web-1");
//! let orchestrator = QueryOrchestrator::new(
//!     TemplateVariableResolver::new(Arc::new(registry)),
//!     TimeMacroExpander::default(),
//!     executor,
//! );
//!
//! let mut responses = orchestrator.run(request)?;
//! while let Some(batch) = responses.next().await {
//!     // ...
//! }
//! ```

mod error;
mod format;
mod macros;
mod orchestrator;
mod scanner;
mod variable_query;
mod variables;

pub use error::{QueryError, QueryResult};
pub use format::{DatePattern, DisplayZone};
pub use macros::{
    DateEncoding, MacroContext, MacroHandler, MacroMatch, TimeBound, TimeMacro, TimeMacroExpander,
};
pub use orchestrator::{QueryExecutor, QueryOrchestrator, ResponseStream};
pub use scanner::{Candidate, MacroScanner};
pub use variable_query::{
    FirstFieldConverter, FrameConverter, MetricFindSource, VariableQueryAdapter,
    METRIC_FIND_REF_ID,
};
pub use variables::{ReplaceMode, TemplateRegistry, TemplateVariableResolver, VariableRegistry};
