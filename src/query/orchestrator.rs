//! Query Orchestrator
//!
//! Rewrites every target of a request and hands the result to the injected
//! executor:
//!
//! ```text
//! QueryRequest → resolve variables → expand time macros → executor → stream
//! ```
//!
//! The executor's stream is returned as is: no buffering, retries or
//! reordering happen here.

use futures_util::stream::BoxStream;
use std::collections::HashSet;
use std::sync::Arc;

use crate::model::{Query, QueryRequest, QueryResponse, ScopedVars, TimeRange};
use crate::query::error::{QueryError, QueryResult};
use crate::query::macros::TimeMacroExpander;
use crate::query::variables::TemplateVariableResolver;

/// Response batches in the order the executor emits them
pub type ResponseStream = BoxStream<'static, QueryResponse>;

/// Runs rewritten requests against the backend
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, request: QueryRequest) -> ResponseStream;
}

/// Rewrites requests and delegates their execution
#[derive(Clone)]
pub struct QueryOrchestrator {
    resolver: TemplateVariableResolver,
    expander: TimeMacroExpander,
    executor: Arc<dyn QueryExecutor>,
}

impl QueryOrchestrator {
    pub fn new(
        resolver: TemplateVariableResolver,
        expander: TimeMacroExpander,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            resolver,
            expander,
            executor,
        }
    }

    /// Rewrite a request without executing it
    ///
    /// Targets keep their order and `ref_id`; every other request field is
    /// copied unchanged. Responses are matched to targets by `ref_id`, so an
    /// empty or repeated one is rejected.
    pub fn rewrite(&self, request: &QueryRequest) -> QueryResult<QueryRequest> {
        check_ref_ids(&request.targets)?;

        let targets = request
            .targets
            .iter()
            .map(|target| self.rewrite_target(target, &request.range, &request.scoped_vars))
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(QueryRequest {
            targets,
            ..request.clone()
        })
    }

    /// Rewrite a request and execute it
    ///
    /// Fails before the executor is invoked if any target cannot be
    /// rewritten.
    pub fn run(&self, request: QueryRequest) -> QueryResult<ResponseStream> {
        let rewritten = self.rewrite(&request)?;

        tracing::debug!(
            request_id = %rewritten.request_id,
            targets = rewritten.targets.len(),
            "executing rewritten request"
        );

        Ok(self.executor.execute(rewritten))
    }

    fn rewrite_target(
        &self,
        target: &Query,
        range: &TimeRange,
        scoped_vars: &ScopedVars,
    ) -> QueryResult<Query> {
        let mut resolved = self.resolver.resolve(target, scoped_vars);

        if let Some(aggregation) = resolved.aggregation.as_deref() {
            resolved.aggregation = Some(self.expander.expand(aggregation, range)?);
        }

        tracing::debug!(
            ref_id = %resolved.ref_id,
            database = resolved.database.as_deref().unwrap_or_default(),
            collection = resolved.collection.as_deref().unwrap_or_default(),
            "rewrote target"
        );

        Ok(resolved)
    }
}

fn check_ref_ids(targets: &[Query]) -> QueryResult<()> {
    let mut seen = HashSet::new();
    for target in targets {
        if target.ref_id.is_empty() {
            return Err(QueryError::InvalidRequest("target without refId".to_string()));
        }
        if !seen.insert(target.ref_id.as_str()) {
            return Err(QueryError::InvalidRequest(format!(
                "duplicate refId '{}'",
                target.ref_id
            )));
        }
    }
    Ok(())
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("expander", &self.expander)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataFrame, Field, FieldType, ScopedVar};
    use crate::query::format::DisplayZone;
    use crate::query::variables::TemplateRegistry;
    use chrono::{Duration, TimeZone, Utc};
    use futures_util::{stream, StreamExt};
    use std::sync::Mutex;

    /// Records requests and answers with one response per target
    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<QueryRequest>>,
    }

    impl QueryExecutor for RecordingExecutor {
        fn execute(&self, request: QueryRequest) -> ResponseStream {
            let responses: Vec<QueryResponse> = request
                .targets
                .iter()
                .map(|t| {
                    QueryResponse::frames(vec![DataFrame::new(t.ref_id.clone()).field(
                        Field::strings("aggregation", [t.aggregation.clone().unwrap_or_default()]),
                    )])
                })
                .collect();
            self.seen.lock().unwrap().push(request);
            stream::iter(responses).boxed()
        }
    }

    fn range() -> TimeRange {
        let from = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        TimeRange::new(from, from + Duration::hours(1))
    }

    fn orchestrator(executor: Arc<RecordingExecutor>) -> QueryOrchestrator {
        let registry = TemplateRegistry::new().with_variable("host", "web-1");
        QueryOrchestrator::new(
            TemplateVariableResolver::new(Arc::new(registry)),
            TimeMacroExpander::new(DisplayZone::parse("UTC").unwrap()),
            executor,
        )
    }

    #[test]
    fn test_rewrite_applies_variables_then_macros() {
        let orchestrator = orchestrator(Arc::new(RecordingExecutor::default()));

        // The variable expands to a macro, which must then be expanded too
        let mut scoped = ScopedVars::new();
        scoped.insert("start".to_string(), ScopedVar::single("{{__time_from:date}}"));

        let request = QueryRequest::new(
            "req-1",
            range(),
            vec![Query::new("A")
                .database("db")
                .collection("c_$host")
                .aggregation(r#"{"h":"$host","t":"$start"}"#)],
        )
        .scoped_vars(scoped);

        let rewritten = orchestrator.rewrite(&request).unwrap();

        assert_eq!(rewritten.targets[0].collection.as_deref(), Some("c_web-1"));
        assert_eq!(
            rewritten.targets[0].aggregation.as_deref(),
            Some(r#"{"h":"web-1","t":"2021-01-01T00:00:00.000Z"}"#)
        );
        assert_eq!(rewritten.request_id, request.request_id);
        assert_eq!(rewritten.scoped_vars, request.scoped_vars);
    }

    #[test]
    fn test_macros_only_expanded_in_aggregation() {
        let orchestrator = orchestrator(Arc::new(RecordingExecutor::default()));
        let request = QueryRequest::new(
            "req-2",
            range(),
            vec![Query::new("A").collection("{{__time_from:date:seconds}}")],
        );

        let rewritten = orchestrator.rewrite(&request).unwrap();
        assert_eq!(
            rewritten.targets[0].collection.as_deref(),
            Some("{{__time_from:date:seconds}}")
        );
    }

    #[tokio::test]
    async fn test_run_preserves_target_order() {
        let executor = Arc::new(RecordingExecutor::default());
        let orchestrator = orchestrator(Arc::clone(&executor));

        let targets = ["C", "A", "B"]
            .iter()
            .map(|id| Query::new(*id).aggregation("{{__time_to:date:seconds}}"))
            .collect();
        let request = QueryRequest::new("req-3", range(), targets);

        let responses: Vec<QueryResponse> = orchestrator.run(request).unwrap().collect().await;

        let ref_ids: Vec<_> = responses
            .iter()
            .map(|r| r.data[0].ref_id.clone().unwrap())
            .collect();
        assert_eq!(ref_ids, vec!["C", "A", "B"]);
        assert_eq!(
            responses[0].data[0].fields[0].values[0],
            serde_json::json!("1609462800")
        );

        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].targets[2].ref_id, "B");
    }

    #[tokio::test]
    async fn test_run_passes_errors_through() {
        struct FailingExecutor;

        impl QueryExecutor for FailingExecutor {
            fn execute(&self, _request: QueryRequest) -> ResponseStream {
                stream::iter(vec![
                    QueryResponse::error("timeout"),
                    QueryResponse::frames(Vec::new()),
                ])
                .boxed()
            }
        }

        let orchestrator = QueryOrchestrator::new(
            TemplateVariableResolver::new(Arc::new(TemplateRegistry::new())),
            TimeMacroExpander::default(),
            Arc::new(FailingExecutor),
        );

        let responses: Vec<_> = orchestrator
            .run(QueryRequest::new("req-4", range(), vec![Query::new("A")]))
            .unwrap()
            .collect()
            .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].error.as_ref().unwrap().message, "timeout");
    }

    #[test]
    fn test_run_fails_fast_without_executing() {
        let executor = Arc::new(RecordingExecutor::default());
        let orchestrator = orchestrator(Arc::clone(&executor));

        let request = QueryRequest::new(
            "req-5",
            range(),
            vec![
                Query::new("A").aggregation("{{__time_from:date}}"),
                Query::new("B").aggregation("{{__time_from:date:unknown}}"),
            ],
        );

        let result = orchestrator.run(request);

        assert!(matches!(result, Err(QueryError::UnrecognizedFormat { .. })));
        assert!(executor.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_or_empty_ref_id_rejected() {
        let executor = Arc::new(RecordingExecutor::default());
        let orchestrator = orchestrator(Arc::clone(&executor));

        let duplicate = QueryRequest::new(
            "req-7",
            range(),
            vec![Query::new("A"), Query::new("B"), Query::new("A")],
        );
        assert!(matches!(
            orchestrator.run(duplicate),
            Err(QueryError::InvalidRequest(ref msg)) if msg.contains("'A'")
        ));

        let empty = QueryRequest::new("req-8", range(), vec![Query::new("")]);
        assert!(matches!(
            orchestrator.rewrite(&empty),
            Err(QueryError::InvalidRequest(_))
        ));

        assert!(executor.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rewrite_keeps_non_text_fields() {
        let orchestrator = orchestrator(Arc::new(RecordingExecutor::default()));
        let mut target = Query::new("A").value_field("v", FieldType::Float64);
        target.hide = true;
        target.auto_time_bound = true;
        target.schema_inference_depth = 5;

        let mut request = QueryRequest::new("req-6", range(), vec![target.clone()]);
        request.max_data_points = Some(100);

        let rewritten = orchestrator.rewrite(&request).unwrap();
        let out = &rewritten.targets[0];

        assert!(out.hide);
        assert!(out.auto_time_bound);
        assert_eq!(out.schema_inference_depth, 5);
        assert_eq!(out.value_fields, target.value_fields);
        assert_eq!(rewritten.max_data_points, Some(100));
    }
}
