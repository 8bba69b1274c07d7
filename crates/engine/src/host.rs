//! Dispatch Host.
//!
//! Owns the frozen [`FunctionRegistry`], routes trigger events to the functions
//! they fire, and drives each invocation through binding resolution, the handler,
//! the retry engine, and output commit. Shutdown stops new dispatches, drains
//! in-flight invocations for a grace period, then aborts the rest.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fnhost_types::{HttpResponse, TriggerEvent, TriggerSource};
use futures_util::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, info, info_span, warn};

use crate::context::{InvocationContext, LogRecord};
use crate::error::{DispatchError, InvocationError};
use crate::registry::{FunctionRegistry, RegisteredFunction};
use crate::resolver::BindingResolver;
use crate::retry::RetryEngine;
use crate::store::BlobStore;

/// What a successful invocation produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvocationSuccess {
    pub response: Option<HttpResponse>,
    /// Blob paths written by output bindings.
    pub committed: Vec<String>,
}

/// Per-function result of one dispatch.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub function: String,
    pub invocation_id: String,
    pub attempts: u32,
    pub retry_delays: Vec<Duration>,
    pub result: Result<InvocationSuccess, InvocationError>,
    pub logs: Vec<LogRecord>,
    pub elapsed: Duration,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.result.as_ref().ok().and_then(|success| success.response.as_ref())
    }

    pub fn summary(&self) -> OutcomeSummary {
        let (status, error, error_kind, committed) = match &self.result {
            Ok(success) => ("succeeded", None, None, success.committed.clone()),
            Err(error) => ("failed", Some(error.to_string()), Some(error.kind()), Vec::new()),
        };
        OutcomeSummary {
            function: self.function.clone(),
            invocation_id: self.invocation_id.clone(),
            status,
            attempts: self.attempts,
            elapsed_ms: self.elapsed.as_millis() as u64,
            response_status: self.response().map(|response| response.status),
            committed,
            error,
            error_kind,
            logs: self.logs.clone(),
        }
    }
}

/// Serializable view of a [`DispatchOutcome`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSummary {
    pub function: String,
    pub invocation_id: String,
    pub status: &'static str,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub committed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub logs: Vec<LogRecord>,
}

/// How [`DispatchHost::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All in-flight invocations finished within the grace period.
    Drained,
    /// The grace period elapsed and remaining invocations were aborted.
    Aborted,
}

struct HostInner {
    registry: FunctionRegistry,
    resolver: BindingResolver,
    /// Cancelled once shutdown begins; no dispatch starts afterwards.
    accepting: CancellationToken,
    /// Cancelled when the grace period elapses.
    abort: CancellationToken,
    tracker: TaskTracker,
}

/// Routes trigger events to registered functions. Cheap to clone.
#[derive(Clone)]
pub struct DispatchHost {
    inner: Arc<HostInner>,
}

impl std::fmt::Debug for DispatchHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHost")
            .field("functions", &self.inner.registry.len())
            .field("accepting", &self.is_accepting())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl DispatchHost {
    /// Freeze `registry` into a host backed by `store`.
    pub fn new(registry: FunctionRegistry, store: Arc<dyn BlobStore>) -> Self {
        Self {
            inner: Arc::new(HostInner {
                registry,
                resolver: BindingResolver::new(store),
                accepting: CancellationToken::new(),
                abort: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        self.inner.resolver.store()
    }

    pub fn is_accepting(&self) -> bool {
        !self.inner.accepting.is_cancelled()
    }

    /// Dispatches currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.accepting.clone()
    }

    /// Invoke every function fired by `source`, concurrently, and wait for all of them.
    ///
    /// An empty result means nothing matched.
    pub async fn dispatch(&self, event: TriggerEvent, source: &TriggerSource) -> Result<Vec<DispatchOutcome>, DispatchError> {
        let _in_flight = self.inner.tracker.token();
        if !self.is_accepting() {
            return Err(DispatchError::ShuttingDown);
        }

        let matches = self.inner.registry.matching(source);
        if matches.is_empty() {
            info!(source = %source, "no function matched trigger source");
            return Ok(Vec::new());
        }

        let invocations = matches
            .into_iter()
            .map(|(function, captures)| self.invoke_registered(function, event.clone(), captures, source));
        Ok(join_all(invocations).await)
    }

    /// Invoke one function by name, bypassing trigger matching.
    ///
    /// Route parameters captured by the function's trigger from `source` are merged
    /// into the event; a source the trigger does not match contributes none.
    pub async fn invoke(&self, name: &str, event: TriggerEvent, source: &TriggerSource) -> Result<DispatchOutcome, DispatchError> {
        let _in_flight = self.inner.tracker.token();
        if !self.is_accepting() {
            return Err(DispatchError::ShuttingDown);
        }
        let function = self
            .inner
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownFunction { name: name.to_string() })?;
        let captures = function.captures(source).unwrap_or_default();
        Ok(self.invoke_registered(function, event, captures, source).await)
    }

    async fn invoke_registered(
        &self,
        function: Arc<RegisteredFunction>,
        mut event: TriggerEvent,
        captures: IndexMap<String, String>,
        source: &TriggerSource,
    ) -> DispatchOutcome {
        for (key, value) in captures {
            event.route_params.insert(key, value);
        }
        let event = Arc::new(event);
        let context = Arc::new(InvocationContext::new(function.name()));
        let span = info_span!("invocation", function = %function.name(), invocation_id = %context.invocation_id());

        async {
            info!(source = %source, "dispatch started");
            let started = Instant::now();
            let engine = RetryEngine::new(function.descriptor().retry_policy().cloned());
            let report = engine
                .run(&self.inner.abort, |attempt| {
                    run_attempt(self.inner.clone(), function.clone(), event.clone(), context.clone(), attempt)
                })
                .await;
            let elapsed = started.elapsed();

            match &report.outcome {
                Ok(success) => info!(
                    attempts = report.attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    committed = success.committed.len(),
                    "dispatch succeeded"
                ),
                Err(InvocationError::Aborted) => warn!(attempts = report.attempts, "dispatch aborted"),
                Err(failure) => error!(
                    attempts = report.attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error_kind = failure.kind(),
                    error = %failure,
                    "dispatch failed"
                ),
            }

            DispatchOutcome {
                function: function.name().to_string(),
                invocation_id: context.invocation_id().to_string(),
                attempts: report.attempts,
                retry_delays: report.delays,
                result: report.outcome,
                logs: context.take_logs(),
                elapsed,
            }
        }
        .instrument(span)
        .await
    }

    /// Stop accepting dispatches, wait up to `grace` for in-flight ones, then abort the rest.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownOutcome {
        self.inner.accepting.cancel();
        self.inner.tracker.close();
        info!(in_flight = self.in_flight(), grace_ms = grace.as_millis() as u64, "dispatch host shutting down");

        if tokio::time::timeout(grace, self.inner.tracker.wait()).await.is_ok() {
            info!("dispatch host drained");
            return ShutdownOutcome::Drained;
        }

        warn!(in_flight = self.in_flight(), "grace period elapsed; aborting in-flight invocations");
        self.inner.abort.cancel();
        self.inner.tracker.wait().await;
        ShutdownOutcome::Aborted
    }
}

/// One attempt: resolve bindings, run the handler, commit outputs.
///
/// Abort is honoured until the handler returns. Commit is never interrupted, so an
/// aborted attempt writes nothing and a committed one writes everything.
async fn run_attempt(
    inner: Arc<HostInner>,
    function: Arc<RegisteredFunction>,
    event: Arc<TriggerEvent>,
    context: Arc<InvocationContext>,
    attempt: u32,
) -> Result<InvocationSuccess, InvocationError> {
    context.begin_attempt(attempt);
    let descriptor = function.descriptor();

    let execution = async {
        let (args, mut outputs) = inner.resolver.resolve_all(descriptor, &event).await?;
        let output = descriptor.handler().invoke(&args, &mut outputs, &context).await?;
        Ok::<_, InvocationError>((output, outputs))
    };

    let (output, outputs) = tokio::select! {
        biased;
        _ = inner.abort.cancelled() => return Err(InvocationError::Aborted),
        result = execution => result?,
    };

    let committed = inner.resolver.commit(&outputs).await?;
    Ok(InvocationSuccess {
        response: output.response,
        committed,
    })
}

#[cfg(test)]
mod tests {
    use fnhost_types::{BindingDecl, DataShape, HttpMethod, HttpRequest, Payload, TriggerBinding};

    use super::*;
    use crate::descriptor::{FunctionDescriptor, HandlerOutput, handler_fn};
    use crate::store::MemoryBlobStore;

    fn hello_host() -> DispatchHost {
        let mut registry = FunctionRegistry::new();
        registry
            .register(FunctionDescriptor::new(
                "Hello",
                TriggerBinding::http([HttpMethod::Get]),
                handler_fn(|args, _, context| {
                    context.logger().info("hello called");
                    let name = args.http_request().and_then(|request| request.query_param("name")).unwrap_or("nobody");
                    Ok(HttpResponse::ok(format!("Hello, {name}!")).into())
                }),
            ))
            .unwrap();
        DispatchHost::new(registry, Arc::new(MemoryBlobStore::new()))
    }

    fn get(path: &str) -> (TriggerEvent, TriggerSource) {
        let request = HttpRequest::new(HttpMethod::Get, path).with_query("name", "World");
        let source = TriggerSource::Http {
            method: HttpMethod::Get,
            path: path.to_string(),
        };
        (TriggerEvent::new(Payload::Http(request)), source)
    }

    #[tokio::test]
    async fn dispatch_returns_outcome_with_logs() {
        let host = hello_host();
        let (event, source) = get("hello");
        let outcomes = host.dispatch(event, &source).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert_eq!(outcome.response().map(|response| response.body.as_str()), Some("Hello, World!"));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.logs.len(), 1);

        let summary = serde_json::to_value(outcome.summary()).unwrap();
        assert_eq!(summary["status"], "succeeded");
        assert_eq!(summary["responseStatus"], 200);
    }

    #[tokio::test]
    async fn unmatched_sources_yield_no_outcomes() {
        let host = hello_host();
        let (event, source) = get("missing");
        assert!(host.dispatch(event, &source).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invoke_rejects_unknown_functions() {
        let host = hello_host();
        let (event, source) = get("hello");
        let error = host.invoke("Nope", event, &source).await.unwrap_err();
        assert_eq!(error, DispatchError::UnknownFunction { name: "Nope".into() });
    }

    #[tokio::test]
    async fn shutdown_refuses_new_dispatches() {
        let host = hello_host();
        assert_eq!(host.shutdown(Duration::from_secs(1)).await, ShutdownOutcome::Drained);

        let (event, source) = get("hello");
        assert_eq!(host.dispatch(event, &source).await.unwrap_err(), DispatchError::ShuttingDown);
        assert!(!host.is_accepting());
    }

    #[tokio::test]
    async fn shutdown_aborts_invocations_after_grace_period() {
        let mut registry = FunctionRegistry::new();
        registry
            .register(FunctionDescriptor::new("Slow", TriggerBinding::http([HttpMethod::Get]), Arc::new(Stall)))
            .unwrap();
        let host = DispatchHost::new(registry, Arc::new(MemoryBlobStore::new()));

        let (event, source) = get("slow");
        let background = host.clone();
        let running = tokio::spawn(async move { background.dispatch(event, &source).await });
        while host.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(host.shutdown(Duration::from_millis(20)).await, ShutdownOutcome::Aborted);
        let outcomes = running.await.unwrap().unwrap();
        assert!(matches!(outcomes[0].result, Err(InvocationError::Aborted)));
    }

    #[tokio::test]
    async fn aborted_invocations_commit_no_staged_outputs() {
        let store = Arc::new(MemoryBlobStore::new());
        let mut registry = FunctionRegistry::new();
        registry
            .register(
                FunctionDescriptor::new("Stage", TriggerBinding::blob("in/{name}", DataShape::Binary), Arc::new(StageThenStall))
                    .with_output(BindingDecl::output("outputBlob", "out/{name}", DataShape::Binary)),
            )
            .unwrap();
        let host = DispatchHost::new(registry, store.clone());

        let source = TriggerSource::Blob { path: "in/a.bin".into() };
        let event = TriggerEvent::new(Payload::Binary(b"abc".to_vec()));
        let background = host.clone();
        let running = tokio::spawn(async move { background.dispatch(event, &source).await });
        while host.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(host.shutdown(Duration::from_millis(20)).await, ShutdownOutcome::Aborted);
        let outcomes = running.await.unwrap().unwrap();
        assert!(matches!(outcomes[0].result, Err(InvocationError::Aborted)));
        assert_eq!(store.read("out/a.bin").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    /// Stages an output, then never returns.
    struct StageThenStall;

    #[async_trait::async_trait]
    impl crate::descriptor::FunctionHandler for StageThenStall {
        async fn invoke(
            &self,
            args: &crate::descriptor::InvocationArgs,
            outputs: &mut crate::descriptor::OutputSinks,
            _context: &InvocationContext,
        ) -> Result<HandlerOutput, crate::error::HandlerError> {
            outputs.set("outputBlob", args.trigger.clone())?;
            std::future::pending().await
        }
    }

    struct Stall;

    #[async_trait::async_trait]
    impl crate::descriptor::FunctionHandler for Stall {
        async fn invoke(
            &self,
            _args: &crate::descriptor::InvocationArgs,
            _outputs: &mut crate::descriptor::OutputSinks,
            _context: &InvocationContext,
        ) -> Result<HandlerOutput, crate::error::HandlerError> {
            std::future::pending().await
        }
    }
}
