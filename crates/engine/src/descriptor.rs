//! Function descriptors and the handler seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnhost_types::{BindingDecl, DataShape, HttpRequest, HttpResponse, Payload, RetryPolicy, TriggerBinding};
use indexmap::IndexMap;

use crate::context::InvocationContext;
use crate::error::HandlerError;

/// Default name of the trigger binding when a descriptor does not set one.
pub const DEFAULT_TRIGGER_NAME: &str = "trigger";

/// A function body.
///
/// Implementations read bound arguments, optionally stage output values, and return
/// an optional HTTP response. Staged outputs are committed only if the call succeeds.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn invoke(
        &self,
        args: &InvocationArgs,
        outputs: &mut OutputSinks,
        context: &InvocationContext,
    ) -> Result<HandlerOutput, HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> FunctionHandler for FnHandler<F>
where
    F: Fn(&InvocationArgs, &mut OutputSinks, &InvocationContext) -> Result<HandlerOutput, HandlerError> + Send + Sync,
{
    async fn invoke(
        &self,
        args: &InvocationArgs,
        outputs: &mut OutputSinks,
        context: &InvocationContext,
    ) -> Result<HandlerOutput, HandlerError> {
        (self.0)(args, outputs, context)
    }
}

/// Wrap a synchronous closure as a [`FunctionHandler`].
pub fn handler_fn<F>(function: F) -> Arc<dyn FunctionHandler>
where
    F: Fn(&InvocationArgs, &mut OutputSinks, &InvocationContext) -> Result<HandlerOutput, HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(function))
}

/// What a handler hands back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandlerOutput {
    pub response: Option<HttpResponse>,
}

impl HandlerOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn http(response: HttpResponse) -> Self {
        Self { response: Some(response) }
    }
}

impl From<HttpResponse> for HandlerOutput {
    fn from(response: HttpResponse) -> Self {
        HandlerOutput::http(response)
    }
}

/// Bound arguments for one attempt.
#[derive(Debug, Clone)]
pub struct InvocationArgs {
    pub trigger_name: String,
    pub trigger: Payload,
    pub inputs: IndexMap<String, Payload>,
    pub route_params: IndexMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl InvocationArgs {
    /// Look up a bound value by binding name, including the trigger binding.
    pub fn get(&self, name: &str) -> Option<&Payload> {
        if name == self.trigger_name {
            Some(&self.trigger)
        } else {
            self.inputs.get(name)
        }
    }

    pub fn input(&self, name: &str) -> Option<&Payload> {
        self.inputs.get(name)
    }

    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params.get(name).map(String::as_str)
    }

    /// The triggering request for HTTP functions.
    pub fn http_request(&self) -> Option<&HttpRequest> {
        self.trigger.as_http()
    }
}

/// Deferred write target for one output binding.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSink {
    pub name: String,
    pub path: String,
    pub shape: DataShape,
    value: Option<Payload>,
}

impl OutputSink {
    pub fn new(name: impl Into<String>, path: impl Into<String>, shape: DataShape) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            shape,
            value: None,
        }
    }

    pub fn value(&self) -> Option<&Payload> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

/// Output sinks for one attempt, keyed by binding name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSinks {
    sinks: IndexMap<String, OutputSink>,
}

impl OutputSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, sink: OutputSink) {
        self.sinks.insert(sink.name.clone(), sink);
    }

    /// Stage `value` for the named output, converting it to the binding's shape.
    pub fn set(&mut self, name: &str, value: Payload) -> Result<(), HandlerError> {
        let sink = self
            .sinks
            .get_mut(name)
            .ok_or_else(|| HandlerError::permanent(format!("no output binding named '{name}'")))?;
        let shaped = value
            .coerce(sink.shape)
            .map_err(|error| HandlerError::permanent(format!("output '{name}': {error}")))?;
        sink.value = Some(shaped);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&OutputSink> {
        self.sinks.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputSink> {
        self.sinks.values()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// A function and everything the host needs to trigger it.
#[derive(Clone)]
pub struct FunctionDescriptor {
    name: String,
    trigger_name: String,
    trigger: TriggerBinding,
    input_bindings: Vec<BindingDecl>,
    output_bindings: Vec<BindingDecl>,
    retry_policy: Option<RetryPolicy>,
    handler: Arc<dyn FunctionHandler>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, trigger: TriggerBinding, handler: Arc<dyn FunctionHandler>) -> Self {
        Self {
            name: name.into(),
            trigger_name: DEFAULT_TRIGGER_NAME.to_string(),
            trigger,
            input_bindings: Vec::new(),
            output_bindings: Vec::new(),
            retry_policy: None,
            handler,
        }
    }

    /// Name under which the trigger payload is exposed to the handler.
    pub fn with_trigger_name(mut self, trigger_name: impl Into<String>) -> Self {
        self.trigger_name = trigger_name.into();
        self
    }

    pub fn with_input(mut self, binding: BindingDecl) -> Self {
        self.input_bindings.push(binding);
        self
    }

    pub fn with_output(mut self, binding: BindingDecl) -> Self {
        self.output_bindings.push(binding);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger_name(&self) -> &str {
        &self.trigger_name
    }

    pub fn trigger(&self) -> &TriggerBinding {
        &self.trigger
    }

    pub fn input_bindings(&self) -> &[BindingDecl] {
        &self.input_bindings
    }

    pub fn output_bindings(&self) -> &[BindingDecl] {
        &self.output_bindings
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }

    pub fn handler(&self) -> &Arc<dyn FunctionHandler> {
        &self.handler
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("trigger_name", &self.trigger_name)
            .field("trigger", &self.trigger)
            .field("input_bindings", &self.input_bindings)
            .field("output_bindings", &self.output_bindings)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}
