//! Binding resolution.
//!
//! Input bindings become values handed to the handler, output bindings become
//! deferred sinks that are committed to the blob store only after the handler
//! succeeds.

use std::sync::Arc;

use fnhost_types::{BindingDecl, Direction, Payload, TriggerBinding, TriggerEvent};
use fnhost_util::PathTemplate;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::descriptor::{FunctionDescriptor, InvocationArgs, OutputSink, OutputSinks};
use crate::error::{BindingError, InvocationError};
use crate::store::BlobStore;

/// Substitute the event's route parameters into a binding's path pattern.
///
/// Returns `Ok(None)` for bindings without a pattern. Substitution is textual, so
/// resolving the same declaration against the same event always yields the same path.
pub fn resolve_path(decl: &BindingDecl, event: &TriggerEvent) -> Result<Option<String>, BindingError> {
    let Some(pattern) = decl.path_pattern.as_deref() else {
        return Ok(None);
    };
    let template = PathTemplate::parse(pattern).map_err(|source| BindingError::InvalidPattern {
        binding: decl.name.clone(),
        source,
    })?;
    Ok(Some(template.resolve(&event.route_params)?))
}

/// Resolves binding declarations against the blob store.
#[derive(Debug, Clone)]
pub struct BindingResolver {
    store: Arc<dyn BlobStore>,
}

impl BindingResolver {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Fetch the value of an input binding.
    pub async fn resolve_input(&self, decl: &BindingDecl, event: &TriggerEvent) -> Result<Payload, BindingError> {
        if decl.direction != Direction::In {
            return Err(BindingError::resolution(&decl.name, "declaration", "not an input binding"));
        }

        let Some(path) = resolve_path(decl, event)? else {
            let payload = event
                .payloads
                .get(&decl.name)
                .cloned()
                .ok_or_else(|| BindingError::resolution(&decl.name, "event", "no payload was supplied"))?;
            return payload
                .coerce(decl.shape)
                .map_err(|error| BindingError::resolution(&decl.name, "event", error.to_string()));
        };

        let bytes = self
            .store
            .read(&path)
            .await
            .map_err(|error| BindingError::resolution(&decl.name, &path, error.to_string()))?
            .ok_or_else(|| BindingError::resolution(&decl.name, &path, "resource does not exist"))?;
        debug!(binding = %decl.name, path = %path, size = bytes.len(), "input binding resolved");
        Payload::from_bytes(bytes, decl.shape).map_err(|error| BindingError::resolution(&decl.name, &path, error.to_string()))
    }

    /// Build the deferred write target for an output binding.
    pub fn resolve_output(&self, decl: &BindingDecl, event: &TriggerEvent) -> Result<OutputSink, BindingError> {
        if decl.direction != Direction::Out {
            return Err(BindingError::resolution(&decl.name, "declaration", "not an output binding"));
        }
        let path = resolve_path(decl, event)?
            .ok_or_else(|| BindingError::resolution(&decl.name, "declaration", "output binding has no path pattern"))?;
        Ok(OutputSink::new(&decl.name, path, decl.shape))
    }

    /// Resolve every binding of `descriptor` for one attempt.
    pub async fn resolve_all(
        &self,
        descriptor: &FunctionDescriptor,
        event: &TriggerEvent,
    ) -> Result<(InvocationArgs, OutputSinks), BindingError> {
        let trigger = match descriptor.trigger() {
            TriggerBinding::Blob { data_shape, .. } => event
                .trigger
                .clone()
                .coerce(*data_shape)
                .map_err(|error| BindingError::resolution(descriptor.trigger_name(), "trigger", error.to_string()))?,
            _ => event.trigger.clone(),
        };

        let mut inputs = IndexMap::with_capacity(descriptor.input_bindings().len());
        for decl in descriptor.input_bindings() {
            let value = self.resolve_input(decl, event).await?;
            inputs.insert(decl.name.clone(), value);
        }

        let mut outputs = OutputSinks::new();
        for decl in descriptor.output_bindings() {
            outputs.insert(self.resolve_output(decl, event)?);
        }

        let args = InvocationArgs {
            trigger_name: descriptor.trigger_name().to_string(),
            trigger,
            inputs,
            route_params: event.route_params.clone(),
            timestamp: event.timestamp,
        };
        Ok((args, outputs))
    }

    /// Write every staged output. Sinks the handler left empty are skipped.
    pub async fn commit(&self, outputs: &OutputSinks) -> Result<Vec<String>, InvocationError> {
        let mut committed = Vec::new();
        for sink in outputs.iter() {
            let Some(value) = sink.value() else {
                continue;
            };
            let bytes = value.to_bytes().ok_or_else(|| {
                InvocationError::from(BindingError::resolution(&sink.name, &sink.path, "value cannot be stored"))
            })?;
            self.store
                .write(&sink.path, &bytes)
                .await
                .map_err(|source| InvocationError::Commit {
                    path: sink.path.clone(),
                    source,
                })?;
            info!(binding = %sink.name, path = %sink.path, size = bytes.len(), "output committed");
            committed.push(sink.path.clone());
        }
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use fnhost_types::DataShape;

    use super::*;
    use crate::descriptor::{HandlerOutput, handler_fn};
    use crate::store::MemoryBlobStore;

    fn blob_event(name: &str, bytes: &[u8]) -> TriggerEvent {
        TriggerEvent::new(Payload::Binary(bytes.to_vec())).with_route_param("name", name)
    }

    #[test]
    fn resolve_path_substitutes_route_parameters() {
        let decl = BindingDecl::output("outputBlob", "output/{name}", DataShape::Binary);
        let event = blob_event("report.txt", b"");
        assert_eq!(resolve_path(&decl, &event).unwrap().as_deref(), Some("output/report.txt"));
    }

    #[test]
    fn resolve_path_reports_missing_parameters() {
        let decl = BindingDecl::output("outputBlob", "output/{id}", DataShape::Binary);
        let error = resolve_path(&decl, &blob_event("a", b"")).unwrap_err();
        assert!(matches!(error, BindingError::UnresolvedPlaceholder(ref inner) if inner.placeholder == "id"));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn resolve_input_reads_from_store() {
        let store = Arc::new(MemoryBlobStore::new());
        store.write("input/a.txt", b"hello").await.unwrap();
        let resolver = BindingResolver::new(store);

        let decl = BindingDecl::input("inputBlob", "input/{name}", DataShape::Text);
        let value = resolver.resolve_input(&decl, &blob_event("a.txt", b"")).await.unwrap();
        assert_eq!(value, Payload::Text("hello".into()));
    }

    #[tokio::test]
    async fn resolve_input_fails_for_absent_resource() {
        let resolver = BindingResolver::new(Arc::new(MemoryBlobStore::new()));
        let decl = BindingDecl::input("inputBlob", "input/{name}", DataShape::Binary);
        let error = resolver.resolve_input(&decl, &blob_event("missing", b"")).await.unwrap_err();
        assert!(matches!(error, BindingError::Resolution { ref location, .. } if location == "input/missing"));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn resolve_input_fails_on_shape_mismatch() {
        let store = Arc::new(MemoryBlobStore::new());
        store.write("input/a.json", b"not json").await.unwrap();
        let resolver = BindingResolver::new(store);

        let decl = BindingDecl::input("doc", "input/{name}", DataShape::Structured);
        assert!(resolver.resolve_input(&decl, &blob_event("a.json", b"")).await.is_err());
    }

    #[tokio::test]
    async fn event_inputs_come_from_payloads() {
        let resolver = BindingResolver::new(Arc::new(MemoryBlobStore::new()));
        let decl = BindingDecl::event_input("message", DataShape::Text);
        let event = TriggerEvent::new(Payload::Text(String::new())).with_payload("message", Payload::Binary(b"hi".to_vec()));
        assert_eq!(resolver.resolve_input(&decl, &event).await.unwrap(), Payload::Text("hi".into()));

        let missing = TriggerEvent::new(Payload::Text(String::new()));
        assert!(resolver.resolve_input(&decl, &missing).await.is_err());
    }

    #[tokio::test]
    async fn commit_writes_only_staged_sinks() {
        let store = Arc::new(MemoryBlobStore::new());
        let resolver = BindingResolver::new(store.clone());
        let event = blob_event("a.txt", b"");

        let mut outputs = OutputSinks::new();
        outputs.insert(resolver.resolve_output(&BindingDecl::output("first", "output/{name}", DataShape::Binary), &event).unwrap());
        outputs.insert(resolver.resolve_output(&BindingDecl::output("second", "other/{name}", DataShape::Binary), &event).unwrap());
        outputs.set("first", Payload::Binary(vec![1, 2, 3])).unwrap();

        let committed = resolver.commit(&outputs).await.unwrap();
        assert_eq!(committed, vec!["output/a.txt".to_string()]);
        assert_eq!(store.read("output/a.txt").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.read("other/a.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn resolve_all_coerces_blob_trigger_and_collects_bindings() {
        let store = Arc::new(MemoryBlobStore::new());
        store.write("input/a.txt", b"body").await.unwrap();
        let resolver = BindingResolver::new(store);

        let descriptor = FunctionDescriptor::new(
            "Copy",
            TriggerBinding::blob("input/{name}", DataShape::Text),
            handler_fn(|_, _, _| Ok(HandlerOutput::none())),
        )
        .with_trigger_name("triggerBlob")
        .with_input(BindingDecl::input("inputBlob", "input/{name}", DataShape::Binary))
        .with_output(BindingDecl::output("outputBlob", "output/{name}", DataShape::Binary));

        let (args, outputs) = resolver.resolve_all(&descriptor, &blob_event("a.txt", b"body")).await.unwrap();
        assert_eq!(args.get("triggerBlob"), Some(&Payload::Text("body".into())));
        assert_eq!(args.input("inputBlob"), Some(&Payload::Binary(b"body".to_vec())));
        assert_eq!(outputs.get("outputBlob").map(|sink| sink.path.as_str()), Some("output/a.txt"));
    }
}
