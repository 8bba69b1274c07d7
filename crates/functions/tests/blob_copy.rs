use std::sync::Arc;

use fnhost_engine::{BlobStore, DispatchHost, FunctionRegistry, MemoryBlobStore};
use fnhost_functions::blob::{BLOB_TRIGGER_TO_BLOB, blob_trigger_to_blob};
use fnhost_types::{Payload, TriggerEvent, TriggerSource};

async fn host_with(path: &str, bytes: &[u8]) -> (DispatchHost, Arc<MemoryBlobStore>) {
    let store = Arc::new(MemoryBlobStore::new());
    store.write(path, bytes).await.unwrap();
    let mut registry = FunctionRegistry::new();
    registry.register(blob_trigger_to_blob()).unwrap();
    (DispatchHost::new(registry, store.clone()), store)
}

#[tokio::test]
async fn copies_blob_bytes_unmodified() {
    let bytes: Vec<u8> = (0..=255).collect();
    let (host, store) = host_with("input/data.bin", &bytes).await;

    let source = TriggerSource::Blob {
        path: "input/data.bin".to_string(),
    };
    let outcomes = host.dispatch(TriggerEvent::new(Payload::Binary(bytes.clone())), &source).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].function, BLOB_TRIGGER_TO_BLOB);
    assert!(outcomes[0].is_success());
    assert_eq!(store.read("output/data.bin").await.unwrap(), Some(bytes));
    assert_eq!(
        outcomes[0].logs[0].message,
        "Blob trigger function BlobTriggerToBlobTest processed a blob. Name: data.bin Size: 256 Bytes"
    );
}

#[tokio::test]
async fn ignores_blobs_outside_the_input_container() {
    let (host, store) = host_with("other/data.bin", b"x").await;
    let source = TriggerSource::Blob {
        path: "other/data.bin".to_string(),
    };
    let outcomes = host.dispatch(TriggerEvent::new(Payload::Binary(b"x".to_vec())), &source).await.unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(store.read("output/data.bin").await.unwrap(), None);
}

#[tokio::test]
async fn missing_input_blob_fails_without_writing() {
    let (host, store) = host_with("input/elsewhere.bin", b"x").await;
    let source = TriggerSource::Blob {
        path: "input/gone.bin".to_string(),
    };
    let outcomes = host.dispatch(TriggerEvent::new(Payload::Binary(b"x".to_vec())), &source).await.unwrap();
    assert!(!outcomes[0].is_success());
    assert_eq!(store.read("output/gone.bin").await.unwrap(), None);
}
