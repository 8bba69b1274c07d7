use std::sync::Arc;
use std::time::Duration;

use fnhost_engine::{BlobStore, FunctionDescriptor, FunctionRegistry, HandlerOutput, MemoryBlobStore, ShutdownOutcome, handler_fn};
use fnhost_server::{Environment, HostConfig, HostServer, RunningHost};
use fnhost_types::{AuthLevel, BindingDecl, DataShape, HttpMethod, HttpResponse, TriggerBinding};
use serde_json::Value;

fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .register(FunctionDescriptor::new(
            "Hello",
            TriggerBinding::http([HttpMethod::Get, HttpMethod::Post]).with_auth_level(AuthLevel::Function),
            handler_fn(|args, _, _| {
                let name = args
                    .http_request()
                    .and_then(|request| request.query_param("name").map(str::to_string));
                Ok(match name {
                    Some(name) => HttpResponse::ok(format!("Hello, {name}!")).into(),
                    None => HttpResponse::bad_request("Please pass a name on the query string").into(),
                })
            }),
        ))
        .unwrap();
    registry
        .register(FunctionDescriptor::new(
            "Silent",
            TriggerBinding::http([HttpMethod::Post]).with_auth_level(AuthLevel::Anonymous),
            handler_fn(|_, _, _| Ok(HandlerOutput::none())),
        ))
        .unwrap();
    registry
        .register(
            FunctionDescriptor::new(
                "Copy",
                TriggerBinding::blob("inbox/{name}", DataShape::Binary),
                handler_fn(|args, outputs, _| {
                    outputs.set("outputBlob", args.trigger.clone())?;
                    Ok(HandlerOutput::none())
                }),
            )
            .with_output(BindingDecl::output("outputBlob", "outbox/{name}", DataShape::Binary)),
        )
        .unwrap();
    registry
}

fn config(environment: Environment) -> HostConfig {
    let mut config = HostConfig::default();
    config.environment = environment;
    config.http.bind_address = "127.0.0.1:0".to_string();
    config.storage.poll_interval = Duration::from_secs(3600);
    config.shutdown_grace_period = Duration::from_secs(1);
    config.keys.master = Some("master-key".to_string());
    config.keys.functions.insert("Hello".to_string(), "hello-key".to_string());
    config
}

async fn start(environment: Environment) -> (RunningHost, Arc<MemoryBlobStore>) {
    let store = Arc::new(MemoryBlobStore::new());
    let running = HostServer::with_store(config(environment), registry(), store.clone())
        .start()
        .await
        .unwrap();
    (running, store)
}

#[tokio::test]
async fn serves_http_functions_under_the_route_prefix() {
    let (running, _) = start(Environment::Local).await;
    let client = reqwest::Client::new();
    let base = running.function_base_url();

    let response = client.get(format!("{base}/Hello")).query(&[("name", "World")]).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "Hello, World!");

    let response = client.get(format!("{base}/hello")).send().await.unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "Please pass a name on the query string");

    let response = client.post(format!("{base}/Silent")).send().await.unwrap();
    assert_eq!(response.status(), 204);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_routes_and_methods_are_rejected() {
    let (running, _) = start(Environment::Local).await;
    let client = reqwest::Client::new();
    let base = running.function_base_url();

    assert_eq!(client.get(format!("{base}/Missing")).send().await.unwrap().status(), 404);
    assert_eq!(client.get(format!("http://{}/Hello", running.bound_address())).send().await.unwrap().status(), 404);
    assert_eq!(client.delete(format!("{base}/Hello")).send().await.unwrap().status(), 405);
    assert_eq!(client.get(format!("{base}/Silent")).send().await.unwrap().status(), 405);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn hosted_environment_requires_function_keys() {
    let (running, _) = start(Environment::Hosted).await;
    let client = reqwest::Client::new();
    let url = format!("{}/Hello", running.function_base_url());

    let response = client.get(&url).query(&[("name", "A")]).send().await.unwrap();
    assert_eq!(response.status(), 401);

    let response = client.get(&url).query(&[("name", "A"), ("code", "wrong")]).send().await.unwrap();
    assert_eq!(response.status(), 401);

    let response = client.get(&url).query(&[("name", "A"), ("code", "hello-key")]).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(&url)
        .query(&[("name", "A")])
        .header("x-functions-key", "master-key")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client.post(format!("{}/Silent", running.function_base_url())).send().await.unwrap();
    assert_eq!(response.status(), 204);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn admin_status_lists_registered_functions() {
    let (running, _) = start(Environment::Hosted).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/admin/host/status", running.bound_address());

    assert_eq!(client.get(&url).send().await.unwrap().status(), 401);

    let response = client.get(&url).header("x-functions-key", "master-key").send().await.unwrap();
    assert_eq!(response.status(), 200);
    let status: Value = response.json().await.unwrap();
    assert_eq!(status["state"], "running");
    assert_eq!(status["environment"], "hosted");
    let names: Vec<&str> = status["functions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|function| function["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Hello", "Silent", "Copy"]);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn admin_invoke_runs_blob_functions() {
    let (running, store) = start(Environment::Local).await;
    store.write("inbox/note.txt", b"payload").await.unwrap();
    let client = reqwest::Client::new();
    let base = format!("http://{}/admin/functions", running.bound_address());

    let response = client
        .post(format!("{base}/Copy"))
        .body(r#"{"input": "inbox/note.txt"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["status"], "succeeded");
    assert_eq!(summary["committed"][0], "outbox/note.txt");
    assert_eq!(store.read("outbox/note.txt").await.unwrap(), Some(b"payload".to_vec()));

    assert_eq!(client.post(format!("{base}/Copy")).send().await.unwrap().status(), 400);
    assert_eq!(client.post(format!("{base}/Hello")).send().await.unwrap().status(), 400);
    assert_eq!(client.post(format!("{base}/Nope")).send().await.unwrap().status(), 404);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn stop_drains_and_refuses_new_dispatches() {
    let (running, _) = start(Environment::Local).await;
    let host = running.host().clone();
    assert!(host.is_accepting());

    assert_eq!(running.stop().await.unwrap(), ShutdownOutcome::Drained);
    assert!(!host.is_accepting());
    assert_eq!(host.in_flight(), 0);
}
