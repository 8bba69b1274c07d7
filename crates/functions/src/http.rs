//! HTTP-triggered samples.

use std::time::Duration;

use fnhost_engine::{FunctionDescriptor, HandlerError, HandlerOutput, InvocationArgs, handler_fn};
use fnhost_types::{AuthLevel, HttpMethod, HttpResponse, RetryPolicy, TriggerBinding};

pub const HTTP_TRIGGER: &str = "HttpTriggerKotlin";
pub const HTTP_EXAMPLE_RETRY: &str = "HttpExampleRetry";
pub const HTTP_TRIGGER_RUNTIME_VERSION: &str = "HttpTriggerRuntimeVersion";

/// Body of the 400 answer when no name was supplied.
pub const MISSING_NAME_MESSAGE: &str = "Please pass a name on the query string or in the request body";

/// Attempts `HttpExampleRetry` fails before answering.
const FAILING_ATTEMPTS: u32 = 2;

fn http_get_post() -> TriggerBinding {
    TriggerBinding::http([HttpMethod::Get, HttpMethod::Post]).with_auth_level(AuthLevel::Function)
}

/// Greets the name found in the body, falling back to the `name` query parameter.
fn greet(args: &InvocationArgs) -> Result<HandlerOutput, HandlerError> {
    let request = args
        .http_request()
        .ok_or_else(|| HandlerError::permanent("trigger payload is not an HTTP request"))?;
    let name = request.body_text().or_else(|| request.query_param("name"));
    let response = match name {
        Some(name) => HttpResponse::ok(format!("Hello, {name}!")),
        None => HttpResponse::bad_request(MISSING_NAME_MESSAGE),
    };
    Ok(response.into())
}

/// `GET|POST /api/HttpTriggerKotlin`
pub fn http_trigger() -> FunctionDescriptor {
    FunctionDescriptor::new(
        HTTP_TRIGGER,
        http_get_post(),
        handler_fn(|args, _, context| {
            if let Some(request) = args.http_request() {
                context
                    .logger()
                    .info(format!("HTTP trigger processed a {} request.", request.method));
            }
            greet(args)
        }),
    )
    .with_trigger_name("req")
}

/// Same contract as [`http_trigger`], but the first two attempts of every
/// invocation fail so the fixed-delay policy is exercised.
pub fn http_example_retry() -> FunctionDescriptor {
    FunctionDescriptor::new(
        HTTP_EXAMPLE_RETRY,
        http_get_post(),
        handler_fn(|args, _, context| {
            let attempt = context.attempt();
            context
                .logger()
                .info(format!("HTTP trigger processed a request, attempt {}.", attempt + 1));
            if attempt < FAILING_ATTEMPTS {
                return Err(HandlerError::new(format!("simulated failure on attempt {}", attempt + 1)));
            }
            greet(args)
        }),
    )
    .with_trigger_name("req")
    .with_retry(RetryPolicy::fixed_delay(3, Duration::from_secs(5)))
}

/// Reports the host build and platform.
pub fn runtime_version() -> String {
    format!(
        "{} - {}/{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// `GET|POST /api/HttpTriggerRuntimeVersion`
pub fn http_trigger_runtime_version() -> FunctionDescriptor {
    FunctionDescriptor::new(
        HTTP_TRIGGER_RUNTIME_VERSION,
        http_get_post(),
        handler_fn(|_, _, context| {
            let version = runtime_version();
            context
                .logger()
                .info(format!("Function - {HTTP_TRIGGER_RUNTIME_VERSION} {version}"));
            Ok(HttpResponse::ok(format!("{HTTP_TRIGGER_RUNTIME_VERSION} {version}")).into())
        }),
    )
    .with_trigger_name("req")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fnhost_engine::{DispatchHost, FunctionRegistry, InvocationError, MemoryBlobStore};
    use fnhost_types::{HttpRequest, Payload, TriggerEvent, TriggerSource};

    use super::*;

    fn host() -> DispatchHost {
        let mut registry = FunctionRegistry::new();
        registry.register(http_trigger()).unwrap();
        registry.register(http_example_retry()).unwrap();
        registry.register(http_trigger_runtime_version()).unwrap();
        DispatchHost::new(registry, Arc::new(MemoryBlobStore::new()))
    }

    fn request(method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest::new(method, path)
    }

    async fn call(host: &DispatchHost, request: HttpRequest) -> fnhost_engine::DispatchOutcome {
        let source = TriggerSource::Http {
            method: request.method,
            path: request.path.clone(),
        };
        let mut outcomes = host.dispatch(TriggerEvent::new(Payload::Http(request)), &source).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        outcomes.remove(0)
    }

    #[tokio::test]
    async fn greets_from_query_or_body() {
        let host = host();

        let outcome = call(&host, request(HttpMethod::Get, HTTP_TRIGGER).with_query("name", "World")).await;
        let response = outcome.response().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "Hello, World!");
        assert_eq!(outcome.logs[0].message, "HTTP trigger processed a GET request.");

        let outcome = call(
            &host,
            request(HttpMethod::Post, HTTP_TRIGGER)
                .with_query("name", "Query")
                .with_body("Body"),
        )
        .await;
        assert_eq!(outcome.response().unwrap().body, "Hello, Body!");
    }

    #[tokio::test]
    async fn missing_name_is_a_bad_request() {
        let outcome = call(&host(), request(HttpMethod::Post, HTTP_TRIGGER).with_body("")).await;
        let response = outcome.response().unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body, MISSING_NAME_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_sample_succeeds_on_third_attempt() {
        let outcome = call(&host(), request(HttpMethod::Get, HTTP_EXAMPLE_RETRY).with_query("name", "Retry")).await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retry_delays, vec![Duration::from_secs(5); 2]);
        assert_eq!(outcome.response().unwrap().body, "Hello, Retry!");
        assert_eq!(outcome.logs.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_sample_counts_attempts_per_invocation() {
        let host = host();
        let (first, second) = tokio::join!(
            call(&host, request(HttpMethod::Get, HTTP_EXAMPLE_RETRY).with_query("name", "A")),
            call(&host, request(HttpMethod::Get, HTTP_EXAMPLE_RETRY).with_query("name", "B")),
        );
        assert_eq!(first.attempts, 3);
        assert_eq!(second.attempts, 3);
        assert!(!matches!(first.result, Err(InvocationError::ExhaustedRetries { .. })));
    }

    #[tokio::test]
    async fn runtime_version_reports_platform() {
        let outcome = call(&host(), request(HttpMethod::Get, HTTP_TRIGGER_RUNTIME_VERSION)).await;
        let body = &outcome.response().unwrap().body;
        assert!(body.starts_with("HttpTriggerRuntimeVersion "));
        assert!(body.ends_with(&format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH)));
    }
}
