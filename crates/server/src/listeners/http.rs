//! HTTP trigger listener.
//!
//! Serves function routes under `/{routePrefix}/` plus a small admin surface:
//!
//! - `GET /admin/host/status`
//! - `POST /admin/functions/{name}` (manual trigger for timer and blob functions)

use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use fnhost_engine::{DispatchError, DispatchHost, DispatchOutcome, InvocationError};
use fnhost_types::{AuthLevel, HttpMethod, HttpRequest, HttpResponse, Payload, TriggerBinding, TriggerEvent, TriggerSource};
use fnhost_util::redact_secrets;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{Environment, KeysConfig};
use crate::listeners::timer::timer_payload;

/// Header carrying a function or master key.
pub const FUNCTION_KEY_HEADER: &str = "x-functions-key";
/// Query parameter carrying a function or master key.
pub const FUNCTION_KEY_QUERY: &str = "code";

const GENERIC_FAILURE_BODY: &str = "Function invocation failed";

/// Shared state of the HTTP listener.
#[derive(Debug, Clone)]
pub struct HttpListenerState {
    host: DispatchHost,
    route_prefix: String,
    environment: Environment,
    keys: KeysConfig,
}

impl HttpListenerState {
    pub fn new(host: DispatchHost, route_prefix: impl Into<String>, environment: Environment, keys: KeysConfig) -> Self {
        Self {
            host,
            route_prefix: route_prefix.into().trim_matches('/').to_string(),
            environment,
            keys,
        }
    }

    /// Path below the route prefix, or `None` when `path` lies outside it.
    fn function_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let path = path.trim_start_matches('/');
        if self.route_prefix.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.route_prefix.as_str())?;
        if rest.is_empty() {
            return Some(rest);
        }
        rest.strip_prefix('/')
    }

    fn supplied_key<'a>(query: &'a IndexMap<String, String>, headers: &'a HeaderMap) -> Option<&'a str> {
        query
            .get(FUNCTION_KEY_QUERY)
            .map(String::as_str)
            .or_else(|| headers.get(FUNCTION_KEY_HEADER).and_then(|value| value.to_str().ok()))
    }

    /// Whether the caller may invoke `function` at `level`.
    fn authorize(&self, level: AuthLevel, function: &str, supplied: Option<&str>) -> bool {
        if !self.environment.enforces_keys() || level == AuthLevel::Anonymous {
            return true;
        }
        let Some(supplied) = supplied else {
            return false;
        };
        let is_master = self.keys.master.as_deref() == Some(supplied);
        match level {
            AuthLevel::Admin => is_master,
            AuthLevel::Function => is_master || self.keys.functions.get(function).map(String::as_str) == Some(supplied),
            AuthLevel::Anonymous => true,
        }
    }
}

/// Build the listener's router.
pub fn router(state: Arc<HttpListenerState>) -> Router {
    Router::new()
        .route("/admin/host/status", get(host_status))
        .route("/admin/functions/{name}", post(admin_invoke))
        .fallback(function_request)
        .with_state(state)
}

async fn function_request(
    State(state): State<Arc<HttpListenerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<IndexMap<String, String>>,
    body: String,
) -> Response {
    let logged_uri = redact_secrets(&uri.to_string());
    debug!(method = %method, uri = %logged_uri, "http request received");

    let Some(path) = state.function_path(uri.path()) else {
        return plain(StatusCode::NOT_FOUND, "Not Found");
    };
    let Ok(method) = HttpMethod::from_str(method.as_str()) else {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    };

    let routes = state.host.registry().routes_matching(path);
    if routes.is_empty() {
        return plain(StatusCode::NOT_FOUND, "Not Found");
    }
    let Some(function) = routes.iter().find(|function| match function.descriptor().trigger() {
        TriggerBinding::Http { methods, .. } => methods.contains(&method),
        _ => false,
    }) else {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    };

    let level = function.auth_level().unwrap_or_default();
    if !state.authorize(level, function.name(), HttpListenerState::supplied_key(&query, &headers)) {
        warn!(function = %function.name(), uri = %logged_uri, "http request rejected: missing or invalid key");
        return plain(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let mut request = HttpRequest::new(method, path).with_body(body);
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    for (key, value) in &query {
        request = request.with_query(key.as_str(), value.as_str());
    }
    // Path captures are merged over these during dispatch.
    let mut event = TriggerEvent::new(Payload::Http(request));
    event.route_params = query;

    let source = TriggerSource::Http {
        method,
        path: path.to_string(),
    };
    match state.host.dispatch(event, &source).await {
        Ok(outcomes) => outcome_response(&outcomes),
        Err(DispatchError::ShuttingDown) => plain(StatusCode::SERVICE_UNAVAILABLE, "Host is shutting down"),
        Err(error) => {
            warn!(uri = %logged_uri, error = %error, "http dispatch rejected");
            plain(StatusCode::NOT_FOUND, "Not Found")
        }
    }
}

fn outcome_response(outcomes: &[DispatchOutcome]) -> Response {
    let Some(outcome) = outcomes.iter().find(|outcome| outcome.response().is_some()).or(outcomes.first()) else {
        return plain(StatusCode::NOT_FOUND, "Not Found");
    };
    match &outcome.result {
        Ok(success) => match &success.response {
            Some(response) => to_axum_response(response),
            None => StatusCode::NO_CONTENT.into_response(),
        },
        Err(InvocationError::Aborted) => plain(StatusCode::SERVICE_UNAVAILABLE, "Host is shutting down"),
        Err(_) => plain(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE_BODY),
    }
}

/// Convert a function's response, dropping headers that are not valid HTTP.
pub fn to_axum_response(response: &HttpResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut converted = Response::new(Body::from(response.body.clone()));
    *converted.status_mut() = status;
    for (name, value) in &response.headers {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                converted.headers_mut().insert(name, value);
            }
            _ => debug!(header = %name, "dropping invalid response header"),
        }
    }
    converted
}

fn plain(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionStatus {
    name: String,
    trigger: String,
}

async fn host_status(
    State(state): State<Arc<HttpListenerState>>,
    headers: HeaderMap,
    Query(query): Query<IndexMap<String, String>>,
) -> Response {
    if !state.authorize(AuthLevel::Admin, "", HttpListenerState::supplied_key(&query, &headers)) {
        return plain(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let functions: Vec<FunctionStatus> = state
        .host
        .registry()
        .iter()
        .map(|function| FunctionStatus {
            name: function.name().to_string(),
            trigger: function.trigger_summary(),
        })
        .collect();
    let body = json!({
        "state": if state.host.is_accepting() { "running" } else { "stopping" },
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.environment,
        "inFlight": state.host.in_flight(),
        "functions": functions,
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}

/// Body of a manual trigger request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminInvokeRequest {
    /// Blob path for blob-triggered functions.
    input: Option<String>,
}

async fn admin_invoke(
    State(state): State<Arc<HttpListenerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Query(query): Query<IndexMap<String, String>>,
    body: String,
) -> Response {
    if !state.authorize(AuthLevel::Admin, &name, HttpListenerState::supplied_key(&query, &headers)) {
        return plain(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let Some(function) = state.host.registry().get(&name).cloned() else {
        return plain(StatusCode::NOT_FOUND, "Not Found");
    };
    let request: AdminInvokeRequest = if body.trim().is_empty() {
        AdminInvokeRequest::default()
    } else {
        match serde_json::from_str(&body) {
            Ok(request) => request,
            Err(error) => return (StatusCode::BAD_REQUEST, format!("invalid request body: {error}")).into_response(),
        }
    };

    let (event, source) = match function.descriptor().trigger() {
        TriggerBinding::Http { .. } => {
            return plain(StatusCode::BAD_REQUEST, "HTTP functions are invoked through their route");
        }
        TriggerBinding::Timer { schedule } => {
            let now = chrono::Utc::now();
            let next = function.schedule().and_then(|schedule| schedule.next_after(&now));
            let event = TriggerEvent::new(timer_payload(None, next, false)).at(now);
            (event, TriggerSource::Timer { schedule: schedule.clone() })
        }
        TriggerBinding::Blob { .. } => {
            let Some(path) = request.input else {
                return plain(StatusCode::BAD_REQUEST, "blob functions require an \"input\" blob path");
            };
            let bytes = match state.host.store().read(&path).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return (StatusCode::BAD_REQUEST, format!("blob '{path}' does not exist")).into_response(),
                Err(error) => return (StatusCode::BAD_REQUEST, error.to_string()).into_response(),
            };
            (TriggerEvent::new(Payload::Binary(bytes)), TriggerSource::Blob { path })
        }
    };

    info!(function = %name, source = %source, "manual trigger requested");
    match state.host.invoke(&name, event, &source).await {
        Ok(outcome) => (StatusCode::ACCEPTED, axum::Json(outcome.summary())).into_response(),
        Err(DispatchError::UnknownFunction { .. }) => plain(StatusCode::NOT_FOUND, "Not Found"),
        Err(DispatchError::ShuttingDown) => plain(StatusCode::SERVICE_UNAVAILABLE, "Host is shutting down"),
    }
}
