//! Trigger declarations and the event sources that fire them.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shape of the data carried by a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DataShape {
    /// Raw bytes, passed through untouched.
    #[default]
    Binary,
    /// UTF-8 text.
    Text,
    /// JSON document.
    Structured,
}

impl fmt::Display for DataShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataShape::Binary => write!(f, "binary"),
            DataShape::Text => write!(f, "text"),
            DataShape::Structured => write!(f, "structured"),
        }
    }
}

/// Key requirement for HTTP-triggered functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AuthLevel {
    /// No key required.
    Anonymous,
    /// The function key or the master key.
    #[default]
    Function,
    /// The master key only.
    Admin,
}

/// HTTP methods a trigger may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for unsupported HTTP method names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported HTTP method: {0}")]
pub struct UnknownMethodError(pub String);

impl FromStr for HttpMethod {
    type Err = UnknownMethodError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(UnknownMethodError(value.to_string())),
        }
    }
}

/// The trigger a function is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TriggerBinding {
    /// Fires on HTTP requests matching the route and one of the methods.
    Http {
        /// Route template below the host's route prefix; defaults to the function name.
        #[serde(default)]
        route: Option<String>,
        methods: IndexSet<HttpMethod>,
        #[serde(default)]
        auth_level: AuthLevel,
    },
    /// Fires on a six-field cron schedule.
    Timer { schedule: String },
    /// Fires when an object under the path pattern appears or changes.
    Blob {
        path_pattern: String,
        #[serde(default)]
        data_shape: DataShape,
    },
}

impl TriggerBinding {
    /// HTTP trigger on the function's default route with `Function` auth.
    pub fn http<I>(methods: I) -> Self
    where
        I: IntoIterator<Item = HttpMethod>,
    {
        TriggerBinding::Http {
            route: None,
            methods: methods.into_iter().collect(),
            auth_level: AuthLevel::Function,
        }
    }

    pub fn timer(schedule: impl Into<String>) -> Self {
        TriggerBinding::Timer { schedule: schedule.into() }
    }

    pub fn blob(path_pattern: impl Into<String>, data_shape: DataShape) -> Self {
        TriggerBinding::Blob {
            path_pattern: path_pattern.into(),
            data_shape,
        }
    }

    /// Override the route of an HTTP trigger. Other triggers are returned unchanged.
    pub fn with_route(self, new_route: impl Into<String>) -> Self {
        match self {
            TriggerBinding::Http { methods, auth_level, .. } => TriggerBinding::Http {
                route: Some(new_route.into()),
                methods,
                auth_level,
            },
            other => other,
        }
    }

    /// Override the auth level of an HTTP trigger. Other triggers are returned unchanged.
    pub fn with_auth_level(self, level: AuthLevel) -> Self {
        match self {
            TriggerBinding::Http { route, methods, .. } => TriggerBinding::Http {
                route,
                methods,
                auth_level: level,
            },
            other => other,
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerBinding::Http { .. } => TriggerKind::Http,
            TriggerBinding::Timer { .. } => TriggerKind::Timer,
            TriggerBinding::Blob { .. } => TriggerKind::Blob,
        }
    }
}

/// Discriminant of [`TriggerBinding`] and [`TriggerSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    Http,
    Timer,
    Blob,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Http => write!(f, "http"),
            TriggerKind::Timer => write!(f, "timer"),
            TriggerKind::Blob => write!(f, "blob"),
        }
    }
}

/// Where a trigger event came from, used to select matching functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TriggerSource {
    /// An HTTP request; `path` is relative to the route prefix, without leading slash.
    Http { method: HttpMethod, path: String },
    /// A tick of the given schedule.
    Timer { schedule: String },
    /// A created or updated object in the blob store.
    Blob { path: String },
}

impl TriggerSource {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerSource::Http { .. } => TriggerKind::Http,
            TriggerSource::Timer { .. } => TriggerKind::Timer,
            TriggerSource::Blob { .. } => TriggerKind::Blob,
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Http { method, path } => write!(f, "http {method} /{path}"),
            TriggerSource::Timer { schedule } => write!(f, "timer '{schedule}'"),
            TriggerSource::Blob { path } => write!(f, "blob {path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_method_parses_case_insensitively() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("POST".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert!("BREW".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn trigger_binding_deserializes_from_tagged_yaml() {
        let yaml = r#"
type: http
route: items/{id}
methods: [GET, POST]
authLevel: anonymous
"#;
        let binding: TriggerBinding = serde_yaml::from_str(yaml).expect("parse trigger");
        match binding {
            TriggerBinding::Http { route, methods, auth_level } => {
                assert_eq!(route.as_deref(), Some("items/{id}"));
                assert!(methods.contains(&HttpMethod::Get));
                assert!(methods.contains(&HttpMethod::Post));
                assert_eq!(auth_level, AuthLevel::Anonymous);
            }
            other => panic!("expected http trigger, got {other:?}"),
        }
    }

    #[test]
    fn blob_trigger_defaults_to_binary_shape() {
        let binding: TriggerBinding = serde_json::from_str(r#"{"type":"blob","pathPattern":"input/{name}"}"#).unwrap();
        assert_eq!(binding, TriggerBinding::blob("input/{name}", DataShape::Binary));
    }

    #[test]
    fn route_and_auth_overrides_only_touch_http() {
        let http = TriggerBinding::http([HttpMethod::Get])
            .with_route("hello")
            .with_auth_level(AuthLevel::Admin);
        assert!(matches!(
            http,
            TriggerBinding::Http { ref route, auth_level: AuthLevel::Admin, .. } if route.as_deref() == Some("hello")
        ));

        let timer = TriggerBinding::timer("0 * * * * *").with_route("ignored");
        assert_eq!(timer, TriggerBinding::timer("0 * * * * *"));
    }
}
