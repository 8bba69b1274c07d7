//! Transport-neutral HTTP request and response shapes handed to functions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::HttpMethod;

/// An HTTP request as seen by a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path relative to the route prefix, without a leading slash.
    pub path: String,
    #[serde(default)]
    pub query: IndexMap<String, String>,
    /// Header names are stored lower-cased.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// `None` when the request carried no body.
    #[serde(default)]
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: IndexMap::new(),
            headers: IndexMap::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Attach a body; an empty string is treated as no body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().filter(|body| !body.is_empty())
    }
}

/// The response a function returns for an HTTP trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl HttpResponse {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: String::new(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200).body(body)
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::with_status(400).body(body)
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_reads_as_absent() {
        let request = HttpRequest::new(HttpMethod::Post, "hello").with_body("");
        assert_eq!(request.body, None);
        assert_eq!(request.body_text(), None);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let request = HttpRequest::new(HttpMethod::Get, "hello").with_header("X-Functions-Key", "abc");
        assert_eq!(request.header("x-functions-key"), Some("abc"));
        assert_eq!(request.header("X-FUNCTIONS-KEY"), Some("abc"));
    }

    #[test]
    fn response_helpers_set_status_and_body() {
        let response = HttpResponse::bad_request("nope").header("content-type", "text/plain");
        assert_eq!(response.status, 400);
        assert_eq!(response.body, "nope");
        assert!(!response.is_success());
        assert!(HttpResponse::ok("fine").is_success());
    }
}
