//! Trigger events delivered by listeners to the dispatch host.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::Payload;

/// One external occurrence, ready to be dispatched.
///
/// `trigger` is the value produced by the trigger itself (request, blob bytes, timer
/// info). `payloads` carries additional named values keyed by binding name.
/// `route_params` holds values captured from the source path; the host merges in
/// captures from each matched function's pattern before resolving bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub trigger: Payload,
    pub payloads: IndexMap<String, Payload>,
    pub route_params: IndexMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(trigger: Payload) -> Self {
        Self {
            trigger,
            payloads: IndexMap::new(),
            route_params: IndexMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, binding_name: impl Into<String>, payload: Payload) -> Self {
        self.payloads.insert(binding_name.into(), payload);
        self
    }

    pub fn with_route_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.route_params.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
