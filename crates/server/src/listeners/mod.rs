//! Trigger listeners: adapters that turn external occurrences into trigger events.

pub mod blob;
pub mod http;
pub mod timer;

pub use blob::{BlobListener, PollSummary, spawn_blob_listener};
pub use http::{FUNCTION_KEY_HEADER, FUNCTION_KEY_QUERY, HttpListenerState, router, to_axum_response};
pub use timer::{spawn_timer_listeners, timer_payload};
