//! Shared type definitions for the fnhost trigger dispatch host.
//!
//! These types describe *what* a function is bound to: its trigger, its input and
//! output bindings, its retry policy, and the payloads that flow through an
//! invocation. They carry no behaviour beyond construction helpers and shape
//! conversions; the engine crate owns resolution and dispatch.

pub mod binding;
pub mod duration;
pub mod event;
pub mod http;
pub mod payload;
pub mod retry;
pub mod trigger;

pub use binding::{BindingDecl, Direction};
pub use duration::{DurationParseError, format_duration, parse_duration};
pub use event::TriggerEvent;
pub use http::{HttpRequest, HttpResponse};
pub use payload::{Payload, PayloadShapeError};
pub use retry::RetryPolicy;
pub use trigger::{AuthLevel, DataShape, HttpMethod, TriggerBinding, TriggerKind, TriggerSource, UnknownMethodError};
