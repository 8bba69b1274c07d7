//! # Fnhost Engine
//!
//! The Fnhost Engine registers functions with typed trigger bindings and dispatches
//! trigger events to them. It resolves declared input and output bindings against
//! a blob store, invokes the function body, applies the function's retry policy,
//! and commits outputs only after the body succeeds.
//!
//! ## Key Features
//!
//! - **Registry**: Validated, name-unique function descriptors frozen at startup
//! - **Binding Resolution**: `{placeholder}` path substitution from trigger route parameters
//! - **Retry Policies**: Fixed-delay bounded retries with invocation-local state
//! - **Graceful Shutdown**: Drain in-flight invocations, then abort after a grace period
//!
//! ## Usage
//!
//! ```rust
//! use fnhost_engine::{FunctionDescriptor, FunctionRegistry, HandlerOutput, handler_fn};
//! use fnhost_types::{HttpMethod, HttpResponse, TriggerBinding};
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register(FunctionDescriptor::new(
//!     "Hello",
//!     TriggerBinding::http([HttpMethod::Get]),
//!     handler_fn(|_args, _outputs, _context| Ok(HandlerOutput::http(HttpResponse::ok("Hello!")))),
//! ))?;
//!
//! assert!(registry.contains("Hello"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`registry`**: Function registry and compiled trigger matchers
//! - **`resolver`**: Binding Resolver for inputs and deferred output sinks
//! - **`retry`**: Retry Policy Engine state machine
//! - **`host`**: Dispatch Host tying the pieces together
//! - **`store`**: Blob store trait with in-memory and filesystem implementations
//! - **`schedule`**: Six-field cron schedules for timer triggers

pub mod context;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod schedule;
pub mod store;

pub use context::{InvocationContext, InvocationLogger, LogLevel, LogRecord};
pub use descriptor::{FunctionDescriptor, FunctionHandler, HandlerOutput, InvocationArgs, OutputSink, OutputSinks, handler_fn};
pub use error::{BindingError, DispatchError, HandlerError, HandlerErrorKind, InvocationError, RegistrationError};
pub use host::{DispatchHost, DispatchOutcome, InvocationSuccess, OutcomeSummary, ShutdownOutcome};
pub use registry::{FunctionRegistry, RegisteredFunction, TriggerMatcher};
pub use resolver::{BindingResolver, resolve_path};
pub use retry::{RetryEngine, RetryReport, RetryState};
pub use schedule::{CronSchedule, ScheduleError};
pub use store::{BlobEntry, BlobStore, FsBlobStore, MemoryBlobStore, StoreError};
