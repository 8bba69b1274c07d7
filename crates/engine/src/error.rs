//! Error types for registration, binding resolution, and invocation.

use fnhost_util::{TemplateError, UnresolvedPlaceholderError};
use thiserror::Error;

use crate::schedule::ScheduleError;
use crate::store::StoreError;

/// Errors raised while registering a function. All of them abort startup.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("a function named '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("invalid function name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("function '{function}' binding '{binding}': {source}")]
    UnresolvedPlaceholder {
        function: String,
        binding: String,
        source: UnresolvedPlaceholderError,
    },

    #[error("function '{function}' binding '{binding}' has a malformed path pattern: {source}")]
    InvalidPattern {
        function: String,
        binding: String,
        source: TemplateError,
    },

    #[error("function '{function}' has an invalid schedule: {source}")]
    InvalidSchedule { function: String, source: ScheduleError },

    #[error("function '{function}' route '{route}' overlaps the route of '{existing}'")]
    RouteConflict {
        function: String,
        route: String,
        existing: String,
    },

    #[error("function '{function}' is misconfigured: {reason}")]
    InvalidDescriptor { function: String, reason: String },
}

impl RegistrationError {
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_descriptor(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            function: function.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while turning binding declarations into values or sinks.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error(transparent)]
    UnresolvedPlaceholder(#[from] UnresolvedPlaceholderError),

    #[error("binding '{binding}' has a malformed path pattern: {source}")]
    InvalidPattern { binding: String, source: TemplateError },

    #[error("binding '{binding}' could not be resolved from {location}: {reason}")]
    Resolution {
        binding: String,
        location: String,
        reason: String,
    },
}

impl BindingError {
    pub fn resolution(binding: impl Into<String>, location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            binding: binding.into(),
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Missing or mismatched resources may appear later; malformed declarations never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BindingError::Resolution { .. })
    }
}

/// Whether a handler failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerErrorKind {
    #[default]
    Transient,
    Permanent,
}

/// Failure reported by a function body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub kind: HandlerErrorKind,
}

impl HandlerError {
    /// A transient failure, retried per the function's policy.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: HandlerErrorKind::Transient,
        }
    }

    /// A failure that no amount of retrying will fix.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: HandlerErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == HandlerErrorKind::Transient
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> Self {
        HandlerError::new(format!("{error:#}"))
    }
}

/// Terminal failure of one invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("binding resolution failed: {0}")]
    Binding(#[from] BindingError),

    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("output commit to '{path}' failed: {source}")]
    Commit { path: String, source: StoreError },

    #[error("retries exhausted after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: Box<InvocationError> },

    #[error("invocation aborted by host shutdown")]
    Aborted,
}

impl InvocationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            InvocationError::Binding(error) => error.is_retryable(),
            InvocationError::Handler(error) => error.is_retryable(),
            InvocationError::Commit { .. } => true,
            InvocationError::ExhaustedRetries { .. } | InvocationError::Aborted => false,
        }
    }

    /// Stable label for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::Binding(BindingError::UnresolvedPlaceholder(_)) => "unresolved_placeholder",
            InvocationError::Binding(_) => "binding_resolution",
            InvocationError::Handler(_) => "handler",
            InvocationError::Commit { .. } => "output_commit",
            InvocationError::ExhaustedRetries { .. } => "exhausted_retries",
            InvocationError::Aborted => "aborted",
        }
    }
}

/// Errors raised by the dispatch host before any invocation starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("host is shutting down and no longer accepts dispatches")]
    ShuttingDown,

    #[error("no function named '{name}' is registered")]
    UnknownFunction { name: String },
}
