//! Per-invocation context handed to function bodies.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Severity of a line written through an [`InvocationLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line logged by a function body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub attempt: u32,
    pub message: String,
}

/// Log sink scoped to one invocation.
///
/// Lines are emitted as tracing events tagged with the invocation id and function
/// name, and captured so the dispatch outcome can report them.
#[derive(Debug)]
pub struct InvocationLogger {
    invocation_id: String,
    function_name: String,
    attempt: AtomicU32,
    records: Mutex<Vec<LogRecord>>,
}

impl InvocationLogger {
    fn new(invocation_id: String, function_name: String) -> Self {
        Self {
            invocation_id,
            function_name,
            attempt: AtomicU32::new(0),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(function = %self.function_name, invocation_id = %self.invocation_id, "{message}");
        self.record(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(function = %self.function_name, invocation_id = %self.invocation_id, "{message}");
        self.record(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(function = %self.function_name, invocation_id = %self.invocation_id, "{message}");
        self.record(LogLevel::Error, message);
    }

    fn record(&self, level: LogLevel, message: String) {
        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            attempt: self.attempt.load(Ordering::Relaxed),
            message,
        };
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
    }
}

/// Identity and logging for one invocation. Created when dispatch selects a
/// function and dropped when the invocation ends.
#[derive(Debug)]
pub struct InvocationContext {
    invocation_id: String,
    function_name: String,
    logger: InvocationLogger,
}

impl InvocationContext {
    pub fn new(function_name: impl Into<String>) -> Self {
        let function_name = function_name.into();
        let invocation_id = Uuid::new_v4().to_string();
        Self {
            logger: InvocationLogger::new(invocation_id.clone(), function_name.clone()),
            invocation_id,
            function_name,
        }
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn logger(&self) -> &InvocationLogger {
        &self.logger
    }

    /// Zero-based attempt number within this invocation's retry loop.
    pub fn attempt(&self) -> u32 {
        self.logger.attempt.load(Ordering::Relaxed)
    }

    pub(crate) fn begin_attempt(&self, attempt: u32) {
        self.logger.attempt.store(attempt, Ordering::Relaxed);
    }

    /// Drain the captured log lines.
    pub fn take_logs(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.logger.records.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
