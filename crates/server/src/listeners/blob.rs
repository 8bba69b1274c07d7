//! Blob trigger listener.
//!
//! Polls the blob store, fingerprinting each object by its etag. A new or changed
//! object under a blob trigger pattern is dispatched; a failed delivery is retried
//! on later polls until the object is poisoned.

use std::collections::HashMap;
use std::time::Duration;

use fnhost_engine::{DispatchError, DispatchHost};
use fnhost_types::{Payload, TriggerEvent, TriggerSource};
use fnhost_util::PathTemplate;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct DeliveryState {
    etag: String,
    failed_attempts: u32,
    delivered: bool,
    poisoned: bool,
}

impl DeliveryState {
    fn new(etag: String) -> Self {
        Self {
            etag,
            failed_attempts: 0,
            delivered: false,
            poisoned: false,
        }
    }

    fn is_settled(&self) -> bool {
        self.delivered || self.poisoned
    }
}

/// Result of one poll, mostly useful for tests and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollSummary {
    pub delivered: usize,
    pub failed: usize,
    pub poisoned: usize,
}

/// Watches the host's blob store for objects matching its blob triggers.
#[derive(Debug)]
pub struct BlobListener {
    host: DispatchHost,
    patterns: Vec<PathTemplate>,
    max_delivery_attempts: u32,
    deliveries: HashMap<String, DeliveryState>,
}

impl BlobListener {
    pub fn new(host: DispatchHost, max_delivery_attempts: u32) -> Self {
        let patterns = host.registry().blob_patterns();
        Self {
            host,
            patterns,
            max_delivery_attempts: max_delivery_attempts.max(1),
            deliveries: HashMap::new(),
        }
    }

    pub fn has_triggers(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// List the store once and deliver every new, changed, or previously failed object.
    pub async fn poll_once(&mut self) -> Result<PollSummary, DispatchError> {
        let entries = match self.host.store().list("").await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(error = %error, "blob listener could not list the store");
                return Ok(PollSummary::default());
            }
        };

        let watched: Vec<_> = entries
            .into_iter()
            .filter(|entry| self.patterns.iter().any(|pattern| pattern.matches(&entry.path).is_some()))
            .collect();
        self.deliveries
            .retain(|path, _| watched.iter().any(|entry| &entry.path == path));

        let mut pending = Vec::new();
        for entry in watched {
            let state = self
                .deliveries
                .entry(entry.path.clone())
                .or_insert_with(|| DeliveryState::new(entry.etag.clone()));
            if state.etag != entry.etag {
                debug!(path = %entry.path, "blob changed");
                *state = DeliveryState::new(entry.etag.clone());
            }
            if !state.is_settled() {
                pending.push(entry.path);
            }
        }

        let deliveries = pending.into_iter().map(|path| {
            let host = self.host.clone();
            async move {
                let result = deliver(&host, &path).await;
                (path, result)
            }
        });
        let results = join_all(deliveries).await;

        let mut summary = PollSummary::default();
        for (path, result) in results {
            let delivered = match result {
                Ok(delivered) => delivered,
                Err(DispatchError::ShuttingDown) => return Err(DispatchError::ShuttingDown),
                Err(error) => {
                    warn!(path = %path, error = %error, "blob dispatch rejected");
                    false
                }
            };
            let Some(state) = self.deliveries.get_mut(&path) else {
                continue;
            };
            if delivered {
                state.delivered = true;
                summary.delivered += 1;
                continue;
            }
            state.failed_attempts += 1;
            if state.failed_attempts >= self.max_delivery_attempts {
                state.poisoned = true;
                summary.poisoned += 1;
                error!(path = %path, attempts = state.failed_attempts, "blob poisoned; skipping until it changes");
            } else {
                summary.failed += 1;
                warn!(path = %path, attempts = state.failed_attempts, "blob delivery failed; will retry on next poll");
            }
        }
        Ok(summary)
    }

    /// Poll every `interval` until `shutdown` is cancelled. The first poll runs immediately.
    pub async fn run(mut self, interval: Duration, shutdown: CancellationToken) {
        info!(patterns = self.patterns.len(), interval_ms = interval.as_millis() as u64, "blob listener started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(DispatchError::ShuttingDown) = self.poll_once().await {
                        break;
                    }
                }
            }
        }
        info!("blob listener stopped");
    }
}

/// Read one object and dispatch it. `Ok(false)` means an invocation failed or the object vanished.
async fn deliver(host: &DispatchHost, path: &str) -> Result<bool, DispatchError> {
    let bytes = match host.store().read(path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(path = %path, "blob vanished before delivery");
            return Ok(false);
        }
        Err(error) => {
            warn!(path = %path, error = %error, "blob could not be read");
            return Ok(false);
        }
    };

    let source = TriggerSource::Blob { path: path.to_string() };
    let outcomes = host.dispatch(TriggerEvent::new(Payload::Binary(bytes)), &source).await?;
    Ok(outcomes.iter().all(|outcome| outcome.is_success()))
}

/// Spawn the polling task when the registry has blob triggers.
pub fn spawn_blob_listener(
    host: &DispatchHost,
    poll_interval: Duration,
    max_delivery_attempts: u32,
    cancellation_token: &CancellationToken,
) -> Option<JoinHandle<()>> {
    let listener = BlobListener::new(host.clone(), max_delivery_attempts);
    if !listener.has_triggers() {
        return None;
    }
    Some(tokio::spawn(listener.run(poll_interval, cancellation_token.child_token())))
}
