//! Timer trigger listener.
//!
//! Runs one task per distinct schedule. Each task sleeps until the next
//! occurrence, then dispatches exactly one event for it.

use chrono::{DateTime, Utc};
use fnhost_engine::{CronSchedule, DispatchError, DispatchHost};
use fnhost_types::{Payload, TriggerEvent, TriggerSource};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lateness beyond which a tick is reported as past due.
const PAST_DUE_THRESHOLD_MS: i64 = 1_000;

/// Timer information handed to timer-triggered functions.
///
/// `last` is the previous occurrence this listener fired (if any), `next` the
/// occurrence after the current one.
pub fn timer_payload(last: Option<DateTime<Utc>>, next: Option<DateTime<Utc>>, is_past_due: bool) -> Payload {
    Payload::Structured(json!({
        "scheduleStatus": {
            "last": last.map(|time| time.to_rfc3339()),
            "next": next.map(|time| time.to_rfc3339()),
        },
        "isPastDue": is_past_due,
    }))
}

/// Spawn one ticking task per distinct schedule in the host's registry.
pub fn spawn_timer_listeners(host: &DispatchHost, cancellation_token: &CancellationToken) -> Vec<JoinHandle<()>> {
    host.registry()
        .schedules()
        .into_iter()
        .map(|schedule| {
            let host = host.clone();
            let shutdown = cancellation_token.child_token();
            tokio::spawn(run_schedule(host, schedule, shutdown))
        })
        .collect()
}

async fn run_schedule(host: DispatchHost, schedule: CronSchedule, shutdown: CancellationToken) {
    info!(schedule = %schedule.expression(), "timer listener started");
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        let Some(occurrence) = schedule.next_after(&now) else {
            warn!(schedule = %schedule.expression(), "schedule has no future occurrences; timer listener stopping");
            break;
        };
        let wait = (occurrence - now).to_std().unwrap_or_default();
        debug!(schedule = %schedule.expression(), next = %occurrence, "timer sleeping until next occurrence");

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let is_past_due = (Utc::now() - occurrence).num_milliseconds() > PAST_DUE_THRESHOLD_MS;
        let payload = timer_payload(last_fired, schedule.next_after(&occurrence), is_past_due);
        last_fired = Some(occurrence);

        let event = TriggerEvent::new(payload).at(occurrence);
        let source = TriggerSource::Timer {
            schedule: schedule.expression().to_string(),
        };
        let dispatcher = host.clone();
        tokio::spawn(async move {
            match dispatcher.dispatch(event, &source).await {
                Ok(outcomes) => debug!(source = %source, invocations = outcomes.len(), "timer tick dispatched"),
                Err(DispatchError::ShuttingDown) => debug!(source = %source, "timer tick dropped during shutdown"),
                Err(error) => warn!(source = %source, error = %error, "timer tick dispatch failed"),
            }
        });
    }

    info!(schedule = %schedule.expression(), "timer listener stopped");
}
