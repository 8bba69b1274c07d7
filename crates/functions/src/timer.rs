//! Timer-triggered sample.

use chrono::Local;
use fnhost_engine::{FunctionDescriptor, HandlerOutput, handler_fn};
use fnhost_types::TriggerBinding;

pub const TIMER_TRIGGER: &str = "TimerTrigger";

/// Every five minutes, on the minute.
pub const TIMER_SCHEDULE: &str = "0 */5 * * * *";

pub fn timer_trigger() -> FunctionDescriptor {
    FunctionDescriptor::new(
        TIMER_TRIGGER,
        TriggerBinding::timer(TIMER_SCHEDULE),
        handler_fn(|args, _, context| {
            let past_due = args
                .trigger
                .as_json()
                .and_then(|info| info.get("isPastDue"))
                .and_then(|value| value.as_bool())
                .unwrap_or(false);
            if past_due {
                context.logger().warn("Timer is running late.");
            }
            context.logger().info(format!(
                "Timer trigger function executed at: {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f")
            ));
            Ok(HandlerOutput::none())
        }),
    )
    .with_trigger_name("timerInfo")
}
