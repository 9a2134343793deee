use crate::bus::EventBus;
use crate::event::{EventData, EventOrigin, EVENT_TIME_CHANGED};
use crate::remote::codec::wire_time;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Periodically fire a local `time_changed` event
///
/// Runs until its task is aborted. Ticks missed under load are skipped
/// rather than fired in a burst.
pub async fn run_timer(bus: Arc<dyn EventBus>, period: Duration) {
    // A zero period would panic in `interval`
    let mut ticker = interval(period.max(super::MIN_TIMER_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut data = EventData::new();
        data.insert("now".to_string(), json!(wire_time::to_string(&Utc::now())));
        bus.fire(EVENT_TIME_CHANGED, data, EventOrigin::Local);
    }
}
