//! Event lifecycle status

use alior_api::{Event, EventStatus};
use alior_store::{Store, StoreError};
use alior_util::Clock;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Status of an event at `now`. Both ends of the interval are inclusive.
pub fn resolve(now: DateTime<Local>, start: DateTime<Local>, duration: Duration) -> EventStatus {
    if now < start {
        return EventStatus::Scheduled;
    }

    let end = chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| start.checked_add_signed(d));
    match end {
        Some(end) if now > end => EventStatus::Completed,
        _ => EventStatus::InProgress,
    }
}

/// Status of a stored event. An all-day event without a duration spans its day.
pub fn status_of(event: &Event, now: DateTime<Local>) -> EventStatus {
    let duration = if event.all_day && event.duration.is_zero() {
        ONE_DAY
    } else {
        event.duration
    };
    resolve(now, event.start, duration)
}

/// Recompute statuses, writing only the ones that changed.
///
/// `events` is updated in place. Returns the number of writes.
pub fn sync_statuses(
    store: &dyn Store,
    events: &mut [Event],
    now: DateTime<Local>,
) -> Result<usize, StoreError> {
    let mut updated = 0;
    for event in events.iter_mut() {
        let status = status_of(event, now);
        if status == event.status {
            continue;
        }
        store.set_event_status(event.id, status)?;
        trace!(event_id = %event.id, from = ?event.status, to = ?status, "Event status changed");
        event.status = status;
        updated += 1;
    }
    Ok(updated)
}

/// One pass over every stored event
pub fn sweep_statuses(store: &dyn Store, now: DateTime<Local>) -> Result<usize, StoreError> {
    let mut events = store.list_events()?;
    sync_statuses(store, &mut events, now)
}

/// Background task keeping stored statuses current
pub struct StatusSweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StatusSweeper {
    /// Spawn the sweeper on the current tokio runtime. The first pass runs immediately.
    pub fn start(store: Arc<dyn Store>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let store = store.clone();
                let now = clock.now();
                match tokio::task::spawn_blocking(move || sweep_statuses(store.as_ref(), now)).await {
                    Ok(Ok(0)) => trace!("Status sweep found nothing to update"),
                    Ok(Ok(updated)) => info!(updated, "Event statuses updated"),
                    Ok(Err(e)) => warn!(error = %e, "Status sweep failed"),
                    Err(e) => error!(error = %e, "Status sweep task panicked"),
                }
            }

            debug!("Status sweeper stopped");
        });

        info!(interval_secs = period.as_secs(), "Status sweeper started");
        Self { cancel, handle }
    }

    /// Stop the sweeper and wait for it to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Status sweeper did not shut down cleanly");
        }
    }
}
