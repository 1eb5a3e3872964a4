//! Background eviction of abandoned sessions

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SessionStore;

/// Evict every session idle for longer than `ttl`. Returns how many were removed.
///
/// Works from a snapshot and re-checks each candidate under the store lock,
/// so the lock is never held across the whole sweep.
pub fn sweep(sessions: &SessionStore, ttl: Duration) -> usize {
    let now = sessions.now();
    let Some(cutoff) = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
    else {
        return 0;
    };

    sessions
        .snapshot()
        .into_iter()
        .filter(|(_, last_activity)| *last_activity < cutoff)
        .filter(|(user, _)| sessions.remove_if_idle(*user, cutoff))
        .count()
}

/// Periodic task running [`sweep`]
pub struct Reaper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Reaper {
    /// Spawn the reaper on the current tokio runtime
    pub fn start(sessions: Arc<SessionStore>, interval: Duration, ttl: Duration) -> Self {
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
                    _ = ticker.tick() => {
                        let evicted = sweep(&sessions, ttl);
                        if evicted > 0 {
                            debug!(evicted, remaining = sessions.len(), "Expired sessions evicted");
                        }
                    }
                }
            }

            debug!("Session reaper stopped");
        });

        info!(
            interval_secs = period.as_secs(),
            ttl_secs = ttl.as_secs(),
            "Session reaper started"
        );
        Self { cancel, handle }
    }

    /// Stop the reaper without a final sweep and wait for it to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Session reaper did not shut down cleanly");
        }
    }
}
