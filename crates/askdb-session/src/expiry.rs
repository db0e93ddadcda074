//! Background expiry sweep for idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::SessionStore;

/// Periodically retires sessions idle past the configured timeout.
///
/// Retired sessions linger as tombstones for one more timeout window so a
/// late client sees "expired" instead of "unknown", then get evicted.
pub struct ExpirySweeper {
    store: Arc<dyn SessionStore>,
    idle_timeout: Duration,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn SessionStore>, idle_timeout: Duration, interval: Duration) -> Self {
        Self {
            store,
            idle_timeout,
            interval,
        }
    }

    /// Spawn the sweep loop on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            idle_timeout = ?self.idle_timeout,
            interval = ?self.interval,
            "starting session expiry sweeper"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so a fresh server
            // does not sweep before any session exists
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.store.sweep_idle(self.idle_timeout).await {
                    Ok(retired) if retired.is_empty() => {
                        debug!("expiry sweep found nothing idle");
                    }
                    Ok(retired) => {
                        info!(count = retired.len(), "retired idle sessions");
                    }
                    Err(e) => {
                        warn!(error = %e, "expiry sweep failed");
                    }
                }
            }
        })
    }
}
