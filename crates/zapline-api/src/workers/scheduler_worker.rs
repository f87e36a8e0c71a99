//! Minute-tick worker
//!
//! Drives the core scheduler once a minute (scheduled broadcasts, deferred
//! notifications) and sweeps flow sessions idle for more than a day. A
//! broadcast interrupted by shutdown is not resumed mid-batch; the next
//! tick picks the state up where it stopped.

use crate::state::AppState;
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use zapline_core::store::SessionStore;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Hard ceiling for abandoned sessions, independent of per-flow timeouts
/// (the engine enforces those lazily on the next inbound event).
const SESSION_SWEEP_AGE_HOURS: i64 = 24;

pub async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    info!("scheduler worker started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                match state.scheduler.tick(now).await {
                    Ok(stats) => {
                        if stats.broadcasts_started > 0 || stats.notifications_sent > 0 {
                            info!(
                                broadcasts = stats.broadcasts_started,
                                notifications = stats.notifications_sent,
                                failed = stats.notifications_failed,
                                "scheduler tick"
                            );
                        }
                    }
                    Err(err) => error!("scheduler tick failed: {err}"),
                }

                let cutoff = now - ChronoDuration::hours(SESSION_SWEEP_AGE_HOURS);
                match state.store.delete_idle_since(cutoff).await {
                    Ok(0) => {}
                    Ok(swept) => info!(swept, "idle flow sessions removed"),
                    Err(err) => error!("session sweep failed: {err}"),
                }
            }
            _ = shutdown.changed() => {
                info!("scheduler worker stopping");
                break;
            }
        }
    }
}
