//! Background maintenance
//!
//! Expired holds are swept server-side, but the sweep RPC still has to be
//! poked periodically. The task is fire-and-forget: a failed sweep is
//! logged and retried on the next interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gateway::BookingGateway;

/// Spawn the periodic expired-hold sweep
///
/// The first sweep runs one full interval after spawn, not immediately.
/// Abort the returned handle to stop the task.
pub fn spawn_hold_cleanup(
    gateway: Arc<dyn BookingGateway>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval's first tick completes immediately; skip it
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match gateway.cleanup_expired_holds().await {
                Ok(()) => tracing::debug!("Expired-hold sweep completed"),
                Err(error) => {
                    tracing::debug!(%error, "Expired-hold sweep failed, will retry next interval");
                },
            }
        }
    })
}
