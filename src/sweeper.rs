//! Background eviction loops.
//!
//! Each component with time-bounded state implements [`Sweep`]; a sweeper
//! task calls it on a fixed interval until its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// State that can shed expired entries
pub trait Sweep: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Remove expired state, returning how many entries were dropped
    fn sweep(&self) -> usize;
}

/// Spawn a task that sweeps `target` every `every` until `shutdown` is cancelled.
///
/// The first sweep happens one full interval after spawning.
pub fn spawn_sweeper<S: Sweep>(
    target: Arc<S>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(component = target.name(), interval = ?every, "Sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = target.sweep();
                    debug!(component = target.name(), removed, "Sweep finished");
                }
            }
        }

        info!(component = target.name(), "Sweeper stopped");
    })
}
