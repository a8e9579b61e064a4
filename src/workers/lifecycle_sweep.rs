use crate::services::lifecycle_service::LifecycleEngine;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

/// Drives [`LifecycleEngine::sweep`] on a fixed interval.
///
/// The first sweep fires shortly after boot so notes that matured while the
/// process was down are picked up without waiting a full interval. Sweeps run
/// inline in this loop, so two of them never overlap; ticks missed while a slow
/// sweep was running are dropped rather than replayed.
#[derive(Debug)]
pub struct LifecycleSweepWorker {
    engine: LifecycleEngine,
}

impl LifecycleSweepWorker {
    #[must_use]
    pub const fn new(engine: LifecycleEngine) -> Self {
        Self { engine }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let timings = *self.engine.timings();
        let mut interval = tokio::time::interval_at(Instant::now() + timings.startup_delay, timings.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = timings.sweep_interval.as_secs(),
            startup_delay_secs = timings.startup_delay.as_secs(),
            "Lifecycle sweep worker started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    self.engine.sweep()
                        .instrument(tracing::info_span!("lifecycle_sweep_iteration"))
                        .await;
                }
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Lifecycle sweep loop shutting down...");
    }
}
