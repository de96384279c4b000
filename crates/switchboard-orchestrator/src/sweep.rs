use crate::lifecycle::LifecycleManager;
use crate::persister::Persister;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Background task that periodically runs the auto-accept sweep.
///
/// Stopped explicitly with [`stop`](Self::stop); dropping it without stopping
/// leaves the loop running until the runtime shuts down.
pub struct AutoAcceptSweeper {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AutoAcceptSweeper {
    pub fn spawn(lifecycle: Arc<LifecycleManager>, persister: Persister, period: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            info!(period_ms = period.as_millis() as u64, "Auto-accept sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let accepted = lifecycle.sweep_auto_accept(Utc::now());
                        debug!(accepted = accepted.len(), "Auto-accept sweep finished");
                        for task in accepted {
                            persister.record_update(task);
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Auto-accept sweeper stopped");
        });
        Self { stop_tx, handle }
    }

    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
