//! Periodic refresh ticks

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Owned periodic task sending `tick` every `period`
///
/// The first tick comes one full period after start. Stops when cancelled,
/// when dropped, or when the receiver goes away.
pub struct RefreshSchedule {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshSchedule {
    pub fn start<T>(
        period: Duration,
        parent: &CancellationToken,
        tx: mpsc::Sender<T>,
        tick: T,
    ) -> Self
    where
        T: Clone + Send + 'static,
    {
        let token = parent.child_token();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = timer.tick() => {
                        if tx.send(tick.clone()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Refresh schedule stopped");
        });

        Self { token, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for RefreshSchedule {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
