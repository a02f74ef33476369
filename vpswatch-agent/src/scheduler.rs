//! Periodic timers driving the monitoring cycles
//!
//! Each timer is its own task and an explicit `Idle -> Running -> Idle`
//! machine: the job is awaited before the next tick is taken, and ticks
//! missed while `Running` are skipped, never queued.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
}

/// Handle on a spawned timer
pub struct PeriodicTimer {
    pub name: &'static str,
    state: watch::Receiver<TimerState>,
    task: JoinHandle<()>,
}

impl PeriodicTimer {
    /// Start `job` now and then every `period` until `shutdown` flips to true
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
        mut job: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(TimerState::Idle);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Timer {} started (every {:?})", name, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        state_tx.send_replace(TimerState::Running);
                        debug!("Timer {} firing", name);
                        job().await;
                        state_tx.send_replace(TimerState::Idle);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Timer {} stopped", name);
        });

        Self {
            name,
            state: state_rx,
            task,
        }
    }

    pub fn state(&self) -> TimerState {
        *self.state.borrow()
    }

    /// Wait for the timer task to finish (after shutdown)
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Timer {} task failed: {}", self.name, e);
        }
    }
}
