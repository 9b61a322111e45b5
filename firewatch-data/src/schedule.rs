//! Cancellable timer loops owned by the component that starts them.

use std::{future::Future, time::Duration};

use log::debug;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A Tokio task invoking a callback once per period until stopped.
///
/// The first invocation happens one full period after spawning. Stopping
/// is deterministic: a tick in progress is abandoned at its next await
/// point and no further ticks run. Dropping the handle stops the task.
///
/// Must be spawned from within a Tokio runtime.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period`.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    () = tick() => {}
                }
            }
            debug!("periodic task {name} stopped");
        });
        debug!("periodic task {name} started with period {period:?}");
        Self {
            name,
            token,
            handle,
        }
    }

    /// Stop the task. Further calls are no-ops.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!("stopping periodic task {}", self.name);
            self.token.cancel();
        }
    }

    /// Whether the task has been stopped or has exited.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
