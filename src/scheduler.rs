//! Periodic driver for [`DeliveryCycle`].
//!
//! The loop waits, runs one cycle to completion, and repeats. The next wait starts only after
//! the previous cycle returned, so cycles never overlap. It runs until [`SchedulerHandle::shutdown`]
//! is called; dropping the handle leaves it running for the life of the runtime.
use crate::delivery::DeliveryCycle;
use crate::error::TransportError;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::transport::DeliveryRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tower_service::Service;

/// Time between flush cycles.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Drives a [`DeliveryCycle`] on a fixed period.
#[derive(Debug)]
pub struct FlushScheduler<T> {
    cycle: DeliveryCycle<T>,
    interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl<T> FlushScheduler<T>
where
    T: Service<DeliveryRequest, Response = (), Error = TransportError> + Send + 'static,
    T::Future: Send,
{
    pub fn new(cycle: DeliveryCycle<T>) -> Self {
        Self { cycle, interval: DEFAULT_FLUSH_INTERVAL, sleeper: Arc::new(TokioSleeper) }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the loop on the current task until `stop` flips to `true`.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = self.sleeper.sleep(self.interval) => {}
                _ = stop_requested(&mut stop) => break,
            }
            let outcome = self.cycle.run().await;
            tracing::trace!(?outcome, "flush cycle finished");
            if *stop.borrow() {
                break;
            }
        }
        tracing::debug!("flush scheduler stopped");
    }

    /// Spawn the loop onto the tokio runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle { stop, task }
    }
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            // Sender gone: no stop signal can arrive any more.
            futures::future::pending::<()>().await;
        }
    }
}

/// Handle to a spawned [`FlushScheduler`].
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the loop to stop. A cycle already running completes first.
    pub fn shutdown(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }

    /// Stop and wait.
    pub async fn stop(self) -> Result<(), JoinError> {
        self.shutdown();
        self.join().await
    }
}
