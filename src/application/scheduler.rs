//! Cancellable timers feeding the softphone event loop
//!
//! Timers never touch state directly: they post a message back onto the
//! runtime's queue, where it is handled like any other event.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Periodic tick source, restarted from zero on every `start()`
pub struct Ticker {
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self { period, task: None }
    }

    /// Start ticking, replacing any previous tick task
    pub fn start<T, F>(&mut self, tx: mpsc::UnboundedSender<T>, message: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        self.stop();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(message()).is_err() {
                    debug!("Ticker receiver gone; stopping");
                    break;
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One-shot delayed messages; only cancelled all at once on teardown
#[derive(Default)]
pub struct Delays {
    tasks: Vec<JoinHandle<()>>,
}

impl Delays {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<T>(&mut self, delay: Duration, tx: mpsc::UnboundedSender<T>, message: T)
    where
        T: Send + 'static,
    {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message);
        }));
    }

    pub fn cancel_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }
}

impl Drop for Delays {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
