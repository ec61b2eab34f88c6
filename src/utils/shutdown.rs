//! Cooperative shutdown for background loops.
//!
//! One `ShutdownTrigger` fans out to any number of `Shutdown` listeners over a
//! `tokio::sync::watch` channel. Loops select on `Shutdown::wait` at every
//! suspension point and only check it between units of work.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Sending half of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half of the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl ShutdownTrigger {
    pub fn new() -> (Self, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, Shutdown { rx })
    }

    /// Signal every listener. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been triggered.
    ///
    /// Also resolves if every trigger was dropped, so an orphaned loop cannot
    /// outlive its owner.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Handle to a spawned background loop.
pub struct TaskHandle {
    name: &'static str,
    trigger: ShutdownTrigger,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `task` with its own shutdown signal.
    pub fn spawn<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (trigger, shutdown) = ShutdownTrigger::new();
        let join = tokio::spawn(task(shutdown));
        Self {
            name,
            trigger,
            join,
        }
    }

    /// Signal the task to stop. Does not wait.
    pub fn stop(&self) {
        self.trigger.trigger();
    }

    /// Signal the task to stop and wait for it to finish its current unit.
    pub async fn shutdown(self) {
        self.trigger.trigger();
        if let Err(e) = self.join.await {
            warn!(task = self.name, error = %e, "Background task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
