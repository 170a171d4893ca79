//! Background task supervision.
//!
//! Long-running loops (cache poller, GC scanner, reconciler) are owned by a
//! [`TaskGroup`] tied to the process lifecycle. Components receive explicit
//! handles at construction instead of registering with globals; shutdown
//! flips a shared signal and then awaits every loop, so in-flight work
//! drains before the group returns.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cloneable shutdown signal handed to every supervised loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is requested.
    ///
    /// Loops select on this against their interval tick so they stop
    /// promptly instead of waiting out the current sleep.
    pub async fn wait(&mut self) {
        // An error means the sender is gone, which is shutdown too.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Supervisor for a set of named background loops.
///
/// Loops are spawned with [`TaskGroup::spawn`] and stopped together by
/// [`TaskGroup::shutdown`], which signals first and then joins every
/// handle in spawn order.
pub struct TaskGroup {
    tx: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    /// Creates an empty task group.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx,
            handles: Vec::new(),
        }
    }

    /// Returns a fresh shutdown signal bound to this group.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Spawns a named loop, handing it a shutdown signal.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signal = self.signal();
        tracing::debug!(task = name, "spawning background task");
        self.handles.push((name, tokio::spawn(task(signal))));
    }

    /// Signals shutdown and awaits every spawned loop.
    pub async fn shutdown(self) {
        let _ = self.tx.send(true);
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(task = name, error = %e, "background task aborted");
            } else {
                tracing::debug!(task = name, "background task stopped");
            }
        }
    }
}
