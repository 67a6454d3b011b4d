//! Background worker that periodically evicts stale conversations.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conversation::store::ConversationStore;

/// One eviction pass: the number of conversations removed, or `None` once
/// there is no store left to reap.
type EvictionPass = dyn Fn() -> Option<usize> + Send + Sync;

/// Periodic eviction worker.
///
/// Holds only a weak reference so the store can be dropped while the worker
/// sleeps; the worker exits on its next tick once the store is gone.
pub struct Reaper {
    pass: Arc<EvictionPass>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

/// Handle to a running reaper.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the worker to stop and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.task.await {
            warn!(?err, "Reaper task ended abnormally");
        }
    }

    /// Whether the worker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Reaper {
    /// Create a reaper for `store` ticking every `interval`.
    #[must_use]
    pub fn new(store: Weak<ConversationStore>, interval: Duration) -> Self {
        Self::with_pass(interval, move || {
            store.upgrade().map(|live| live.evict(false))
        })
    }

    /// Create a reaper running `pass` on the blocking pool every `interval`.
    ///
    /// The worker exits when `pass` returns `None`. A pass that panics is
    /// logged and the next tick runs as usual.
    #[must_use]
    pub fn with_pass<F>(interval: Duration, pass: F) -> Self
    where
        F: Fn() -> Option<usize> + Send + Sync + 'static,
    {
        Self {
            pass: Arc::new(pass),
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Spawn the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> ReaperHandle {
        let shutdown = Arc::clone(&self.shutdown);
        let task = tokio::spawn(async move {
            self.run().await;
        });
        ReaperHandle { shutdown, task }
    }

    async fn run(&self) {
        info!(interval = ?self.interval, "Starting conversation reaper");

        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {
                    let pass = Arc::clone(&self.pass);
                    match tokio::task::spawn_blocking(move || pass()).await {
                        Ok(None) => {
                            debug!("Conversation store dropped, reaper exiting");
                            break;
                        }
                        Ok(Some(0)) => debug!("Eviction pass removed nothing"),
                        Ok(Some(removed)) => debug!(removed, "Eviction pass completed"),
                        Err(err) => warn!(?err, "Eviction pass failed"),
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Conversation reaper shutting down");
                    break;
                }
            }
        }
    }
}
