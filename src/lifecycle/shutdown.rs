//! Shutdown coordination for the server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// User-supplied graceful-shutdown callback.
pub type ShutdownHook = Box<dyn FnOnce() + Send + 'static>;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that the accept loop and every connection
/// task subscribe to, plus the single shutdown-hook slot.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    /// Hook to run once, before the listener closes.
    hook: Mutex<Option<ShutdownHook>>,
    /// Set once any hook has run.
    fired: AtomicBool,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            hook: Mutex::new(None),
            fired: AtomicBool::new(false),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Install or replace the hook. `None` clears it.
    pub fn set_hook(&self, hook: Option<ShutdownHook>) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = hook;
    }

    /// Whether a hook is installed and has not run yet.
    pub fn has_hook(&self) -> bool {
        self.hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run the hook if present. The slot is emptied, so a hook runs at most once.
    ///
    /// Returns true if a hook ran.
    pub fn run_hook(&self) -> bool {
        let hook = self.hook.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(hook) = hook else {
            tracing::debug!("No shutdown hook to run");
            return false;
        };
        self.fired.store(true, Ordering::SeqCst);
        tracing::info!("Running shutdown hook");
        hook();
        true
    }

    /// Whether a hook has run on this coordinator.
    pub fn hook_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn hook_runs_once() {
        let shutdown = Shutdown::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        shutdown.set_hook(Some(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(shutdown.run_hook());
        assert!(!shutdown.run_hook());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(shutdown.hook_fired());
    }

    #[test]
    fn cleared_hook_does_not_run() {
        let shutdown = Shutdown::new();
        shutdown.set_hook(Some(Box::new(|| panic!("should not run"))));
        shutdown.set_hook(None);
        assert!(!shutdown.has_hook());
        assert!(!shutdown.run_hook());
    }

    #[test]
    fn empty_fire_does_not_block_later_hook() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.run_hook());
        assert!(!shutdown.hook_fired());

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        shutdown.set_hook(Some(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(shutdown.run_hook());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trigger_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx1 = shutdown.subscribe();
        let mut rx2 = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }
}
