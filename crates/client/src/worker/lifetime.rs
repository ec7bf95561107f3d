//! Explicit lifetime extension for event handlers.
//!
//! A handler hands back its result immediately but may still have work in
//! flight (write-through, background revalidation). That work is spawned
//! through [`WaitUntil::extend`] and the host awaits [`WaitUntil::settled`]
//! before treating the event as complete.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tokio::task::JoinSet;

/// Background work attached to one event.
///
/// Dropping a handle without settling it detaches the remaining tasks
/// instead of aborting them, so a write-through still lands.
#[derive(Debug, Default)]
pub struct WaitUntil {
    tasks: Mutex<JoinSet<()>>,
}

impl WaitUntil {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn `work` and keep the event alive until it finishes.
    pub fn extend<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks().spawn(work);
    }

    /// Number of tasks attached and not yet collected.
    pub fn pending(&self) -> usize {
        self.tasks().len()
    }

    /// Await every attached task. Returns how many completed without panicking.
    pub async fn settled(self) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks());
        let mut completed = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(()) => completed += 1,
                Err(e) => tracing::error!(error = %e, "extended task did not complete"),
            }
        }
        completed
    }
}

impl Drop for WaitUntil {
    fn drop(&mut self) {
        self.tasks().detach_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_settled_waits_for_all_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let wait = WaitUntil::new();

        for _ in 0..3 {
            let counter = counter.clone();
            wait.extend(async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(wait.pending(), 3);
        assert_eq!(wait.settled().await, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_settled_empty() {
        assert_eq!(WaitUntil::new().settled().await, 0);
    }

    #[tokio::test]
    async fn test_panicking_task_not_counted() {
        let wait = WaitUntil::new();
        wait.extend(async { panic!("write failed") });
        wait.extend(async {});

        assert_eq!(wait.settled().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_lets_tasks_finish() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let wait = WaitUntil::new();
        wait.extend(async move {
            tokio::task::yield_now().await;
            let _ = tx.send("stored");
        });
        drop(wait);

        assert_eq!(rx.await.unwrap(), "stored");
    }
}
