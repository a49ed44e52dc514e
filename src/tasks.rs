//! Shared pool for short-lived background tasks, with an explicit drain
//! signal. Work that must not be dropped at shutdown checks the return of
//! [`TaskPool::run_async_task`] and falls back to running inline.

use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct PoolState {
    active: usize,
    draining: bool,
}

/// Tracks the store's background tasks so shutdown can wait for them.
///
/// The pool spawns onto the ambient tokio runtime; it owns no threads of its
/// own. Once [`drain`] has been called, new submissions are declined and the
/// caller is expected to run its work synchronously instead.
///
/// [`drain`]: Self::drain
#[derive(Debug, Default)]
pub struct TaskPool {
    state: Mutex<PoolState>,
    drained: Notify,
}

/// Decrements the active count when the task finishes, even if it panics.
struct ActiveTask(Arc<TaskPool>);

impl Drop for ActiveTask {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().expect("task pool lock poisoned");
        state.active -= 1;
        if state.draining && state.active == 0 {
            self.0.drained.notify_waiters();
        }
    }
}

impl TaskPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Default::default())
    }

    /// Spawn `fut` as a background task. Returns `false` without spawning iff
    /// the pool is draining.
    pub fn run_async_task<F>(self: &Arc<Self>, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        {
            let mut state = self.state.lock().expect("task pool lock poisoned");
            if state.draining {
                return false;
            }
            state.active += 1;
        }

        let guard = ActiveTask(Arc::clone(self));
        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });
        true
    }

    /// Whether the pool has started draining.
    pub fn is_draining(&self) -> bool {
        self.state
            .lock()
            .expect("task pool lock poisoned")
            .draining
    }

    /// Decline further submissions and wait for all active tasks to finish.
    pub async fn drain(&self) {
        loop {
            // Register interest before checking, so a task finishing in
            // between cannot slip its notification past us.
            let notified = self.drained.notified();
            {
                let mut state = self.state.lock().expect("task pool lock poisoned");
                state.draining = true;
                if state.active == 0 {
                    return;
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_spawned_task_runs() {
        let pool = TaskPool::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        assert!(pool.run_async_task(async move {
            tx.send(42).unwrap();
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_drain_declines_new_tasks() {
        let pool = TaskPool::new();
        pool.drain().await;

        assert!(pool.is_draining());
        assert!(
            !pool.run_async_task(async {}),
            "a draining pool should decline submissions"
        );
    }

    #[tokio::test]
    async fn test_drain_waits_for_active_tasks() {
        let pool = TaskPool::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (done_tx, mut done_rx) = tokio::sync::oneshot::channel::<()>();

        assert!(pool.run_async_task(async move {
            release_rx.await.unwrap();
            done_tx.send(()).unwrap();
        }));

        // The task is still parked on the release channel, so drain must not
        // complete yet.
        let drain = pool.drain();
        tokio::pin!(drain);
        tokio::select! {
            _ = &mut drain => panic!("drain finished with a task still active"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }
        assert!(done_rx.try_recv().is_err());

        release_tx.send(()).unwrap();
        drain.await;
    }
}
