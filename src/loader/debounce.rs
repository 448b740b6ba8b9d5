//! Keyed trailing-edge debouncer
//!
//! The first submission for a key opens a burst and starts a timer. Every
//! further submission within the window replaces the burst's input and
//! pushes the deadline back. When the window passes with no new submission,
//! the action runs once with the latest input and every submitter of the
//! burst receives its result.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Result of a burst, shared by every submitter
///
/// Resolves to `None` only if the action was aborted (its task panicked).
pub type BurstOutcome<R> = Shared<BoxFuture<'static, Option<R>>>;

struct Burst<T, R> {
    input: T,
    deadline: Instant,
    outcome: BurstOutcome<R>,
}

/// Debounces actions per key
pub struct Debouncer<K, T, R>
where
    R: Clone,
{
    window: Duration,
    bursts: Arc<Mutex<HashMap<K, Burst<T, R>>>>,
}

impl<K, T, R> Debouncer<K, T, R>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Create a debouncer with the given quiet window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            bursts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Quiet window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Submit `input` for `key`
    ///
    /// If a burst is open, `input` supersedes its input and `action` is
    /// dropped unused. Otherwise a new burst is opened and `action` will run
    /// with whatever input is latest when the window closes.
    pub fn submit<F, Fut>(&self, key: K, input: T, action: F) -> BurstOutcome<R>
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let deadline = Instant::now() + self.window;
        let mut bursts = self.bursts.lock();

        if let Some(burst) = bursts.get_mut(&key) {
            burst.input = input;
            burst.deadline = deadline;
            return burst.outcome.clone();
        }

        let (tx, rx) = oneshot::channel();
        let outcome: BurstOutcome<R> = async move { rx.await.ok() }.boxed().shared();
        bursts.insert(
            key.clone(),
            Burst {
                input,
                deadline,
                outcome: outcome.clone(),
            },
        );
        drop(bursts);

        let bursts = Arc::clone(&self.bursts);
        tokio::spawn(async move {
            let Some(input) = Self::wait_for_quiet(&bursts, &key).await else {
                return;
            };
            let result = action(input).await;
            let _ = tx.send(result);
        });

        outcome
    }

    /// Replace the pending input of an open burst without joining it
    ///
    /// Returns false if no burst is open for `key`.
    pub fn retarget(&self, key: &K, input: T) -> bool {
        let mut bursts = self.bursts.lock();
        match bursts.get_mut(key) {
            Some(burst) => {
                burst.input = input;
                burst.deadline = Instant::now() + self.window;
                true
            },
            None => false,
        }
    }

    /// Whether a burst is waiting for its window to close
    pub fn is_pending(&self, key: &K) -> bool {
        self.bursts.lock().contains_key(key)
    }

    /// Sleep until the burst's deadline stops moving, then close it
    async fn wait_for_quiet(bursts: &Mutex<HashMap<K, Burst<T, R>>>, key: &K) -> Option<T> {
        loop {
            let deadline = {
                let mut guard = bursts.lock();
                let deadline = guard.get(key)?.deadline;
                if Instant::now() >= deadline {
                    return guard.remove(key).map(|b| b.input);
                }
                deadline
            };
            tokio::time::sleep_until(deadline).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once_with_latest_input() {
        let debouncer: Debouncer<&'static str, u32, u32> = Debouncer::new(Duration::from_millis(150));
        let runs = Arc::new(AtomicUsize::new(0));

        let r1 = runs.clone();
        let first = debouncer.submit("ep", 1, move |v| async move {
            r1.fetch_add(1, Ordering::SeqCst);
            v * 10
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(debouncer.is_pending(&"ep"));

        let r2 = runs.clone();
        let second = debouncer.submit("ep", 2, move |v| async move {
            r2.fetch_add(1, Ordering::SeqCst);
            v * 10
        });

        assert_eq!(first.await, Some(20));
        assert_eq!(second.await, Some(20));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending(&"ep"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_run_separately() {
        let debouncer: Debouncer<&'static str, u32, u32> = Debouncer::new(Duration::from_millis(150));

        let a = debouncer.submit("ep", 1, |v| async move { v });
        assert_eq!(a.await, Some(1));

        let b = debouncer.submit("ep", 2, |v| async move { v });
        assert_eq!(b.await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer: Debouncer<&'static str, u32, u32> = Debouncer::new(Duration::from_millis(150));
        let a = debouncer.submit("a", 1, |v| async move { v });
        let b = debouncer.submit("b", 2, |v| async move { v });
        assert_eq!(a.await, Some(1));
        assert_eq!(b.await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_changes_input() {
        let debouncer: Debouncer<&'static str, u32, u32> = Debouncer::new(Duration::from_millis(150));
        let outcome = debouncer.submit("ep", 1, |v| async move { v });
        assert!(debouncer.retarget(&"ep", 7));
        assert_eq!(outcome.await, Some(7));
        assert!(!debouncer.retarget(&"ep", 8));
    }
}
