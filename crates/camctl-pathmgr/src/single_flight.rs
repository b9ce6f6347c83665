//! Keyed call coalescing: concurrent callers that request the same key
//! while a call is in flight all observe the single in-flight result
//! rather than issuing duplicate work against the media server (spec
//! §4.3.2, §5).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// State of one in-flight (or just-completed) call, guarded by a single
/// mutex so a follower's "is it done yet" check and its registration to
/// be woken happen as one atomic step. Splitting those two across
/// separate lock acquisitions is what allows the leader to finish and
/// fire `notify_waiters()` in the gap, which `Notify` does not buffer
/// for waiters that show up afterward.
enum State<V> {
    Pending(Arc<Notify>),
    Done(V),
}

/// A keyed single-flight group. Keys are strings (path names in this
/// crate); values must be `Clone` since every waiter receives its own
/// copy of the completed result.
pub struct SingleFlight<V> {
    inflight: Mutex<HashMap<String, Arc<Mutex<State<V>>>>>,
}

impl<V: Clone> SingleFlight<V> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `make` for the first caller with a given `key`; any caller
    /// that arrives while that call is still running awaits the same
    /// result instead of invoking `make` again.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let (entry, is_leader) = {
            let mut guard = self.inflight.lock().await;
            if let Some(existing) = guard.get(key) {
                (existing.clone(), false)
            } else {
                let entry = Arc::new(Mutex::new(State::Pending(Arc::new(Notify::new()))));
                guard.insert(key.to_string(), entry.clone());
                (entry, true)
            }
        };

        if !is_leader {
            return Self::wait_for(&entry).await;
        }

        let value = make().await;
        {
            let mut state = entry.lock().await;
            let notify = match &*state {
                State::Pending(notify) => notify.clone(),
                State::Done(_) => unreachable!("leader transitions state exactly once"),
            };
            *state = State::Done(value.clone());
            notify.notify_waiters();
        }
        {
            let mut guard = self.inflight.lock().await;
            guard.remove(key);
        }
        value
    }

    /// Waits for `entry` to become `Done`, re-checking under the entry's
    /// own lock each time rather than reading state and awaiting a
    /// notification as two separate steps. `notify.notified()` is called
    /// while still holding the guard, so the leader — which needs the
    /// same lock to transition to `Done` and fire `notify_waiters()` —
    /// cannot do so until after this waiter has already registered.
    async fn wait_for(entry: &Arc<Mutex<State<V>>>) -> V {
        loop {
            let guard = entry.lock().await;
            let notify = match &*guard {
                State::Done(v) => return v.clone(),
                State::Pending(notify) => notify.clone(),
            };
            let notified = notify.notified();
            drop(guard);
            notified.await;
        }
    }
}

impl<V: Clone> Default for SingleFlight<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_collapse_to_one_execution() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let call_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let call_count = call_count.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("camera0", || async {
                        call_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        42
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_both_execute() {
        let flight: SingleFlight<u32> = SingleFlight::new();
        let a = flight.run("camera0", || async { 1 });
        let b = flight.run("camera1", || async { 2 });
        let (a, b) = tokio::join!(a, b);
        assert_eq!((a, b), (1, 2));
    }

    /// Regression test for a lost-wakeup race: a follower that joins
    /// just before the leader finishes must still observe the result,
    /// not hang forever waiting on a `notify_waiters()` call it missed.
    /// `multi_thread` is required — the race only manifests when the
    /// leader can genuinely run concurrently with the follower on a
    /// different OS thread, as it does under `camctl-controller`'s
    /// `#[tokio::main]`.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn late_joining_follower_still_observes_result() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        for _ in 0..200 {
            let flight = flight.clone();
            let leader = {
                let flight = flight.clone();
                tokio::spawn(async move { flight.run("camera0", || async { 7 }).await })
            };
            // Give the leader a head start so it is likely to be mid-`make`
            // or already transitioning to `Done` when the follower joins.
            tokio::task::yield_now().await;
            let follower = tokio::spawn(async move { flight.run("camera0", || async { 99 }).await });

            let (leader_result, follower_result) =
                tokio::time::timeout(Duration::from_secs(5), async {
                    tokio::join!(leader, follower)
                })
                .await
                .expect("single-flight waiter hung past the lost-wakeup window");
            assert_eq!(leader_result.unwrap(), 7);
            assert_eq!(follower_result.unwrap(), 7);
        }
    }
}
