//! Single-flight analysis cache keyed by fetch URL.
//!
//! At most one `compute` runs per key at any time. Callers arriving while a
//! computation is in flight wait for its outcome instead of starting their
//! own. Successes are stored; failures are handed to the waiters and then
//! forgotten, so the next call computes again.
//!
//! Entries optionally expire after a TTL and the number of stored entries can
//! be bounded, evicting the least recently used.

use glimpse_core::{AnalysisResult, Config};
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::AnalysisError;

type Outcome = Result<AnalysisResult, AnalysisError>;

struct Entry {
    result: AnalysisResult,
    stored_at: Instant,
}

struct CacheState {
    ready: LruCache<String, Entry>,
    in_flight: HashMap<String, watch::Sender<Option<Outcome>>>,
}

enum Lookup {
    Hit(AnalysisResult),
    Wait(watch::Receiver<Option<Outcome>>),
    Lead,
}

pub struct AnalysisCache {
    state: Mutex<CacheState>,
    ttl: Option<Duration>,
}

impl AnalysisCache {
    /// `max_entries` of `None` or zero means unbounded.
    pub fn new(ttl: Option<Duration>, max_entries: Option<usize>) -> Self {
        let ready = match max_entries.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            state: Mutex::new(CacheState {
                ready,
                in_flight: HashMap::new(),
            }),
            ttl,
        }
    }

    /// Cache without expiry or size bound.
    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_ttl, config.cache_max_entries)
    }

    /// Number of stored results, including any not yet swept after expiry.
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live result is stored for `url`. Does not touch recency.
    pub fn contains(&self, url: &str) -> bool {
        let state = self.lock();
        state
            .ready
            .peek(url)
            .map(|entry| !self.is_expired(entry))
            .unwrap_or(false)
    }

    /// Return the stored result for `url`, or run `compute` to produce it.
    ///
    /// `compute` is invoked only if this caller ends up owning the key's
    /// computation; a caller that waits on another's in-flight computation
    /// gets that outcome, success or failure.
    pub async fn get_or_compute<F, Fut>(&self, url: &str, compute: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let mut compute = Some(compute);

        loop {
            let lookup = self.lookup(url);
            match lookup {
                Lookup::Hit(result) => {
                    tracing::debug!(url = %url, "Analysis cache hit");
                    return Ok(result);
                }
                Lookup::Wait(mut rx) => {
                    tracing::debug!(url = %url, "Waiting on in-flight analysis");
                    let outcome = rx
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|value| (*value).clone());
                    match outcome {
                        Some(outcome) => return outcome,
                        // The owner went away without finishing; try again.
                        None => continue,
                    }
                }
                Lookup::Lead => {
                    let Some(compute) = compute.take() else {
                        // Unreachable: a caller leads at most once and returns.
                        continue;
                    };
                    tracing::debug!(url = %url, "Analysis cache miss, computing");

                    let mut guard = InFlightGuard {
                        cache: self,
                        key: url,
                        finished: false,
                    };
                    let outcome = compute().await;
                    guard.finished = true;
                    self.complete(url, &outcome);
                    return outcome;
                }
            }
        }
    }

    fn lookup(&self, url: &str) -> Lookup {
        let mut state = self.lock();

        let expired = match state.ready.get(url) {
            Some(entry) if !self.is_expired(entry) => return Lookup::Hit(entry.result.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            state.ready.pop(url);
        }

        if let Some(tx) = state.in_flight.get(url) {
            return Lookup::Wait(tx.subscribe());
        }

        let (tx, _) = watch::channel(None);
        state.in_flight.insert(url.to_string(), tx);
        Lookup::Lead
    }

    fn complete(&self, url: &str, outcome: &Outcome) {
        let mut state = self.lock();
        if let Ok(result) = outcome {
            state.ready.put(
                url.to_string(),
                Entry {
                    result: result.clone(),
                    stored_at: Instant::now(),
                },
            );
        }
        if let Some(tx) = state.in_flight.remove(url) {
            tx.send_replace(Some(outcome.clone()));
        }
    }

    fn abandon(&self, url: &str) {
        // Dropping the sender wakes waiters so one of them can take over.
        self.lock().in_flight.remove(url);
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        self.ttl
            .map(|ttl| entry.stored_at.elapsed() >= ttl)
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the in-flight slot if the owning caller is cancelled mid-compute.
struct InFlightGuard<'a> {
    cache: &'a AnalysisCache,
    key: &'a str,
    finished: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(url = %self.key, "In-flight analysis abandoned");
            self.cache.abandon(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_core::Caption;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn result(text: &str) -> AnalysisResult {
        AnalysisResult::from_captions(vec![Caption {
            text: text.to_string(),
            confidence: 0.9,
        }])
    }

    async fn must_not_run() -> Outcome {
        panic!("compute must not run on a cache hit")
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let cache = Arc::new(AnalysisCache::unbounded());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.spawn(async move {
                cache
                    .get_or_compute("http://media/cat.png", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(result("a cat"))
                    })
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), result("a cat"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("http://media/cat.png"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn stored_result_skips_compute() {
        let cache = AnalysisCache::unbounded();
        cache
            .get_or_compute("u", || async { Ok(result("first")) })
            .await
            .unwrap();

        let again = cache
            .get_or_compute("u", must_not_run)
            .await
            .unwrap();
        assert_eq!(again, result("first"));
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let cache = AnalysisCache::unbounded();

        let err = cache
            .get_or_compute("u", || async { Err(AnalysisError::EmptyBody) })
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::EmptyBody);
        assert!(!cache.contains("u"));
        assert!(cache.is_empty());

        let ok = cache
            .get_or_compute("u", || async { Ok(result("retried")) })
            .await
            .unwrap();
        assert_eq!(ok, result("retried"));
        assert!(cache.contains("u"));
    }

    #[tokio::test]
    async fn waiters_receive_the_owners_failure() {
        let cache = Arc::new(AnalysisCache::unbounded());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.spawn(async move {
                cache
                    .get_or_compute("u", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(AnalysisError::Status {
                            status: 500,
                            body: "boom".to_string(),
                        })
                    })
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap_err().status(), Some(500));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn different_keys_compute_independently() {
        let cache = AnalysisCache::unbounded();
        let a = cache.get_or_compute("a", || async { Ok(result("a")) });
        let b = cache.get_or_compute("b", || async { Ok(result("b")) });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), result("a"));
        assert_eq!(b.unwrap(), result("b"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let cache = AnalysisCache::new(Some(Duration::from_millis(20)), None);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_compute("u", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(result("x"))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.contains("u"));

        cache
            .get_or_compute("u", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(result("x"))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bounded_cache_evicts_least_recently_used() {
        let cache = AnalysisCache::new(None, Some(2));
        for key in ["a", "b"] {
            cache
                .get_or_compute(key, || async { Ok(result(key)) })
                .await
                .unwrap();
        }
        // Touch "a" so "b" becomes the eviction candidate.
        cache
            .get_or_compute("a", must_not_run)
            .await
            .unwrap();
        cache
            .get_or_compute("c", || async { Ok(result("c")) })
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[tokio::test]
    async fn cancelled_owner_hands_over_to_waiter() {
        let cache = Arc::new(AnalysisCache::unbounded());

        let owner = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute("u", || async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(result("never"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute("u", || async { Ok(result("takeover")) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        owner.abort();

        let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter stuck after owner was cancelled")
            .unwrap();
        assert_eq!(outcome.unwrap(), result("takeover"));
    }
}
