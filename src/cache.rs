//! TTL caching with stale fallback.
//!
//! A [`TtlCache`] holds at most one [`CacheEntry`] behind an `Arc`. Refreshes
//! build a complete new entry and swap the pointer, so readers holding the old
//! `Arc` keep a consistent value until they drop it.

use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CollectError;
use crate::helpers::human_duration_secs;

#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    fetched: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            fetched: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched.elapsed()
    }
}

/// Where a returned snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Collected by this call.
    Live,
    /// Served from a cache entry younger than the TTL.
    Cache,
    /// Collection failed; this is the last successful entry.
    Stale,
}

#[derive(Debug)]
pub struct Snapshot<T> {
    pub entry: Arc<CacheEntry<T>>,
    pub source: Source,
}

impl<T> Snapshot<T> {
    pub fn is_stale(&self) -> bool {
        self.source == Source::Stale
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            entry: self.entry.clone(),
            source: self.source,
        }
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entry.value
    }
}

pub struct TtlCache<T> {
    label: &'static str,
    ttl: Duration,
    slot: RwLock<Option<Arc<CacheEntry<T>>>>,
}

impl<T> TtlCache<T> {
    pub fn new(label: &'static str, ttl: Duration) -> Self {
        Self {
            label,
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Most recent entry regardless of age.
    pub fn latest(&self) -> Option<Arc<CacheEntry<T>>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent entry if it is younger than the TTL.
    pub fn fresh(&self) -> Option<Arc<CacheEntry<T>>> {
        self.latest().filter(|e| e.age() < self.ttl)
    }

    pub fn replace(&self, value: T) -> Arc<CacheEntry<T>> {
        let entry = Arc::new(CacheEntry::new(value));
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(entry.clone());
        entry
    }

    /// Serves a fresh entry when allowed, otherwise runs `refresh`.
    ///
    /// A failed refresh falls back to the last entry of any age; only when
    /// there is none does the error reach the caller.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        cluster: &str,
        force_refresh: bool,
        refresh: F,
    ) -> Result<Snapshot<T>, CollectError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CollectError>>,
    {
        if !force_refresh {
            if let Some(entry) = self.fresh() {
                debug!("[{}] serving cached {}", cluster, self.label);
                return Ok(Snapshot {
                    entry,
                    source: Source::Cache,
                });
            }
        }

        match refresh().await {
            Ok(value) => Ok(Snapshot {
                entry: self.replace(value),
                source: Source::Live,
            }),
            Err(e) => match self.latest() {
                Some(entry) => {
                    warn!(
                        "[{}] collecting {} failed, serving data from {} ago: {}",
                        cluster,
                        self.label,
                        human_duration_secs(entry.age().as_secs() as i64),
                        e
                    );
                    Ok(Snapshot {
                        entry,
                        source: Source::Stale,
                    })
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unreachable() -> CollectError {
        CollectError::Unreachable {
            cluster: "test".to_string(),
            queries: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_reused() {
        let cache = TtlCache::new("counter", Duration::from_secs(30));
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let refresh =
            move || async move { Ok::<_, CollectError>(calls.fetch_add(1, Ordering::SeqCst)) };

        let first = cache.get_or_refresh("c", false, refresh).await.unwrap();
        assert_eq!(first.source, Source::Live);

        tokio::time::advance(Duration::from_secs(29)).await;
        let second = cache.get_or_refresh("c", false, refresh).await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert!(Arc::ptr_eq(&first.entry, &second.entry));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        let third = cache.get_or_refresh("c", false, refresh).await.unwrap();
        assert_eq!(third.source, Source::Live);
        assert_eq!(*third, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_bypasses_fresh_entry() {
        let cache = TtlCache::new("value", Duration::from_secs(30));
        cache.replace(1);

        let snap = cache
            .get_or_refresh("c", true, || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(snap.source, Source::Live);
        assert_eq!(*snap, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_falls_back_to_stale() {
        let cache = TtlCache::new("value", Duration::from_secs(30));
        let original = cache.replace(7);
        tokio::time::advance(Duration::from_secs(120)).await;

        let snap = cache
            .get_or_refresh("c", false, || async { Err(unreachable()) })
            .await
            .unwrap();
        assert!(snap.is_stale());
        assert!(Arc::ptr_eq(&snap.entry, &original));
        assert_eq!(snap.entry.age(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_failed_refresh_without_entry_errors() {
        let cache: TtlCache<u32> = TtlCache::new("value", Duration::from_secs(30));
        let err = cache
            .get_or_refresh("c", true, || async { Err(unreachable()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Unreachable { .. }));
        assert!(cache.latest().is_none());
    }
}
