//! Size-bounded eviction.
//!
//! Keeps the aggregate body size of an instance under a byte budget by
//! deleting entries oldest-insertion-first. There is no access-time
//! tracking: an old entry that is revalidated constantly still goes before a
//! newer one nobody reads. This is insertion order standing in for LRU, not
//! LRU.

use super::entries::{CacheInstance, list_entries};
use crate::Error;
use tokio_rusqlite::params;

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub total_before: u64,
    pub total_after: u64,
    /// URLs of the removed entries, in removal order.
    pub evicted: Vec<String>,
}

impl CacheInstance {
    /// Evict oldest entries until the aggregate body size is within `budget`
    /// or the instance is empty.
    ///
    /// Sizing and deleting happen in one call on the database thread, so no
    /// other cache operation interleaves with a pass. An entry whose size
    /// cannot be read counts as zero; a failed delete is logged and skipped.
    pub async fn limit_size(&self, budget: u64) -> Result<EvictionReport, Error> {
        let name = self.name.clone();
        let report = self
            .db
            .conn
            .call(move |conn| -> Result<EvictionReport, Error> {
                let entries = list_entries(conn, &name)?;
                let total_before: u64 = entries.iter().map(|e| e.size).sum();

                let mut total = total_before;
                let mut evicted = Vec::new();
                for entry in &entries {
                    if total <= budget {
                        break;
                    }
                    match conn.execute(
                        "DELETE FROM cache_entries WHERE instance = ?1 AND key_hash = ?2",
                        params![name, entry.key_hash],
                    ) {
                        Ok(_) => {
                            total = total.saturating_sub(entry.size);
                            evicted.push(entry.url.clone());
                        }
                        Err(e) => {
                            tracing::warn!(instance = %name, url = %entry.url, error = %e, "failed to evict entry");
                        }
                    }
                }

                Ok(EvictionReport { total_before, total_after: total, evicted })
            })
            .await
            .map_err(Error::from)?;

        if report.evicted.is_empty() {
            tracing::trace!(instance = %self.name, total = report.total_after, budget, "cache within budget");
        } else {
            tracing::info!(
                instance = %self.name,
                evicted = report.evicted.len(),
                total_before = report.total_before,
                total_after = report.total_after,
                budget,
                "evicted oldest cache entries"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::CacheDb;
    use crate::cache::CacheInstance;
    use crate::model::{Request, Response};
    use http::StatusCode;
    use url::Url;

    fn request(path: &str) -> Request {
        Request::get(Url::parse("https://app.example").unwrap().join(path).unwrap())
    }

    async fn put(cache: &CacheInstance, path: &str, size: usize) {
        cache
            .put(&request(path), &Response::new(StatusCode::OK, vec![b'x'; size]))
            .await
            .unwrap();
    }

    async fn urls(cache: &CacheInstance) -> Vec<String> {
        cache.entries().await.unwrap().into_iter().map(|e| e.url).collect()
    }

    async fn instance() -> CacheInstance {
        CacheDb::open_in_memory().await.unwrap().open_instance("app-v1").await.unwrap()
    }

    #[tokio::test]
    async fn test_evicts_oldest_first() {
        let cache = instance().await;
        put(&cache, "/a", 40).await;
        put(&cache, "/b", 40).await;
        put(&cache, "/c", 40).await;

        let report = cache.limit_size(100).await.unwrap();

        assert_eq!(report.total_before, 120);
        assert_eq!(report.total_after, 80);
        assert_eq!(report.evicted, vec!["https://app.example/a"]);
        assert_eq!(urls(&cache).await, vec!["https://app.example/b", "https://app.example/c"]);
    }

    #[tokio::test]
    async fn test_under_budget_is_untouched() {
        let cache = instance().await;
        put(&cache, "/a", 40).await;
        put(&cache, "/b", 60).await;

        let report = cache.limit_size(100).await.unwrap();
        assert!(report.evicted.is_empty());
        assert_eq!(report.total_after, 100);
        assert_eq!(urls(&cache).await.len(), 2);
    }

    #[tokio::test]
    async fn test_evicts_exactly_enough_oldest_entries() {
        let cache = instance().await;
        for (path, size) in [("/a", 10), ("/b", 30), ("/c", 25), ("/d", 50), ("/e", 5)] {
            put(&cache, path, size).await;
        }

        // 120 total; dropping a (10), b (30) leaves 80 <= 90
        let report = cache.limit_size(90).await.unwrap();
        assert_eq!(report.evicted, vec!["https://app.example/a", "https://app.example/b"]);
        assert_eq!(report.total_after, 80);
        assert_eq!(cache.total_size().await.unwrap(), 80);
    }

    #[tokio::test]
    async fn test_single_oversized_entry_empties_cache() {
        let cache = instance().await;
        put(&cache, "/a", 10).await;
        put(&cache, "/huge", 500).await;

        let report = cache.limit_size(100).await.unwrap();
        assert_eq!(report.evicted.len(), 2);
        assert_eq!(report.total_after, 0);
        assert!(urls(&cache).await.is_empty());
    }

    #[tokio::test]
    async fn test_eviction_is_idempotent() {
        let cache = instance().await;
        for (path, size) in [("/a", 70), ("/b", 20), ("/c", 30)] {
            put(&cache, path, size).await;
        }

        cache.limit_size(60).await.unwrap();
        let after_first = urls(&cache).await;
        let second = cache.limit_size(60).await.unwrap();

        assert!(second.evicted.is_empty());
        assert_eq!(urls(&cache).await, after_first);
    }

    #[tokio::test]
    async fn test_revalidated_entry_keeps_its_age() {
        let cache = instance().await;
        put(&cache, "/a", 40).await;
        put(&cache, "/b", 40).await;
        // a fresh copy of /a does not move it behind /b
        put(&cache, "/a", 40).await;
        put(&cache, "/c", 40).await;

        let report = cache.limit_size(100).await.unwrap();
        assert_eq!(report.evicted, vec!["https://app.example/a"]);
    }

    #[tokio::test]
    async fn test_unreadable_size_counts_as_zero() {
        let cache = instance().await;
        put(&cache, "/a", 40).await;
        cache
            .db
            .conn
            .call(|conn| conn.execute("UPDATE cache_entries SET body = NULL WHERE url = 'https://app.example/a'", []))
            .await
            .unwrap();
        put(&cache, "/b", 60).await;
        put(&cache, "/c", 60).await;

        let report = cache.limit_size(100).await.unwrap();

        assert_eq!(report.total_before, 120);
        // /a frees nothing, so the pass keeps going to /b
        assert_eq!(report.evicted, vec!["https://app.example/a", "https://app.example/b"]);
        assert_eq!(report.total_after, 60);
        assert_eq!(urls(&cache).await, vec!["https://app.example/c"]);
    }

    #[tokio::test]
    async fn test_empty_cache() {
        let cache = instance().await;
        let report = cache.limit_size(0).await.unwrap();
        assert_eq!(report, Default::default());
    }
}
