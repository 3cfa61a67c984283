//! Request interception: the per-request caching policy.
//!
//! ```text
//! dispatch ─┬─ bypass ──────────────► network (or 503)
//!           └─ lookup ─┬─ hit ──────► cached response + background revalidate (any status)
//!                      └─ miss ─┬───► network response (+ background store if 200)
//!                               ├───► offline page (document requests)
//!                               └───► 503
//! ```
//!
//! Every path ends in exactly one response; nothing here returns an error.
//! Writes for the same key from a revalidation and a miss can race; the last
//! one wins.

use seamcache_core::{CacheInstance, Request, Response};

use super::{Worker, store_and_evict};

impl Worker {
    /// Fetch event.
    pub async fn fetch(&self, request: Request) -> Response {
        if self.bypasses_cache(&request) {
            return self.passthrough(&request).await;
        }

        // not in control until an activation has succeeded
        let Some(cache) = self.serving() else {
            return self.passthrough(&request).await;
        };

        match cache.match_request(&request).await {
            Ok(Some(cached)) => {
                tracing::debug!(url = %request.url, "cache hit");
                self.revalidate(cache, request);
                return cached;
            }
            Ok(None) => tracing::debug!(url = %request.url, "cache miss"),
            Err(e) => tracing::warn!(url = %request.url, error = %e, "cache lookup failed; treating as miss"),
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(cache, request, response.clone());
                }
                response
            }
            Err(e) => {
                tracing::error!(url = %request.url, error = %e, "fetch failed");
                self.offline_fallback(&cache, &request).await
            }
        }
    }

    /// Writes and API calls never touch the cache.
    fn bypasses_cache(&self, request: &Request) -> bool {
        !request.is_read() || request.url.path().starts_with(&self.settings.api_prefix)
    }

    async fn passthrough(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(method = %request.method, url = %request.url, error = %e, "fetch failed");
                Response::unavailable()
            }
        }
    }

    /// Refresh a hit in the background.
    ///
    /// Whatever the upstream answers replaces the entry, error statuses
    /// included; only a transport failure keeps the stale copy.
    fn revalidate(&self, cache: CacheInstance, request: Request) {
        let network = self.network.clone();
        let budget = self.settings.size_budget;

        self.pending.wait_until(async move {
            match network.fetch(&request).await {
                Ok(fresh) => {
                    if !fresh.is_cacheable() {
                        tracing::debug!(url = %request.url, status = fresh.status.as_u16(), "revalidation replaced entry with non-200");
                    }
                    store_and_evict(&cache, &request, &fresh, budget).await;
                }
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "failed to revalidate cache entry");
                }
            }
        });
    }

    fn store(&self, cache: CacheInstance, request: Request, response: Response) {
        let budget = self.settings.size_budget;
        self.pending.wait_until(async move {
            store_and_evict(&cache, &request, &response, budget).await;
        });
    }

    async fn offline_fallback(&self, cache: &CacheInstance, request: &Request) -> Response {
        if !request.destination.is_document() {
            return Response::unavailable();
        }

        match cache.match_url(&self.settings.offline_page).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                tracing::warn!(url = %self.settings.offline_page, "offline page not cached");
                Response::unavailable()
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read offline page");
                Response::unavailable()
            }
        }
    }
}
