//! Install step: populate the new version's cache instance from the manifest.
//!
//! All-or-nothing. Every manifest URL is fetched concurrently and must come
//! back with a 2xx status; only then are the instance and its entries written,
//! in one transaction. A partial asset set never reaches the store.

use futures::future::try_join_all;
use seamcache_core::{CacheDb, CacheInstance, Error, Manifest, Network, Request, Response};
use url::Url;

/// Fetch one manifest URL, turning a non-success status into an error.
async fn fetch_asset(network: &dyn Network, url: Url) -> Result<(Request, Response), Error> {
    let request = Request::get(url);
    let response = network
        .fetch(&request)
        .await
        .map_err(|e| Error::InstallFailed(format!("{}: {}", request.url, e)))?;

    if !response.status.is_success() {
        return Err(Error::InstallFailed(format!("{}: status {}", request.url, response.status.as_u16())));
    }

    Ok((request, response))
}

/// Fetch every manifest entry and store them all in `cache_name`, then run an
/// eviction pass against `size_budget`.
pub async fn run(
    db: &CacheDb, network: &dyn Network, manifest: &Manifest, origin: &Url, cache_name: &str, size_budget: u64,
) -> Result<CacheInstance, Error> {
    let urls = manifest
        .resolve(origin)
        .map_err(|e| Error::InstallFailed(e.to_string()))?;

    tracing::info!(instance = cache_name, assets = urls.len(), "installing cache");

    let pairs = try_join_all(urls.into_iter().map(|url| fetch_asset(network, url))).await?;
    let bytes: u64 = pairs.iter().map(|(_, response)| response.body_len()).sum();

    let cache = db.populate_instance(cache_name, pairs).await?;

    if let Err(e) = cache.limit_size(size_budget).await {
        tracing::warn!(instance = cache_name, error = %e, "eviction after install failed");
    }

    tracing::info!(instance = cache_name, bytes, "cache installed");
    Ok(cache)
}
