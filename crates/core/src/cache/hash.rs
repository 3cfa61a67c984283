//! Canonical request identity and its storage key.

use http::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// Compute the storage key for a request identity.
///
/// The fragment never reaches the network, so it is not part of the identity.
pub fn compute_cache_key(method: &Method, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
