//! In-process network double for worker tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use http::StatusCode;
use seamcache_core::{Error, Network, Request, Response};
use url::Url;

pub fn origin() -> Url {
    Url::parse("http://app.test").unwrap()
}

pub fn url(path: &str) -> Url {
    origin().join(path).unwrap()
}

/// Routes keyed by absolute URL; unknown URLs answer 404. While offline every
/// fetch fails with a network error. Every call is recorded.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn route(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().insert(url.to_string(), (status, body.into()));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Recorded calls as `"METHOD url"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.ends_with(&format!(" {url}"))).count()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(format!("{} {}", request.method, request.url));

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("offline".into()));
        }

        let routes = self.routes.lock().unwrap();
        Ok(match routes.get(request.url.as_str()) {
            Some((status, body)) => Response::new(StatusCode::from_u16(*status).unwrap(), body.clone()),
            None => Response::new(StatusCode::NOT_FOUND, "not found"),
        })
    }
}
