//! Strategy dispatch.
//!
//! Each classified request is served by exactly one strategy:
//!
//! - excluded → straight to the network, the store is never touched
//! - shell-asset → stale-while-revalidate
//! - cross-origin → cache-first
//! - dynamic → network-first with cache fallback, no writes
//!
//! Cache writes in the first two strategies are fire-and-forget: the caller
//! gets its response without waiting on the put, and a write failure is
//! logged but never turns a successful fetch into a failure.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::classify::{Classifier, RouteClass};
use crate::cache::entry::RequestKey;
use crate::cache::lifecycle::Lifecycle;
use crate::cache::store::CacheStore;
use crate::fetch::{Fetch, FetchError, OriginRequest, OriginResponse};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Per-request strategy executor.
///
/// Holds the classifier and the lifecycle handle; consults the lifecycle
/// manager for the active store on every request rather than caching it, so
/// a generation swap takes effect immediately for in-flight clients.
pub struct Dispatcher {
    classifier: Classifier,
    lifecycle: Arc<Lifecycle>,
    fetcher: Arc<dyn Fetch>,
}

impl Dispatcher {
    pub fn new(classifier: Classifier, lifecycle: Arc<Lifecycle>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            classifier,
            lifecycle,
            fetcher,
        }
    }

    /// Classify and serve one request.
    pub async fn handle(&self, request: OriginRequest) -> Result<OriginResponse, DispatchError> {
        let class = self.classifier.classify(&request.method, &request.url);

        // Excluded requests bypass the controller entirely; and before any
        // generation has been activated there is no store to consult, so
        // everything degrades to pass-through.
        if class == RouteClass::Excluded {
            return Ok(self.fetcher.fetch(&request).await?);
        }
        let Some(store) = self.lifecycle.active_store().await else {
            return Ok(self.fetcher.fetch(&request).await?);
        };

        debug!(class = %class, url = %request.url, "Dispatching");

        match class {
            RouteClass::ShellAsset => self.stale_while_revalidate(request, store).await,
            RouteClass::CrossOrigin => self.cache_first(request, store).await,
            _ => self.network_first(request, store).await,
        }
    }

    /// Serve the cached copy immediately and refresh it in the background;
    /// on a miss the caller waits on the network.
    async fn stale_while_revalidate(
        &self,
        request: OriginRequest,
        store: Arc<CacheStore>,
    ) -> Result<OriginResponse, DispatchError> {
        let key = RequestKey::new(&request.method, &request.url);

        if let Some(cached) = read_cached(&store, &key).await {
            self.spawn_refresh(request, key, store);
            return Ok(cached);
        }

        let response = self.fetcher.fetch(&request).await?;
        if response.is_success() {
            spawn_write(store, key, response.clone());
        }
        Ok(response)
    }

    /// Serve from cache when present; fetch, store, and return otherwise.
    async fn cache_first(
        &self,
        request: OriginRequest,
        store: Arc<CacheStore>,
    ) -> Result<OriginResponse, DispatchError> {
        let key = RequestKey::new(&request.method, &request.url);

        if let Some(cached) = read_cached(&store, &key).await {
            return Ok(cached);
        }

        let response = self.fetcher.fetch(&request).await?;
        if response.is_success() {
            spawn_write(store, key, response.clone());
        }
        Ok(response)
    }

    /// Try the network first; on transport failure or a non-success status,
    /// fall back to the cached entry for the same identity. This path never
    /// writes to the cache.
    async fn network_first(
        &self,
        request: OriginRequest,
        store: Arc<CacheStore>,
    ) -> Result<OriginResponse, DispatchError> {
        let key = RequestKey::new(&request.method, &request.url);

        match self.fetcher.fetch(&request).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => match read_cached(&store, &key).await {
                Some(cached) => {
                    debug!(key = %key, status = response.status, "Serving cache fallback");
                    Ok(cached)
                }
                // No fallback: the origin's failure response passes through
                // unmodified.
                None => Ok(response),
            },
            Err(e) => match read_cached(&store, &key).await {
                Some(cached) => {
                    debug!(key = %key, error = %e, "Serving cache fallback after fetch failure");
                    Ok(cached)
                }
                None => Err(e.into()),
            },
        }
    }

    /// Background revalidation for stale-while-revalidate. The fresh copy is
    /// observed only by future requests, never the current one.
    fn spawn_refresh(&self, request: OriginRequest, key: RequestKey, store: Arc<CacheStore>) {
        let fetcher = self.fetcher.clone();
        tokio::spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    if let Err(e) = store.put(&key, &response).await {
                        warn!(key = %key, error = %e, "Revalidation cache write failed");
                    }
                }
                Ok(response) => {
                    debug!(key = %key, status = response.status, "Revalidation returned non-success, keeping cached copy");
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Revalidation fetch failed, keeping cached copy");
                }
            }
        });
    }
}

/// Read through the store, degrading any store error to a logged miss.
async fn read_cached(store: &CacheStore, key: &RequestKey) -> Option<OriginResponse> {
    match store.get(key).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!(key = %key, error = %e, "Cache read failed, treating as miss");
            None
        }
    }
}

/// Fire-and-forget cache write. A failure must not affect the response
/// already returned to the caller.
fn spawn_write(store: Arc<CacheStore>, key: RequestKey, response: OriginResponse) {
    tokio::spawn(async move {
        if let Err(e) = store.put(&key, &response).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    });
}
