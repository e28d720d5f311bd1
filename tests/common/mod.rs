//! Shared test fixtures: a scripted fetcher and a ready-wired controller.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;

use shell_cache::cache::classify::Classifier;
use shell_cache::cache::dispatch::Dispatcher;
use shell_cache::cache::lifecycle::Lifecycle;
use shell_cache::config::RouteConfig;
use shell_cache::fetch::{Fetch, FetchError, OriginRequest, OriginResponse};

pub const ORIGIN: &str = "http://origin";

#[derive(Clone)]
enum Outcome {
    Respond(u16, Bytes),
    RespondSlow(u16, Bytes, std::time::Duration),
    FailTransport,
}

/// Scripted fetcher: maps request identity to a canned outcome and counts
/// every fetch it performs. Unscripted requests get a 404.
#[derive(Default)]
pub struct MockFetcher {
    outcomes: Mutex<HashMap<String, Outcome>>,
    counts: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn identity(method: &str, url: &str) -> String {
        format!("{} {}", method.to_ascii_uppercase(), url)
    }

    /// Script a response for a method + URL.
    pub fn respond(&self, method: &str, url: &str, status: u16, body: &[u8]) {
        self.outcomes.lock().unwrap().insert(
            Self::identity(method, url),
            Outcome::Respond(status, Bytes::copy_from_slice(body)),
        );
    }

    /// Script a response that arrives only after a delay, to hold an
    /// operation mid-flight while the test races something against it.
    pub fn respond_slowly(
        &self,
        method: &str,
        url: &str,
        status: u16,
        body: &[u8],
        delay: std::time::Duration,
    ) {
        self.outcomes.lock().unwrap().insert(
            Self::identity(method, url),
            Outcome::RespondSlow(status, Bytes::copy_from_slice(body), delay),
        );
    }

    /// Script a transport failure for a method + URL.
    pub fn fail(&self, method: &str, url: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(Self::identity(method, url), Outcome::FailTransport);
    }

    /// How many times a method + URL has been fetched.
    pub fn fetch_count(&self, method: &str, url: &str) -> usize {
        self.counts
            .lock()
            .unwrap()
            .get(&Self::identity(method, url))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn fetch(&self, request: &OriginRequest) -> Result<OriginResponse, FetchError> {
        let identity = Self::identity(&request.method, &request.url);
        *self.counts.lock().unwrap().entry(identity.clone()).or_insert(0) += 1;

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(&identity)
            .cloned()
            .unwrap_or(Outcome::Respond(404, Bytes::new()));

        match outcome {
            Outcome::Respond(status, body) => Ok(OriginResponse {
                status,
                headers: vec![("content-type".to_string(), "text/plain".to_string())],
                body,
            }),
            Outcome::RespondSlow(status, body, delay) => {
                tokio::time::sleep(delay).await;
                Ok(OriginResponse {
                    status,
                    headers: vec![("content-type".to_string(), "text/plain".to_string())],
                    body,
                })
            }
            Outcome::FailTransport => Err(FetchError::Transport {
                url: request.url.clone(),
                source: "connection refused".into(),
            }),
        }
    }
}

/// A controller wired against a temp cache root and a mock fetcher, using
/// the default route rules.
pub struct TestContext {
    pub tmp: TempDir,
    pub fetcher: Arc<MockFetcher>,
    pub lifecycle: Arc<Lifecycle>,
    pub dispatcher: Dispatcher,
}

pub fn context() -> TestContext {
    let tmp = TempDir::new().unwrap();
    let fetcher = MockFetcher::new();
    let lifecycle = Arc::new(Lifecycle::new(
        tmp.path(),
        ORIGIN,
        fetcher.clone() as Arc<dyn Fetch>,
    ));
    let dispatcher = Dispatcher::new(
        Classifier::from_config(&RouteConfig::default()),
        lifecycle.clone(),
        fetcher.clone() as Arc<dyn Fetch>,
    );

    TestContext {
        tmp,
        fetcher,
        lifecycle,
        dispatcher,
    }
}

/// Poll an async condition until it holds, panicking after two seconds.
/// Used to observe fire-and-forget cache writes settling.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if condition().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
