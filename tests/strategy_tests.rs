//! Strategy behavior: per-class caching semantics through the dispatcher.

mod common;

use bytes::Bytes;
use common::{context, eventually, ORIGIN};

use shell_cache::cache::entry::RequestKey;
use shell_cache::fetch::{OriginRequest, OriginResponse};

fn text_response(status: u16, body: &[u8]) -> OriginResponse {
    OriginResponse {
        status,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: Bytes::copy_from_slice(body),
    }
}

/// Install and activate a generation whose only shell asset is dist.css.
async fn activate_v1(ctx: &common::TestContext) {
    ctx.fetcher
        .respond("GET", &format!("{ORIGIN}/static/dist.css"), 200, b"old-css");
    ctx.lifecycle
        .install("v1", &["/static/dist.css".to_string()])
        .await
        .unwrap();
    ctx.lifecycle.activate("v1").await.unwrap();
}

#[tokio::test]
async fn excluded_requests_never_touch_the_store() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = format!("{ORIGIN}/api/stream");
    let key = RequestKey::new("GET", &url);
    let store = ctx.lifecycle.active_store().await.unwrap();

    // Plant an entry under the excluded identity; if the dispatcher ever
    // consulted the store it would serve these bytes.
    store.put(&key, &text_response(200, b"planted")).await.unwrap();
    let entries_before = store.len().await;

    ctx.fetcher.respond("GET", &url, 200, b"live-events");
    let response = ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    assert_eq!(response.body, Bytes::from_static(b"live-events"));

    // No read was served from it and no write went into it.
    assert_eq!(store.len().await, entries_before);
    let planted = store.get(&key).await.unwrap().unwrap();
    assert_eq!(planted.body, Bytes::from_static(b"planted"));
}

#[tokio::test]
async fn excluded_command_submission_passes_through() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = format!("{ORIGIN}/api/command");
    ctx.fetcher.respond("POST", &url, 200, b"ok");

    let request = OriginRequest {
        method: "POST".to_string(),
        url: url.clone(),
        headers: Vec::new(),
        body: Bytes::from_static(b"{\"domain\":\"light\"}"),
    };
    let response = ctx.dispatcher.handle(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(ctx.fetcher.fetch_count("POST", &url), 1);
}

#[tokio::test]
async fn swr_serves_stale_then_converges() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = format!("{ORIGIN}/static/dist.css");
    let key = RequestKey::new("GET", &url);
    let store = ctx.lifecycle.active_store().await.unwrap();

    // The origin now serves different bytes than what was installed.
    ctx.fetcher.respond("GET", &url, 200, b"new-css");

    // First request: old bytes, immediately, no waiting on revalidation.
    let first = ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    assert_eq!(first.body, Bytes::from_static(b"old-css"));

    // Revalidation settles in the background.
    eventually(|| {
        let store = store.clone();
        let key = key.clone();
        async move {
            store
                .get(&key)
                .await
                .unwrap()
                .map(|r| r.body == Bytes::from_static(b"new-css"))
                .unwrap_or(false)
        }
    })
    .await;

    // Second request observes the fresh bytes.
    let second = ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    assert_eq!(second.body, Bytes::from_static(b"new-css"));
}

#[tokio::test]
async fn swr_miss_waits_on_network() {
    let ctx = context();
    activate_v1(&ctx).await;

    // A shell asset that was not in the install list.
    let url = format!("{ORIGIN}/static/extra.js");
    let key = RequestKey::new("GET", &url);
    let store = ctx.lifecycle.active_store().await.unwrap();

    ctx.fetcher.respond("GET", &url, 200, b"extra");
    let response = ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    assert_eq!(response.body, Bytes::from_static(b"extra"));

    // The fetched copy lands in the cache for next time.
    eventually(|| {
        let store = store.clone();
        let key = key.clone();
        async move { store.contains(&key).await }
    })
    .await;
}

#[tokio::test]
async fn cache_first_fetches_each_resource_once() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = "https://fonts.gstatic.com/s/inter/v12/inter.woff2";
    let key = RequestKey::new("GET", url);
    let store = ctx.lifecycle.active_store().await.unwrap();

    ctx.fetcher.respond("GET", url, 200, b"font-bytes");

    let first = ctx.dispatcher.handle(OriginRequest::get(url)).await.unwrap();
    assert_eq!(first.body, Bytes::from_static(b"font-bytes"));
    assert_eq!(ctx.fetcher.fetch_count("GET", url), 1);

    // Wait for the fire-and-forget write to settle, then hit again.
    eventually(|| {
        let store = store.clone();
        let key = key.clone();
        async move { store.contains(&key).await }
    })
    .await;

    let second = ctx.dispatcher.handle(OriginRequest::get(url)).await.unwrap();
    assert_eq!(second.body, Bytes::from_static(b"font-bytes"));
    assert_eq!(ctx.fetcher.fetch_count("GET", url), 1);
}

#[tokio::test]
async fn cache_first_serves_cache_when_host_unreachable() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = "https://fonts.gstatic.com/s/inter/v12/inter.woff2";
    let key = RequestKey::new("GET", url);
    let store = ctx.lifecycle.active_store().await.unwrap();
    store.put(&key, &text_response(200, b"font-bytes")).await.unwrap();

    // Host is now unreachable; the cached copy still serves.
    ctx.fetcher.fail("GET", url);
    let response = ctx.dispatcher.handle(OriginRequest::get(url)).await.unwrap();
    assert_eq!(response.body, Bytes::from_static(b"font-bytes"));
    assert_eq!(ctx.fetcher.fetch_count("GET", url), 0);
}

#[tokio::test]
async fn network_first_failure_propagates_without_entry() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = format!("{ORIGIN}/guest/home");
    ctx.fetcher.fail("GET", &url);

    let result = ctx.dispatcher.handle(OriginRequest::get(&url)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn network_first_falls_back_to_cached_bytes() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = format!("{ORIGIN}/guest/home");
    let key = RequestKey::new("GET", &url);
    let store = ctx.lifecycle.active_store().await.unwrap();
    store.put(&key, &text_response(200, b"stale-page")).await.unwrap();

    ctx.fetcher.fail("GET", &url);
    let response = ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    assert_eq!(response.body, Bytes::from_static(b"stale-page"));
}

#[tokio::test]
async fn network_first_falls_back_on_non_success_status() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = format!("{ORIGIN}/guest/home");
    let key = RequestKey::new("GET", &url);
    let store = ctx.lifecycle.active_store().await.unwrap();
    store.put(&key, &text_response(200, b"stale-page")).await.unwrap();

    ctx.fetcher.respond("GET", &url, 502, b"upstream down");
    let response = ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, Bytes::from_static(b"stale-page"));
}

#[tokio::test]
async fn network_first_passes_through_failure_response_without_entry() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = format!("{ORIGIN}/guest/home");
    ctx.fetcher.respond("GET", &url, 502, b"upstream down");

    let response = ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    assert_eq!(response.status, 502);
    assert_eq!(response.body, Bytes::from_static(b"upstream down"));

    // This class keeps no offline copy.
    let store = ctx.lifecycle.active_store().await.unwrap();
    assert!(!store.contains(&RequestKey::new("GET", &url)).await);
}

#[tokio::test]
async fn dynamic_requests_are_never_written() {
    let ctx = context();
    activate_v1(&ctx).await;

    let url = format!("{ORIGIN}/guest/home");
    ctx.fetcher.respond("GET", &url, 200, b"<html>");

    ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    // Give any (incorrect) background write a chance to land.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let store = ctx.lifecycle.active_store().await.unwrap();
    assert!(!store.contains(&RequestKey::new("GET", &url)).await);
}

#[tokio::test]
async fn everything_passes_through_before_first_activation() {
    let ctx = context();

    let url = format!("{ORIGIN}/static/dist.css");
    ctx.fetcher.respond("GET", &url, 200, b"css");

    let response = ctx.dispatcher.handle(OriginRequest::get(&url)).await.unwrap();
    assert_eq!(response.body, Bytes::from_static(b"css"));
    assert!(ctx.lifecycle.active_store().await.is_none());
}
