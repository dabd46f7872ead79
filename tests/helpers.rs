#![allow(dead_code)]
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::routing::{any, get};
use axum::Router;
use hyper::{Body, Client, Response, StatusCode};
use once_cell::sync::Lazy;
use service_kit::Service;

pub const HELLO_WORLD: &'static str = "hello world";

pub static _TRACING_INIT: Lazy<()> = Lazy::new(|| {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("TRACE_TESTS")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_env_filter(env_filter)
        .init();
});

pub fn hello_world_service() -> Arc<Service> {
    *_TRACING_INIT;
    let service = Service::init("127.0.0.1", 0);
    service.set_router(Router::new().route(
        "/hello-world",
        get(move || async move {
            let span = tracing::Span::current();
            tracing::info!(parent: span, "serving hello world");
            HELLO_WORLD
        }),
    ));
    Arc::new(service)
}

pub fn byte_sink_service() -> Arc<Service> {
    *_TRACING_INIT;
    let service = Service::init("127.0.0.1", 0);
    service.set_router(Router::new().route(
        "/",
        any(move |_bytes: Bytes| async {
            let span = tracing::Span::current();
            tracing::info!(parent: span, "bytes response");
            StatusCode::OK
        }),
    ));
    Arc::new(service)
}

pub async fn send_empty_get(uri: String) -> Response<Body> {
    let req = hyper::Request::get(uri)
        .body(Body::empty())
        .expect("failed to build request");
    let client = Client::new();
    client.request(req).await.expect("request failed")
}

pub async fn send_empty_get_with_header(uri: String, name: &str, value: &str) -> Response<Body> {
    let req = hyper::Request::get(uri)
        .header(name, value)
        .body(Body::empty())
        .expect("failed to build request");
    let client = Client::new();
    client.request(req).await.expect("request failed")
}

pub async fn half_sec_post_request(uri: String) -> Response<Body> {
    const CHUNK: &'static [u8] = &[0; 1024];
    let data = async_stream::stream! {
        for _ in 0..5u8 {
            yield Ok::<_, Infallible>(CHUNK);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };

    let req = hyper::Request::post(uri)
        .body(Body::wrap_stream(data))
        .expect("failed to build request");
    let client = Client::new();
    client.request(req).await.expect("request failed")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("failed to collect body");
    String::from_utf8(bytes.to_vec()).expect("failed to decode response text")
}
