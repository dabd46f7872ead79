//! This library offers the building blocks for bootstrapping small HTTP services with
//! [`axum`].
//!
//! [`Service`] owns the lifecycle of an HTTP listener: it binds an address and port,
//! starts serving on a background task, hands out [`ShutdownListener`] handles to parties
//! interested in shutdown, and coordinates a graceful stop when the process receives
//! SIGINT or SIGTERM (or when [`Service::stop`] is called).
//!
//! Two request-handling pieces can be mounted by the embedding application:
//! [`spa_handler`], a catch-all static-file handler with single-page-app fallback
//! semantics, and [`logging_middleware`], an access-log decorator.
//!
//! # Example
//!
//! ```
//! # fn main() {}
//! use axum::routing::get;
//! use axum::Router;
//!
//! use service_kit::Service;
//!
//! async fn run() {
//!     let service = Service::init("127.0.0.1", 3000);
//!     service.set_router(Router::new().route("/hello", get(|| async { "hello" })));
//!     // blocks until SIGINT/SIGTERM, then drains in-flight requests
//!     service.run_and_wait().await;
//! }
//! ```

mod middleware;
pub use middleware::{logging_middleware, serve_spa, spa_handler};
mod service;
pub use service::{Service, ServiceError, SERVER_TIMEOUT};
mod shutdown;
pub use shutdown::ShutdownListener;
