use axum::routing::get;
use axum::{middleware, Router};
use tracing_subscriber::EnvFilter;

use service_kit::{logging_middleware, Service};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_env_filter(env_filter)
        .init();

    let service = Service::init("127.0.0.1", 3000);
    service.set_router(Router::new().route("/hello-world", get(|| async { "hello world" })));
    service.set_middleware(|router| router.layer(middleware::from_fn(logging_middleware)));
    service.set_shutdown_func(|| tracing::info!("goodbye"));

    tracing::info!("waiting for shutdown signal");
    service.run_and_wait().await;
    Ok(())
}
