//! Static SPA host: serves files from the current working directory with
//! `default.html` as the fallback app shell. Try it from a directory containing
//! `index.html` and `default.html`.

use axum::handler::Handler;
use axum::{middleware, Router};
use tracing_subscriber::EnvFilter;

use service_kit::{logging_middleware, spa_handler, Service};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("service_kit=debug,spa_site=debug"));
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_env_filter(env_filter)
        .init();

    let service = Service::init("*", 3000);
    service.set_router(Router::new().fallback(spa_handler.into_service()));
    service.set_middleware(|router| router.layer(middleware::from_fn(logging_middleware)));

    let listener = service.register_shutdown_listener();
    tokio::spawn(async move {
        listener.wait().await;
        tracing::info!("shutdown listener fired, flushing state");
    });

    service.run_and_wait().await;
    Ok(())
}
