use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::Router;
use hyper::StatusCode;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tower::{BoxError, ServiceBuilder};

use crate::shutdown::{termination_signal, ListenerRegistry, ShutdownListener};

/// Fixed read/write/idle bound applied to the HTTP server.
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(120);

/// Lifecycle state driven by [`Service::run`] and [`Service::wait_for_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Stopped = 0,
    Running = 1,
}

type ShutdownFunc = Box<dyn FnOnce() + Send>;
type MiddlewareFunc = Box<dyn FnOnce(Router) -> Router + Send>;

/// Errors encountered while starting a [`Service`].
///
/// These never propagate to callers: a startup failure is fatal and terminates the
/// process after being logged, matching the no-retry contract of [`Service::run`].
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("failed to resolve bind address {address}:{port}: {source}")]
    Resolve {
        address: String,
        port: u16,
        source: std::io::Error,
    },
    #[error("no socket address resolved for {address}:{port}")]
    NoAddress { address: String, port: u16 },
    #[error("error on listen: {0}")]
    Bind(#[from] hyper::Error),
}

/// An HTTP service with signal-coordinated graceful shutdown.
///
/// A `Service` is constructed once through [`Service::init`], optionally configured
/// with a router, a middleware wrapper and a shutdown callback, then driven by
/// [`Service::run_and_wait`] (or [`Service::run`] plus [`Service::wait_for_stop`]).
/// All methods take `&self`; the service is meant to be shared behind an
/// [`std::sync::Arc`] so request handlers and background tasks can trigger
/// [`Service::stop`].
pub struct Service {
    address: String,
    port: u16,
    bind_all: bool,
    state: AtomicU8,
    cleaned: AtomicBool,
    router: Mutex<Option<Router>>,
    middleware: Mutex<Option<MiddlewareFunc>>,
    shutdown_func: Mutex<Option<ShutdownFunc>>,
    registry: Mutex<ListenerRegistry>,
    stop_tx: mpsc::Sender<()>,
    stop_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    drain_tx: Mutex<Option<oneshot::Sender<()>>>,
    server: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Service {
    /// Creates a service bound to `address` and `port`.
    ///
    /// The address `"*"` means "listen on all interfaces" and is normalized to
    /// `0.0.0.0`.
    ///
    /// # Panics
    ///
    /// Panics if `address` is empty; an explicit address (or `"*"`) is required.
    pub fn init(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        if address.is_empty() {
            panic!("service address cannot be empty on init; use \"*\" for all available addresses");
        }
        let address = if address == "*" {
            "0.0.0.0".to_owned()
        } else {
            address
        };
        let bind_all = address == "0.0.0.0";
        let (stop_tx, stop_rx) = mpsc::channel(1);

        Self {
            address,
            port,
            bind_all,
            state: AtomicU8::new(State::Stopped as u8),
            cleaned: AtomicBool::new(false),
            router: Mutex::new(Some(Router::new())),
            middleware: Mutex::new(None),
            shutdown_func: Mutex::new(None),
            registry: Mutex::new(ListenerRegistry::new()),
            stop_tx,
            stop_rx: tokio::sync::Mutex::new(stop_rx),
            drain_tx: Mutex::new(None),
            server: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Replaces the root router served by this service.
    ///
    /// Takes effect on the next [`Service::run`] call; a service started without an
    /// explicit router serves an empty router (every request is a 404).
    pub fn set_router(&self, router: Router) {
        *self.router.lock().expect("router lock poisoned") = Some(router);
    }

    /// Sets a wrapper applied once to the root router when [`Service::run`] starts
    /// the listener.
    pub fn set_middleware(&self, wrap: impl FnOnce(Router) -> Router + Send + 'static) {
        *self.middleware.lock().expect("middleware lock poisoned") = Some(Box::new(wrap));
    }

    /// Sets a callback invoked exactly once during [`Service::cleanup`].
    pub fn set_shutdown_func(&self, f: impl FnOnce() + Send + 'static) {
        *self.shutdown_func.lock().expect("shutdown_func lock poisoned") = Some(Box::new(f));
    }

    /// The normalized bind address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The socket address the listener is actually bound to, once running.
    ///
    /// Useful when binding to port 0 and the real port is needed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("local_addr lock poisoned")
    }

    /// Whether the listener has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == State::Running as u8
    }

    /// Returns a fresh [`ShutdownListener`] that is signaled exactly once when the
    /// service shuts down. Listeners are signaled in registration order.
    pub fn register_shutdown_listener(&self) -> ShutdownListener {
        self.registry
            .lock()
            .expect("registry lock poisoned")
            .register()
    }

    /// Revokes a previously registered listener so [`Service::cleanup`] will not
    /// signal it. Handing back a listener this service never issued is a no-op.
    pub fn unregister_shutdown_listener(&self, listener: ShutdownListener) {
        self.registry
            .lock()
            .expect("registry lock poisoned")
            .unregister(listener);
    }

    /// Binds the listener and starts serving on a background task.
    ///
    /// Idempotent: only the first transition from stopped to running takes effect,
    /// concurrent or repeated calls return without doing anything. A service that has
    /// already been cleaned up cannot be restarted; calling `run` again after a stop
    /// is a no-op. A failure to resolve or bind the address is fatal and terminates
    /// the process after logging.
    pub fn run(&self) {
        // the router, middleware and drain channel are spent after cleanup
        if self.cleaned.load(Ordering::SeqCst) {
            return;
        }
        if self
            .state
            .compare_exchange(
                State::Stopped as u8,
                State::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        if let Err(err) = self.start_server() {
            tracing::error!(%err, "fatal error starting service");
            std::process::exit(1);
        }
    }

    fn start_server(&self) -> Result<(), ServiceError> {
        let mut router = self
            .router
            .lock()
            .expect("router lock poisoned")
            .take()
            .unwrap_or_default();
        if let Some(wrap) = self.middleware.lock().expect("middleware lock poisoned").take() {
            router = wrap(router);
        }
        // per-request guard matching the fixed server timeout
        let app = router.layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|_: BoxError| async {
                    StatusCode::REQUEST_TIMEOUT
                }))
                .timeout(SERVER_TIMEOUT),
        );

        let addr = self.resolve_bind_addr()?;
        let srv = axum::Server::try_bind(&addr)?
            .http1_header_read_timeout(SERVER_TIMEOUT)
            .tcp_keepalive(Some(SERVER_TIMEOUT))
            .serve(app.into_make_service_with_connect_info::<SocketAddr, _>());

        let local_addr = srv.local_addr();
        *self.local_addr.lock().expect("local_addr lock poisoned") = Some(local_addr);
        if self.bind_all {
            tracing::info!(
                "listening on port {} address: {}",
                local_addr.port(),
                local_addresses()
            );
        } else {
            tracing::info!(
                "listening on port {} address: {}",
                local_addr.port(),
                local_addr.ip()
            );
        }

        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        *self.drain_tx.lock().expect("drain_tx lock poisoned") = Some(drain_tx);
        let handle = tokio::spawn(async move {
            let graceful = srv.with_graceful_shutdown(async {
                let _ = drain_rx.await;
            });
            if let Err(err) = graceful.await {
                tracing::error!(%err, "error on listen");
                std::process::exit(1);
            }
        });
        *self.server.lock().expect("server lock poisoned") = Some(handle);
        Ok(())
    }

    fn resolve_bind_addr(&self) -> Result<SocketAddr, ServiceError> {
        let mut addrs = (self.address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| ServiceError::Resolve {
                address: self.address.clone(),
                port: self.port,
                source,
            })?;
        addrs.next().ok_or_else(|| ServiceError::NoAddress {
            address: self.address.clone(),
            port: self.port,
        })
    }

    /// Blocks until a termination signal (SIGINT/SIGTERM) arrives or [`Service::stop`]
    /// is called, then runs [`Service::cleanup`] and resets the running state.
    pub async fn wait_for_stop(&self) {
        {
            let mut stop_rx = self.stop_rx.lock().await;
            tokio::select! {
                _ = termination_signal() => {}
                _ = stop_rx.recv() => {
                    tracing::info!("received stop request")
                }
            }
        }
        tracing::info!("received shutdown signal, stopping the service");

        self.cleanup().await;
        self.state.store(State::Stopped as u8, Ordering::SeqCst);
    }

    /// Convenience composition of [`Service::run`] followed by [`Service::wait_for_stop`].
    pub async fn run_and_wait(&self) {
        self.run();
        self.wait_for_stop().await;
    }

    /// Requests a programmatic stop, unblocking [`Service::wait_for_stop`] through the
    /// same termination channel the OS signal listener feeds.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Signals every registered shutdown listener in registration order, invokes the
    /// shutdown callback if one was set, then gracefully shuts the HTTP server down,
    /// waiting without a timeout for in-flight requests to drain.
    ///
    /// Runs at most once per service instance; later calls return immediately.
    pub async fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }

        let senders = self
            .registry
            .lock()
            .expect("registry lock poisoned")
            .drain();
        for tx in senders {
            let _ = tx.send(());
        }

        let shutdown_func = self
            .shutdown_func
            .lock()
            .expect("shutdown_func lock poisoned")
            .take();
        if let Some(f) = shutdown_func {
            f();
        }

        let drain_tx = self.drain_tx.lock().expect("drain_tx lock poisoned").take();
        if let Some(tx) = drain_tx {
            let _ = tx.send(());
        }
        let server = self.server.lock().expect("server lock poisoned").take();
        if let Some(handle) = server {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    tracing::error!(%err, "server task panicked during shutdown");
                }
            }
        }
        tracing::info!("service stopped");
    }
}

/// Comma-separated list of local interface addresses, for the startup log line when
/// bound to all interfaces.
fn local_addresses() -> String {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces
            .into_iter()
            .map(|(_, ip)| ip.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        Err(_) => "0.0.0.0".to_owned(),
    }
}
