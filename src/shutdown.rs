use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;

/// Resolves when the process receives a termination signal.
///
/// On unix this is SIGTERM or Ctrl-C; elsewhere only Ctrl-C is available.
pub(crate) fn termination_signal() -> BoxFuture<'static, ()> {
    #[cfg(unix)]
    let signal = async {
        use tokio::signal::unix::*;
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM")
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl-C")
            }
        }
    };
    #[cfg(not(unix))]
    let signal = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    signal.boxed()
}

/// One-shot handle signaled exactly once when the owning [`crate::Service`] shuts down.
///
/// Obtained through [`crate::Service::register_shutdown_listener`]. Await the handle
/// directly or call [`ShutdownListener::wait`].
pub struct ShutdownListener {
    id: u64,
    rx: oneshot::Receiver<()>,
}

impl ShutdownListener {
    /// Waits until the service signals shutdown.
    ///
    /// Also resolves if the service is dropped without a clean shutdown, so a waiting
    /// task is never left dangling.
    pub async fn wait(self) {
        let _ = self.rx.await;
    }
}

impl Future for ShutdownListener {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx.poll_unpin(cx).map(|_| ())
    }
}

/// Ordered collection of shutdown-notification senders, one per registered listener.
///
/// Owned by a single `Service` instance and guarded by its own mutex; registration
/// order is the order listeners are signaled in.
pub(crate) struct ListenerRegistry {
    entries: Vec<(u64, oneshot::Sender<()>)>,
}

/// Listener identities are unique across the process, so a handle from one service
/// can never unregister a listener held by another.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(0);

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self) -> ShutdownListener {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.entries.push((id, tx));
        ShutdownListener { id, rx }
    }

    /// Removes the entry matching the listener's identity, preserving the relative
    /// order of the rest. No-op if the listener was not registered here.
    pub(crate) fn unregister(&mut self, listener: ShutdownListener) {
        if let Some(idx) = self.entries.iter().position(|(id, _)| *id == listener.id) {
            self.entries.remove(idx);
        }
    }

    /// Takes every registered sender, in registration order, leaving the registry empty.
    pub(crate) fn drain(&mut self) -> Vec<oneshot::Sender<()>> {
        self.entries.drain(..).map(|(_, tx)| tx).collect()
    }
}
