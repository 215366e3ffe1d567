use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::connection::{CloseReason, handle_connection};
use crate::measurement::ClientId;
use crate::registry::{ClientInfo, Registry};
use crate::shutdown::Shutdown;

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

const WAITING_MESSAGE: &str = "...waiting for a new client connection...";

/// Accepts sensor connections and spawns one handler task per connection.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
    next_client_id: AtomicU64,
    drain_timeout: Duration,
}

impl Server {
    pub async fn bind(addr: SocketAddr, registry: Arc<Registry>) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;

        Ok(Self {
            listener,
            registry,
            next_client_id: AtomicU64::new(0),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    /// How long [`Server::run`] waits for in-flight handlers after shutdown
    /// before returning without them.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    fn report_accept_error(&self, e: &io::Error) {
        log::error!("Accept error: {e}");
        self.registry
            .add_log_message(format!("Failed to accept a connection: {e}"));
    }

    fn allocate_client_id(&self) -> ClientId {
        self.next_client_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Runs the accept loop until `shutdown` fires, then closes the listener
    /// and waits for the connection handlers to finish.
    ///
    /// A failed accept is logged once and followed by a short pause, so a
    /// persistent error such as running out of file descriptors does not
    /// flood the registry log.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<(), anyhow::Error> {
        let local_addr = self.local_addr()?;
        self.registry
            .add_log_message(format!("TCP Server Started. Listening on {local_addr}"));

        let mut handlers = JoinSet::new();
        self.registry.add_log_message(WAITING_MESSAGE);

        loop {
            let accepted = loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break None,
                    Some(_) = handlers.join_next() => continue,
                    accepted = self.listener.accept() => break Some(accepted),
                }
            };

            match accepted {
                None => break,
                Some(Ok((stream, remote_addr))) => {
                    let id = self.allocate_client_id();
                    self.registry.add_client(ClientInfo::new(id, remote_addr));
                    handlers.spawn(handle_connection(
                        stream,
                        id,
                        Arc::clone(&self.registry),
                        shutdown.clone(),
                    ));
                    self.registry.add_log_message(WAITING_MESSAGE);
                }
                Some(Err(e)) => {
                    self.report_accept_error(&e);
                    if !pause_after_accept_error(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.registry.add_log_message("TCP Server is shutting down.");
        drop(self.listener);

        let still_running = drain(&mut handlers, self.drain_timeout).await;
        if still_running > 0 {
            log::warn!(
                "{still_running} connection handlers still running after {:?}, leaving them to finish",
                self.drain_timeout
            );
        }

        Ok(())
    }
}

/// Waits out [`ACCEPT_ERROR_BACKOFF`]. Returns `false` if shutdown was
/// requested meanwhile.
async fn pause_after_accept_error(shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.recv() => false,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

/// Waits up to `timeout` for every handler to finish. Handlers still running
/// afterwards are detached, not aborted; the count of those is returned.
async fn drain(handlers: &mut JoinSet<CloseReason>, timeout: Duration) -> usize {
    let drained = tokio::time::timeout(timeout, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_ok() {
        return 0;
    }
    let still_running = handlers.len();
    handlers.detach_all();
    still_running
}
