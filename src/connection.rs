use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::measurement::ClientId;
use crate::protocol;
use crate::registry::Registry;
use crate::shutdown::Shutdown;

pub const READ_BUFFER_SIZE: usize = 4096;

/// Why a connection left its read loop.
#[derive(Debug)]
pub enum CloseReason {
    PeerClosed,
    Shutdown,
    Io(io::Error),
}

/// Removes the client from the registry when the handler ends, however it
/// ends: normal return, error, panic or task abort.
struct RegistryGuard {
    id: ClientId,
    registry: Arc<Registry>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.add_log_message(format!(
            "Closing connection and cleaning up for Client {}.",
            self.id
        ));
        self.registry.remove_client(self.id);
    }
}

/// Drives one accepted connection until the peer closes, an I/O error occurs
/// or shutdown is requested. The client must already be registered under
/// `id`; it is removed exactly once when this returns.
pub async fn handle_connection<S>(
    stream: S,
    id: ClientId,
    registry: Arc<Registry>,
    shutdown: Shutdown,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _guard = RegistryGuard {
        id,
        registry: Arc::clone(&registry),
    };
    registry.add_log_message(format!("Handler created for Client {id}."));

    let reason = serve(stream, id, &registry, shutdown).await;
    match &reason {
        CloseReason::PeerClosed => log::debug!("Client {id} closed the connection"),
        CloseReason::Shutdown => log::debug!("Client {id} handler stopped by shutdown"),
        CloseReason::Io(e) => {
            log::warn!("Client {id} I/O error: {e}");
            registry.add_log_message(format!("Error with client {id}: {e}"));
        }
    }
    reason
}

async fn serve<S>(
    mut stream: S,
    id: ClientId,
    registry: &Registry,
    mut shutdown: Shutdown,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.recv() => return CloseReason::Shutdown,
            read = stream.read(&mut buffer) => read,
        };
        let n = match read {
            Ok(0) => return CloseReason::PeerClosed,
            Ok(n) => n,
            Err(e) => return CloseReason::Io(e),
        };

        let data = String::from_utf8_lossy(&buffer[..n]);
        let frame = data.trim();

        match protocol::decode(frame, id) {
            Ok(measurement) => registry.record_measurement(measurement),
            Err(e) => log::debug!("Client {id}: dropped frame {frame:?}: {e}"),
        }

        let ack = protocol::acknowledgement(frame);
        let written = tokio::select! {
            biased;
            _ = shutdown.recv() => return CloseReason::Shutdown,
            written = stream.write_all(ack.as_bytes()) => written,
        };
        if let Err(e) = written {
            return CloseReason::Io(e);
        }
    }
}
