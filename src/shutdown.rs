//! Process-wide shutdown signal.
//!
//! One [`ShutdownTrigger`] fires the signal; any number of [`Shutdown`]
//! handles observe it. A handle cloned after the signal fired still sees it,
//! so a connection accepted during shutdown cannot miss it.

use tokio::sync::watch;

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    #[cfg(test)]
    fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was requested. A dropped trigger counts as a
    /// request, since nothing could fire it any more.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

/// Fires `trigger` on Ctrl+C.
pub fn trigger_on_ctrl_c(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Ctrl+C received, initiating shutdown"),
            Err(e) => log::error!("Failed to wait for Ctrl+C signal: {e}"),
        }
        trigger.trigger();
    });
}
