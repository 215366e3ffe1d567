//! Shared state for connected sensor clients.
//!
//! The registry tracks live connections and a bounded log of recent activity,
//! and publishes two kinds of events: a generic "state changed" ping after
//! every mutation and a separate stream of decoded measurements. Observers
//! subscribe through [`Registry::subscribe_changes`] and
//! [`Registry::subscribe_measurements`]; dropping the receiver unsubscribes.
//! Both are broadcast channels, so a slow observer lags instead of blocking
//! the mutator.

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::measurement::{ClientId, Measurement};

pub const LOG_CAPACITY: usize = 40;
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Local>,
}

impl ClientInfo {
    pub fn new(id: ClientId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: Local::now(),
        }
    }

    pub fn name(&self) -> String {
        format!("Client {} ({})", self.id, self.remote_addr)
    }
}

#[derive(Debug, Default)]
struct Inner {
    clients: BTreeMap<ClientId, ClientInfo>,
    log: VecDeque<String>,
}

impl Inner {
    fn push_log(&mut self, message: &str) {
        let line = format!("[{}]: {}", Local::now().format("%H:%M:%S"), message);
        self.log.push_back(line);
        while self.log.len() > LOG_CAPACITY {
            self.log.pop_front();
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<()>,
    measurements: broadcast::Sender<Measurement>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (measurements, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
            measurements,
        }
    }

    /// Registers a freshly accepted connection.
    ///
    /// # Panics
    ///
    /// Panics if `client.id` is already registered. Ids come from a monotonic
    /// counter, so a collision is a bug in the caller.
    pub fn add_client(&self, client: ClientInfo) {
        let message = {
            let mut inner = self.inner.lock();
            assert!(
                !inner.clients.contains_key(&client.id),
                "client id {} registered twice",
                client.id
            );
            let message = format!(
                "Client connected from {}, it has been assigned the ID: {}",
                client.remote_addr, client.id
            );
            inner.clients.insert(client.id, client);
            inner.push_log(&message);
            message
        };
        self.logged(&message);
    }

    /// Removes a client. Returns whether it was registered; removing an
    /// unknown id is logged but is not an error.
    pub fn remove_client(&self, id: ClientId) -> bool {
        let (removed, message) = {
            let mut inner = self.inner.lock();
            let removed = inner.clients.remove(&id).is_some();
            let message = if removed {
                format!("Client with ID: {id} has been removed.")
            } else {
                format!("Attempted to remove non-existent client with ID: {id}")
            };
            inner.push_log(&message);
            (removed, message)
        };
        self.logged(&message);
        removed
    }

    pub fn add_log_message(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.inner.lock().push_log(message);
        self.logged(message);
    }

    /// Publishes a decoded measurement and logs a summary of it.
    pub fn record_measurement(&self, measurement: Measurement) {
        self.add_log_message(format!(
            "Client {}: CO2 {} ppm, {:.1} °F, {:.1} %RH",
            measurement.client_id,
            measurement.co2_concentration,
            measurement.temperature,
            measurement.humidity
        ));
        // No subscribers is fine, the measurement is simply not kept.
        let _ = self.measurements.send(measurement);
    }

    /// Snapshot of the connected clients, ordered by id.
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.inner.lock().clients.values().cloned().collect()
    }

    pub fn client(&self, id: ClientId) -> Option<ClientInfo> {
        self.inner.lock().clients.get(&id).cloned()
    }

    pub fn client_count(&self) -> usize {
        self.inner.lock().clients.len()
    }

    /// Snapshot of the last [`LOG_CAPACITY`] log lines, oldest first.
    pub fn log_messages(&self) -> Vec<String> {
        self.inner.lock().log.iter().cloned().collect()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }

    pub fn subscribe_measurements(&self) -> broadcast::Receiver<Measurement> {
        self.measurements.subscribe()
    }

    /// Mirrors a registry log line to the terminal and notifies observers.
    /// Called with the lock released.
    fn logged(&self, message: &str) {
        log::info!("{message}");
        let _ = self.changes.send(());
    }
}
