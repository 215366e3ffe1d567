use chrono::{DateTime, Local};

/// Identifier handed out to every accepted connection, starting at 1.
pub type ClientId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub client_id: ClientId,
    pub timestamp: DateTime<Local>,
    /// Fahrenheit.
    pub temperature: f64,
    pub humidity: f64,
    pub co2_concentration: f64,
}

impl Measurement {
    /// Seconds since the Unix epoch.
    pub fn unix_timestamp(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}
