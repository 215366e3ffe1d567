pub mod config;
pub mod connection;
pub mod measurement;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod shutdown;
