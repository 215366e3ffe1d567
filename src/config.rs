use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

/// TCP hub collecting readings from SCD4X sensor clients.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "HUB_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// TCP port to listen on
    #[arg(short, long, env = "HUB_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, env = "HUB_LOG_LEVEL", default_value_t = LevelFilter::Info, value_parser = parse_level)]
    pub log_level: LevelFilter,

    /// Seconds to wait for open connections to close on shutdown
    #[arg(long, env = "HUB_DRAIN_TIMEOUT", default_value_t = 5)]
    pub drain_timeout: u64,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout)
    }
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    LevelFilter::from_str(s).map_err(|_| format!("invalid log level: {s}"))
}
