use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use env_sensor_hub::config::Config;
use env_sensor_hub::registry::Registry;
use env_sensor_hub::server::Server;
use env_sensor_hub::shutdown;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::parse();

    TermLogger::init(
        config.log_level,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    let registry = Arc::new(Registry::new());

    if let Err(e) = run(&config, Arc::clone(&registry)).await {
        registry.add_log_message(format!("TCP Server error: {e:#}"));
        log::error!("{e:#}");
    }

    Ok(())
}

pub async fn run(config: &Config, registry: Arc<Registry>) -> Result<(), anyhow::Error> {
    let (trigger, shutdown) = shutdown::channel();
    shutdown::trigger_on_ctrl_c(trigger);

    let server = Server::bind(config.socket_addr(), registry)
        .await?
        .with_drain_timeout(config.drain_timeout());

    server.run(shutdown).await
}
