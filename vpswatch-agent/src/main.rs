//! VPS Watch Agent - remote VPS monitoring with Discord notifications
//!
//! Wires the production collaborators (SSH, ping, ipify, Discord REST)
//! into the monitor service and runs its timers until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vpswatch_agent::chat::DiscordClient;
use vpswatch_agent::discovery::HttpIpLookup;
use vpswatch_agent::execution::{PingProber, SshShell};
use vpswatch_agent::{Collaborators, MonitorService, WatchConfig};

/// Main agent state
struct Agent {
    config: WatchConfig,
    service: Arc<MonitorService>,
}

impl Agent {
    /// Create new agent instance
    async fn new() -> Result<Self> {
        info!("Initializing VPS Watch Agent v{}", env!("CARGO_PKG_VERSION"));

        let config = WatchConfig::load()
            .await
            .context("Failed to load configuration")?;

        let collaborators = Collaborators {
            shell: Arc::new(SshShell::new(config.remote.clone())),
            prober: Arc::new(PingProber::new(Duration::from_secs(config.probe.timeout_secs))),
            ip_lookup: Arc::new(HttpIpLookup::new(config.logins.ip_lookup_url.clone())),
            chat: Arc::new(DiscordClient::new(&config.discord)),
        };

        let service = MonitorService::connect(&config, collaborators)
            .await
            .context("Failed to resolve Discord channels")?;

        info!(
            "Agent initialized - monitoring {}@{}:{}",
            config.remote.username, config.remote.host, config.remote.port
        );

        Ok(Agent {
            config,
            service: Arc::new(service),
        })
    }

    /// Run the timers until Ctrl-C
    async fn run(&self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let timers = self.service.spawn_timers(&self.config.schedule, shutdown_rx);

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;

        info!("Shutdown requested, waiting for in-flight cycles...");
        shutdown_tx.send_replace(true);
        for timer in timers {
            timer.join().await;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vpswatch_agent=info")),
        )
        .init();

    info!("🛰️ VPS Watch Agent starting...");

    let agent = Agent::new().await.context("Failed to create agent")?;

    agent.run().await.context("Agent execution failed")?;

    info!("VPS Watch Agent stopped");
    Ok(())
}
