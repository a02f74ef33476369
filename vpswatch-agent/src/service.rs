//! Monitor service: owner of all cycle state
//!
//! Holds the dedup ledger and the status presenter behind async mutexes and
//! exposes one method per cycle. The timers, and the `!status` command,
//! share a single `Arc<MonitorService>`.
//!
//! - Status cycle: metrics + reachability -> edit-or-create status message
//! - Login cycle: auth log tail -> ledger -> one alert per new login
//! - Command poll: `!status` in a command channel -> status cycle + delete

use crate::chat::{ChannelHandle, ChatChannel, IncomingMessage, MessageHandle};
use crate::config::{ScheduleConfig, SelfIpMode, WatchConfig};
use crate::discovery::{resolve_self_ip, PublicIpLookup};
use crate::error::ChannelError;
use crate::execution::{Reachability, RemoteShell};
use crate::logins::{DedupLedger, IdentityFilters, LoginCollector};
use crate::metrics::TelemetryCollector;
use crate::presenter::{login_alert, present, StatusPresenter};
use crate::scheduler::PeriodicTimer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// External collaborators the service drives
#[derive(Clone)]
pub struct Collaborators {
    pub shell: Arc<dyn RemoteShell>,
    pub prober: Arc<dyn Reachability>,
    pub ip_lookup: Arc<dyn PublicIpLookup>,
    pub chat: Arc<dyn ChatChannel>,
}

/// Result of one status cycle
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    Published { handle: MessageHandle, reachable: bool },
    MetricsUnavailable,
    PublishFailed,
}

/// Result of one login cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginCycleReport {
    pub candidates: usize,
    pub alerted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct MonitorService {
    collaborators: Collaborators,
    remote_host: String,
    username: String,
    self_ip_mode: SelfIpMode,
    command_prefix: String,
    login_collector: LoginCollector,
    logins_channel: ChannelHandle,
    command_channels: Vec<ChannelHandle>,
    status: Mutex<StatusPresenter>,
    ledger: Mutex<DedupLedger>,
    /// Last seen message id per command channel; absent until the first poll
    command_cursors: Mutex<HashMap<u64, Option<String>>>,
}

impl MonitorService {
    /// Resolve the configured channels and build the service
    pub async fn connect(config: &WatchConfig, collaborators: Collaborators) -> Result<Self, ChannelError> {
        let chat = collaborators.chat.clone();

        let status_channel = chat.lookup_channel(config.discord.status_channel_id).await?;
        let logins_channel = chat.lookup_channel(config.discord.logins_channel_id).await?;
        let mut command_channels = Vec::new();
        for id in config.discord.command_channels() {
            command_channels.push(chat.lookup_channel(id).await?);
        }

        info!(
            "Channels resolved - status: {}, logins: {}, commands: {}",
            status_channel.id,
            logins_channel.id,
            command_channels.len()
        );

        Ok(Self {
            remote_host: config.remote.host.clone(),
            username: config.remote.username.clone(),
            self_ip_mode: config.logins.self_ip_mode,
            command_prefix: config.discord.command_prefix.clone(),
            login_collector: LoginCollector::new(
                &config.logins.auth_log_path,
                config.logins.tail_lines,
                config.remote.password.clone(),
            ),
            logins_channel,
            command_channels,
            status: Mutex::new(StatusPresenter::new(chat, status_channel)),
            ledger: Mutex::new(DedupLedger::new()),
            command_cursors: Mutex::new(HashMap::new()),
            collaborators,
        })
    }

    /// Collect, render and publish the host status
    ///
    /// Timer and manual runs queue on the presenter lock, so two cycles can
    /// never both see "no status message yet".
    pub async fn run_status_cycle(&self) -> StatusOutcome {
        let mut presenter = self.status.lock().await;
        debug!("Status cycle started");

        let sample = match TelemetryCollector::collect(self.collaborators.shell.as_ref()).await {
            Ok(sample) => Some(sample),
            Err(e) => {
                error!("Error getting system usage: {}", e);
                None
            }
        };
        let reachable = self.collaborators.prober.probe(&self.remote_host).await;

        let Some(embed) = present(sample.as_ref(), reachable) else {
            warn!("Metrics unavailable this cycle, status message left unchanged");
            return StatusOutcome::MetricsUnavailable;
        };

        match presenter.publish(&embed).await {
            Ok(handle) => {
                debug!("Status cycle finished (reachable: {})", reachable);
                StatusOutcome::Published { handle, reachable }
            }
            Err(e) => {
                error!("Failed to publish status: {}", e);
                StatusOutcome::PublishFailed
            }
        }
    }

    /// Alert once per login line never seen before
    pub async fn run_login_cycle(&self) -> LoginCycleReport {
        let mut ledger = self.ledger.lock().await;
        debug!("Login cycle started");

        let self_ip = resolve_self_ip(
            self.self_ip_mode,
            self.collaborators.ip_lookup.as_ref(),
            |name| std::env::var(name).ok(),
        )
        .await;
        let filters = IdentityFilters {
            username: self.username.clone(),
            self_ip,
        };

        let events = self
            .login_collector
            .collect_new_events(self.collaborators.shell.as_ref(), &filters)
            .await;

        let mut report = LoginCycleReport {
            candidates: events.len(),
            ..LoginCycleReport::default()
        };

        for event in events {
            if !ledger.admit(&event) {
                report.skipped += 1;
                continue;
            }
            match self
                .collaborators
                .chat
                .send(&self.logins_channel, &login_alert(&event))
                .await
            {
                Ok(_) => {
                    info!("Login alert sent: {}", event);
                    report.alerted += 1;
                }
                Err(e) => {
                    error!("Failed to send login alert: {}", e);
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Login cycle finished: {} new, {} already reported, ledger size {}",
            report.alerted,
            report.skipped,
            ledger.len()
        );
        report
    }

    pub async fn status_message(&self) -> Option<MessageHandle> {
        self.status.lock().await.handle().cloned()
    }

    pub async fn reported_logins(&self) -> usize {
        self.ledger.lock().await.len()
    }

    fn is_status_command(&self, content: &str) -> bool {
        let Some(rest) = content.trim().strip_prefix(self.command_prefix.as_str()) else {
            return false;
        };
        rest.split_whitespace().next() == Some("status")
    }

    /// `!status`: run a status cycle, then try to delete the invoking message
    pub async fn handle_status_command(&self, message: &IncomingMessage) -> StatusOutcome {
        info!("Status requested by message {}", message.id);
        let outcome = self.run_status_cycle().await;

        match self.collaborators.chat.delete(&message.handle()).await {
            Ok(()) => debug!("Command message {} deleted", message.id),
            Err(ChannelError::Permission(_)) => warn!("Bot lacks permission to delete messages."),
            Err(e) => warn!("Failed to delete message: {}", e),
        }
        outcome
    }

    /// Read new messages in the command channels and run any `!status`
    ///
    /// The first poll of a channel only records the newest message id.
    pub async fn poll_commands(&self) -> usize {
        let mut cursors = self.command_cursors.lock().await;
        let mut handled = 0;

        for channel in &self.command_channels {
            let first_poll = !cursors.contains_key(&channel.id);
            let after = cursors.get(&channel.id).cloned().flatten();

            let messages = match self
                .collaborators
                .chat
                .recent_messages(channel, after.as_deref())
                .await
            {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("Failed to poll channel {} for commands: {}", channel.id, e);
                    continue;
                }
            };

            let newest = messages.last().map(|m| m.id.clone()).or(after);
            cursors.insert(channel.id, newest);
            if first_poll {
                continue;
            }

            for message in messages {
                if message.author_is_bot || !self.is_status_command(&message.content) {
                    continue;
                }
                self.handle_status_command(&message).await;
                handled += 1;
            }
        }

        handled
    }

    /// Spawn the status, login and command timers
    pub fn spawn_timers(
        self: &Arc<Self>,
        schedule: &ScheduleConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<PeriodicTimer> {
        let status_service = Arc::clone(self);
        let status = PeriodicTimer::spawn(
            "status",
            Duration::from_secs(schedule.status_interval_secs),
            shutdown.clone(),
            move || {
                let service = Arc::clone(&status_service);
                async move {
                    service.run_status_cycle().await;
                }
            },
        );

        let login_service = Arc::clone(self);
        let logins = PeriodicTimer::spawn(
            "logins",
            Duration::from_secs(schedule.login_interval_secs),
            shutdown.clone(),
            move || {
                let service = Arc::clone(&login_service);
                async move {
                    service.run_login_cycle().await;
                }
            },
        );

        let command_service = Arc::clone(self);
        let commands = PeriodicTimer::spawn(
            "commands",
            Duration::from_secs(schedule.command_poll_secs),
            shutdown,
            move || {
                let service = Arc::clone(&command_service);
                async move {
                    service.poll_commands().await;
                }
            },
        );

        vec![status, logins, commands]
    }
}
