/*!
Test Harness pour l'agent VPS Watch

Facilite l'écriture de tests de cycles avec:
- Configuration complète sans variables d'environnement
- Mocks Discord / SSH / ping / IP publique déjà branchés
- Assertions sur les messages de statut et les alertes de connexion
*/

use crate::chat_stub::MockChatChannel;
use crate::shell_stub::{MockRemoteShell, OutputBuilder, StaticIpLookup, StaticProber};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use vpswatch_agent::config::{
    ENV_BOT_TOKEN, ENV_LOGINS_CHANNEL, ENV_REMOTE_HOST, ENV_REMOTE_PASSWORD, ENV_REMOTE_USER,
    ENV_STATUS_CHANNEL,
};
use vpswatch_agent::metrics::DIAGNOSTIC_COMMAND;
use vpswatch_agent::{Collaborators, MonitorService, WatchConfig};

pub const STATUS_CHANNEL: u64 = 1111;
pub const LOGINS_CHANNEL: u64 = 2222;
pub const MONITOR_USER: &str = "monitor";
pub const MONITOR_PASSWORD: &str = "s3cret";
pub const VPS_ADDRESS: &str = "203.0.113.10";

/// Harness de test complet pour `MonitorService`
pub struct TestHarness {
    pub chat: MockChatChannel,
    pub shell: MockRemoteShell,
    pub prober: StaticProber,
    pub ip_lookup: StaticIpLookup,
    pub config: WatchConfig,
}

impl TestHarness {
    /// Crée un harness: VPS joignable, lookup d'IP en échec, aucune sortie scriptée
    pub fn new() -> Self {
        env_logger::builder().is_test(true).try_init().ok(); // Init logging pour tests

        let env: HashMap<&str, String> = HashMap::from([
            (ENV_BOT_TOKEN, "mock-token".to_string()),
            (ENV_STATUS_CHANNEL, STATUS_CHANNEL.to_string()),
            (ENV_LOGINS_CHANNEL, LOGINS_CHANNEL.to_string()),
            (ENV_REMOTE_HOST, VPS_ADDRESS.to_string()),
            (ENV_REMOTE_USER, MONITOR_USER.to_string()),
            (ENV_REMOTE_PASSWORD, MONITOR_PASSWORD.to_string()),
        ]);
        let config = WatchConfig::from_sources(None, |key| env.get(key).cloned())
            .expect("harness config must be valid");

        Self {
            chat: MockChatChannel::new(),
            shell: MockRemoteShell::new(),
            prober: StaticProber::new(true),
            ip_lookup: StaticIpLookup::new(None),
            config,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            shell: Arc::new(self.shell.clone()),
            prober: Arc::new(self.prober.clone()),
            ip_lookup: Arc::new(self.ip_lookup.clone()),
            chat: Arc::new(self.chat.clone()),
        }
    }

    /// Construit le service sur les mocks
    pub async fn service(&self) -> Result<Arc<MonitorService>> {
        let service = MonitorService::connect(&self.config, self.collaborators()).await?;
        Ok(Arc::new(service))
    }

    /// Scripte la sortie de `top`
    pub fn set_metrics(&self, cpu_user: f64, mem_total: f64, mem_free: f64) {
        self.shell
            .respond("top -bn1", OutputBuilder::top(cpu_user, mem_total, mem_free));
    }

    /// Scripte le tail de auth.log (prompt sudo inclus)
    pub fn set_auth_tail(&self, lines: &[String]) {
        self.shell
            .respond("auth.log", OutputBuilder::auth_tail(MONITOR_USER, lines));
    }

    /// Nombre de commandes de diagnostic exécutées
    pub fn diagnostic_runs(&self) -> usize {
        self.shell
            .executed()
            .iter()
            .filter(|record| record.command == DIAGNOSTIC_COMMAND)
            .count()
    }

    /// Vérifie qu'un seul message de statut vit dans le canal
    pub fn assert_single_status_message(&self) -> Result<()> {
        let created = self.chat.sent_to(STATUS_CHANNEL).len();
        let live = self.chat.live_messages(STATUS_CHANNEL).len();
        if created != 1 || live != 1 {
            anyhow::bail!(
                "Expected exactly one status message, got {} created / {} live",
                created,
                live
            );
        }
        log::info!("✅ Single status message in channel {}", STATUS_CHANNEL);
        Ok(())
    }

    /// Vérifie le nombre d'alertes de connexion envoyées
    pub fn assert_login_alerts(&self, expected: usize) -> Result<()> {
        let actual = self.chat.sent_to(LOGINS_CHANNEL).len();
        if actual != expected {
            anyhow::bail!("Expected {} login alerts, got {}", expected, actual);
        }
        log::info!("✅ {} login alerts as expected", actual);
        Ok(())
    }

    /// Texte courant du message de statut
    pub fn status_text(&self) -> Option<String> {
        self.chat
            .live_messages(STATUS_CHANNEL)
            .first()
            .map(|(_, embed)| embed.text())
    }

    /// Vérifie que chaque session ouverte a été fermée
    pub fn assert_sessions_closed(&self) -> Result<()> {
        let (opened, closed) = (self.shell.opened_sessions(), self.shell.closed_sessions());
        if opened != closed {
            anyhow::bail!("{} sessions opened but {} closed", opened, closed);
        }
        Ok(())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let harness = TestHarness::new();
        harness.set_metrics(12.0, 1000.0, 500.0);

        let service = harness.service().await.unwrap();
        service.run_status_cycle().await;

        harness.assert_single_status_message().unwrap();
        harness.assert_sessions_closed().unwrap();
        assert_eq!(harness.diagnostic_runs(), 1);
        assert!(harness.status_text().unwrap().contains("12.00%"));
    }

    #[test]
    fn test_harness_config() {
        let harness = TestHarness::new();
        assert_eq!(harness.config.remote.username, MONITOR_USER);
        assert_eq!(harness.config.discord.logins_channel_id, LOGINS_CHANNEL);
    }
}
