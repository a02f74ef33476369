//! SSH login detection on the monitored host
//!
//! - Tails the auth log through sudo (password written to the PTY)
//! - Drops the agent's own logins (by username, and by public IP when known)
//! - Remembers every alerted line so each login is reported once per process

use crate::config::Secret;
use crate::execution::RemoteShell;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error, warn};

/// One `Accepted ...` line; the text is its own identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LoginEvent(String);

impl LoginEvent {
    pub fn new(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lines containing any of these are the agent's own activity
#[derive(Debug, Clone, Default)]
pub struct IdentityFilters {
    pub username: String,
    pub self_ip: Option<String>,
}

impl IdentityFilters {
    fn is_self(&self, line: &str) -> bool {
        if !self.username.is_empty() && line.contains(&self.username) {
            return true;
        }
        matches!(&self.self_ip, Some(ip) if !ip.is_empty() && line.contains(ip.as_str()))
    }
}

const ACCEPTED_MARKER: &str = "Accepted";

/// Keep `Accepted` lines that are not the agent's own logins, in log order
///
/// The PTY merges the sudo prompt and any echoed input into stdout, so the
/// remote grep alone does not guarantee authentication lines.
pub fn filter_events(output: &str, filters: &IdentityFilters) -> Vec<LoginEvent> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.contains(ACCEPTED_MARKER))
        .filter(|line| !filters.is_self(line))
        .map(LoginEvent::new)
        .collect()
}

/// Remote command listing recent successful authentications
pub fn auth_log_command(auth_log_path: &str, tail_lines: u32) -> String {
    format!("sudo tail -n {tail_lines} {auth_log_path} | grep 'Accepted'")
}

/// Collects candidate login events from the auth log tail
#[derive(Debug, Clone)]
pub struct LoginCollector {
    command: String,
    sudo_password: Secret,
}

impl LoginCollector {
    pub fn new(auth_log_path: &str, tail_lines: u32, sudo_password: Secret) -> Self {
        Self {
            command: auth_log_command(auth_log_path, tail_lines),
            sudo_password,
        }
    }

    /// Login events in `output`, minus any echo of the sudo credential
    pub fn events_from_output(&self, output: &str, filters: &IdentityFilters) -> Vec<LoginEvent> {
        let mut events = filter_events(output, filters);
        let credential = self.sudo_password.expose();
        if !credential.is_empty() {
            events.retain(|event| event.as_str() != credential.trim());
        }
        events
    }

    /// Re-read the tail; any failure is reported as "no events"
    pub async fn collect_new_events(
        &self,
        shell: &dyn RemoteShell,
        filters: &IdentityFilters,
    ) -> Vec<LoginEvent> {
        let mut session = match shell.open().await {
            Ok(session) => session,
            Err(e) => {
                error!("Error getting login events: {}", e);
                return Vec::new();
            }
        };

        let result = session
            .exec(&self.command, Some(self.sudo_password.expose()))
            .await;
        session.close().await;

        match result {
            Ok(output) => {
                // grep exits 1 when nothing matched; only >1 is a real failure
                if output.exit_status > 1 {
                    warn!(
                        "Auth log command exited with {}: {}",
                        output.exit_status,
                        output.stderr.trim()
                    );
                    return Vec::new();
                }
                let events = self.events_from_output(&output.stdout, filters);
                debug!("Auth log tail yielded {} candidate logins", events.len());
                events
            }
            Err(e) => {
                error!("Error getting login events: {}", e);
                Vec::new()
            }
        }
    }
}

/// Identities already alerted; grows for the process lifetime
#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: HashSet<LoginEvent>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event`; true when it had not been seen before
    pub fn admit(&mut self, event: &LoginEvent) -> bool {
        if self.seen.contains(event) {
            return false;
        }
        self.seen.insert(event.clone())
    }

    pub fn contains(&self, event: &LoginEvent) -> bool {
        self.seen.contains(event)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTH_TAIL: &str = "\
[sudo] password for monitor: \r
Jan 10 10:00:01 vps sshd[101]: Accepted publickey for alice from 198.51.100.20 port 50122 ssh2\r
Jan 10 10:02:13 vps sshd[140]: Accepted password for monitor from 203.0.113.50 port 40022 ssh2\r
Jan 10 10:05:42 vps sshd[188]: Accepted password for root from 203.0.113.50 port 40100 ssh2\r
\r
";

    fn filters(self_ip: Option<&str>) -> IdentityFilters {
        IdentityFilters {
            username: "monitor".to_string(),
            self_ip: self_ip.map(str::to_string),
        }
    }

    #[test]
    fn test_username_lines_and_prompt_dropped() {
        let events = filter_events(AUTH_TAIL, &filters(None));
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.as_str().contains("monitor")));
        assert!(events[0].as_str().contains("alice"));
        assert!(events[1].as_str().contains("root"));
    }

    #[test]
    fn test_self_ip_filter() {
        let events = filter_events(AUTH_TAIL, &filters(Some("203.0.113.50")));
        assert_eq!(events.len(), 1);
        assert!(events[0].as_str().contains("alice"));
    }

    #[test]
    fn test_echoed_password_is_not_an_event() {
        let output = "s3cret\r\n[sudo] password for monitor: \r\n\
                      Jan 10 10:00:01 vps sshd[101]: Accepted publickey for alice from 198.51.100.20 port 50122 ssh2\r\n";
        let events = filter_events(output, &filters(None));
        assert_eq!(events.len(), 1);
        assert!(events[0].as_str().contains("Accepted publickey for alice"));
        assert!(events.iter().all(|e| !e.as_str().contains("s3cret")));
    }

    #[test]
    fn test_non_auth_lines_dropped() {
        let output = "sudo: unable to resolve host vps\nLast login: Mon Jan 10\n\n";
        assert!(filter_events(output, &filters(None)).is_empty());
    }

    #[test]
    fn test_collector_drops_credential_echo() {
        // a credential that would pass the Accepted filter on its own
        let collector = LoginCollector::new("/var/log/auth.log", 20, Secret::new("Accepted!42"));
        let output = "Accepted!42\r\n\
                      Jan 10 10:05:42 vps sshd[188]: Accepted password for root from 203.0.113.50 port 40100 ssh2\r\n";
        let events = collector.events_from_output(output, &filters(None));
        assert_eq!(events.len(), 1);
        assert!(events[0].as_str().contains("root"));
    }

    #[test]
    fn test_collector_debug_hides_credential() {
        let collector = LoginCollector::new("/var/log/auth.log", 20, Secret::new("hunter2"));
        assert!(!format!("{:?}", collector).contains("hunter2"));
    }

    #[test]
    fn test_username_filter_any_surrounding_text() {
        for line in ["Accepted monitor", "Accepted xxmonitorxx", "Accepted for monitor", "Accepted monitor from 1.2.3.4"] {
            assert!(filter_events(line, &filters(None)).is_empty(), "{line}");
        }
    }

    #[test]
    fn test_empty_self_ip_is_inactive() {
        let events = filter_events(AUTH_TAIL, &filters(Some("")));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_lines_are_trimmed_identities() {
        let events = filter_events("  Accepted password for bob  \r\n", &filters(None));
        assert_eq!(events, vec![LoginEvent::new("Accepted password for bob")]);
    }

    #[test]
    fn test_ledger_admits_once() {
        let mut ledger = DedupLedger::new();
        let event = LoginEvent::new("Accepted password for root");

        assert!(ledger.admit(&event));
        for _ in 0..5 {
            assert!(!ledger.admit(&event));
        }
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains(&event));
        assert!(!ledger.contains(&LoginEvent::new("Accepted password for root ")));
    }

    #[test]
    fn test_auth_log_command() {
        assert_eq!(
            auth_log_command("/var/log/auth.log", 20),
            "sudo tail -n 20 /var/log/auth.log | grep 'Accepted'"
        );
    }
}
