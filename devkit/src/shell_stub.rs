/*!
Faux transport SSH, sonde ping et lookup d'IP publique

Le shell répond aux commandes selon des motifs scriptés (sous-chaîne de la
commande) et compte les sessions ouvertes / fermées pour vérifier que les
collecteurs ferment toujours leur session.
*/

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vpswatch_agent::discovery::PublicIpLookup;
use vpswatch_agent::error::{LookupError, TransportError};
use vpswatch_agent::execution::{CommandOutput, Reachability, RemoteSession, RemoteShell};

/// Commande exécutée, avec l'entrée interactive éventuelle
#[derive(Debug, Clone, PartialEq)]
pub struct ExecRecord {
    pub command: String,
    pub interactive_input: Option<String>,
}

#[derive(Default)]
struct ShellState {
    /// (motif, réponse) - le premier motif contenu dans la commande gagne
    responses: Vec<(String, Result<CommandOutput, String>)>,
    executed: Vec<ExecRecord>,
    open_failure: Option<String>,
}

/// Mock SSH qui implémente `RemoteShell`
#[derive(Clone, Default)]
pub struct MockRemoteShell {
    state: Arc<Mutex<ShellState>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockRemoteShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Répond `stdout` (code 0) aux commandes contenant `pattern`
    pub fn respond(&self, pattern: &str, stdout: impl Into<String>) {
        self.respond_with(
            pattern,
            Ok(CommandOutput {
                stdout: stdout.into(),
                stderr: String::new(),
                exit_status: 0,
            }),
        );
    }

    /// Réponse complète (ou erreur d'exécution) pour `pattern`
    pub fn respond_with(&self, pattern: &str, response: Result<CommandOutput, String>) {
        let mut state = self.state.lock().unwrap();
        state.responses.retain(|(p, _)| p != pattern);
        state.responses.push((pattern.to_string(), response));
    }

    /// Fait échouer `open` (hôte injoignable, auth refusée...)
    pub fn fail_open(&self, message: Option<&str>) {
        self.state.lock().unwrap().open_failure = message.map(str::to_string);
    }

    pub fn executed(&self) -> Vec<ExecRecord> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn opened_sessions(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteShell for MockRemoteShell {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, TransportError> {
        if let Some(message) = self.state.lock().unwrap().open_failure.clone() {
            return Err(TransportError::Connect {
                host: "mock-vps".to_string(),
                message,
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            shell: self.clone(),
            closed: false,
        }))
    }
}

struct MockSession {
    shell: MockRemoteShell,
    closed: bool,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(
        &mut self,
        command: &str,
        interactive_input: Option<&str>,
    ) -> Result<CommandOutput, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut state = self.shell.state.lock().unwrap();
        state.executed.push(ExecRecord {
            command: command.to_string(),
            interactive_input: interactive_input.map(str::to_string),
        });
        log::info!("💻 [MOCK] exec: {}", command);

        let response = state
            .responses
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());

        match response {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(TransportError::Exec(message)),
            None => Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("[MOCK] no response scripted for {command}"),
                exit_status: 127,
            }),
        }
    }

    async fn close(mut self: Box<Self>) {
        if !self.closed {
            self.closed = true;
            self.shell.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Sonde de joignabilité contrôlable
#[derive(Clone)]
pub struct StaticProber {
    online: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
}

impl StaticProber {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reachability for StaticProber {
    async fn probe(&self, _address: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

/// IP publique fixe, ou échec du lookup
#[derive(Clone, Default)]
pub struct StaticIpLookup {
    ip: Arc<Mutex<Option<IpAddr>>>,
}

impl StaticIpLookup {
    pub fn new(ip: Option<IpAddr>) -> Self {
        Self {
            ip: Arc::new(Mutex::new(ip)),
        }
    }

    pub fn set_ip(&self, ip: Option<IpAddr>) {
        *self.ip.lock().unwrap() = ip;
    }
}

#[async_trait]
impl PublicIpLookup for StaticIpLookup {
    async fn public_ip(&self) -> Result<IpAddr, LookupError> {
        self.ip
            .lock()
            .unwrap()
            .ok_or_else(|| LookupError::Request("[MOCK] lookup offline".to_string()))
    }
}

/// Helper pour fabriquer des sorties de commandes réalistes
pub struct OutputBuilder;

impl OutputBuilder {
    /// Sortie de `top -bn1 | grep -E 'Cpu\(s\)|MiB Mem'`
    pub fn top(cpu_user: f64, mem_total: f64, mem_free: f64) -> String {
        format!(
            "%Cpu(s): {cpu_user:>4.1} us,  1.0 sy,  0.0 ni, 95.0 id,  0.0 wa,  0.0 hi,  0.0 si,  0.0 st\n\
             MiB Mem : {mem_total:>8.1} total, {mem_free:>8.1} free,    100.0 used,    200.0 buff/cache\n"
        )
    }

    /// Ligne `Accepted` de /var/log/auth.log
    pub fn auth_line(user: &str, ip: &str, pid: u32) -> String {
        format!(
            "Jan 10 10:{:02}:{:02} vps sshd[{pid}]: Accepted password for {user} from {ip} port {} ssh2",
            pid % 60,
            (pid * 7) % 60,
            40000 + pid
        )
    }

    /// Tail tel que lu sur le PTY, avec le prompt sudo en tête
    pub fn auth_tail(sudo_user: &str, lines: &[String]) -> String {
        let mut out = format!("[sudo] password for {sudo_user}: \r\n");
        for line in lines {
            out.push_str(line);
            out.push_str("\r\n");
        }
        out
    }
}
