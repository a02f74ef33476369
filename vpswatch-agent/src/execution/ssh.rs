use super::{CommandOutput, RemoteSession, RemoteShell};
use crate::config::RemoteConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// SSH transport backed by libssh2, password authentication
///
/// libssh2 is blocking, so every call runs on the blocking pool and the
/// session is moved in and out of the worker.
#[derive(Clone)]
pub struct SshShell {
    config: RemoteConfig,
}

impl SshShell {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    fn connect_blocking(config: &RemoteConfig) -> Result<Session, TransportError> {
        let connect_err = |message: String| TransportError::Connect {
            host: config.host.clone(),
            message,
        };

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?
            .next()
            .ok_or_else(|| connect_err("no address resolved".to_string()))?;

        let tcp = TcpStream::connect_timeout(&addr, Duration::from_secs(config.connect_timeout_secs))
            .map_err(|e| connect_err(e.to_string()))?;

        let mut session = Session::new().map_err(|e| connect_err(e.to_string()))?;
        session.set_timeout(timeout_millis(config.session_timeout_secs));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| connect_err(e.to_string()))?;

        session
            .userauth_password(&config.username, config.password.expose())
            .map_err(|_| TransportError::Authentication(config.username.clone()))?;
        if !session.authenticated() {
            return Err(TransportError::Authentication(config.username.clone()));
        }

        Ok(session)
    }
}

fn timeout_millis(secs: u64) -> u32 {
    u32::try_from(secs.saturating_mul(1000)).unwrap_or(u32::MAX)
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, TransportError> {
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || Self::connect_blocking(&config))
            .await
            .map_err(|e| TransportError::Exec(format!("ssh worker failed: {e}")))??;

        debug!("SSH session opened to {}:{}", self.config.host, self.config.port);
        Ok(Box::new(SshSession {
            session: Some(session),
        }))
    }
}

struct SshSession {
    session: Option<Session>,
}

fn exec_blocking(
    session: &Session,
    command: &str,
    interactive_input: Option<&str>,
) -> Result<CommandOutput, TransportError> {
    let exec_err = |e: ssh2::Error| TransportError::Exec(e.to_string());
    let io_err = |e: std::io::Error| TransportError::Exec(e.to_string());

    let mut channel = session.channel_session().map_err(exec_err)?;
    if interactive_input.is_some() {
        channel.request_pty("xterm", None, None).map_err(exec_err)?;
    }
    channel.exec(command).map_err(exec_err)?;

    if let Some(input) = interactive_input {
        channel.write_all(input.as_bytes()).map_err(io_err)?;
        channel.write_all(b"\n").map_err(io_err)?;
        channel.flush().map_err(io_err)?;
    }

    let mut stdout = String::new();
    channel.read_to_string(&mut stdout).map_err(io_err)?;
    let mut stderr = String::new();
    channel.stderr().read_to_string(&mut stderr).map_err(io_err)?;

    channel.wait_close().map_err(exec_err)?;
    let exit_status = channel.exit_status().map_err(exec_err)?;

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_status,
    })
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(
        &mut self,
        command: &str,
        interactive_input: Option<&str>,
    ) -> Result<CommandOutput, TransportError> {
        let session = self.session.take().ok_or(TransportError::Closed)?;
        let command = command.to_string();
        let input = interactive_input.map(str::to_string);

        debug!("Executing remote command: {}", command);
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = exec_blocking(&session, &command, input.as_deref());
            (session, result)
        })
        .await
        .map_err(|e| TransportError::Exec(format!("ssh worker failed: {e}")))?;

        self.session = Some(session);
        result
    }

    async fn close(mut self: Box<Self>) {
        if let Some(session) = self.session.take() {
            let closed = tokio::task::spawn_blocking(move || {
                session.disconnect(None, "vpswatch cycle complete", None)
            })
            .await;
            match closed {
                Ok(Ok(())) => debug!("SSH session closed"),
                Ok(Err(e)) => debug!("SSH disconnect reported: {}", e),
                Err(e) => debug!("SSH disconnect worker failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_millis_saturates() {
        assert_eq!(timeout_millis(30), 30_000);
        assert_eq!(timeout_millis(u64::MAX), u32::MAX);
    }

    #[tokio::test]
    async fn test_open_unresolvable_host_fails() {
        let shell = SshShell::new(RemoteConfig {
            host: "invalid.host.vpswatch.test".to_string(),
            connect_timeout_secs: 1,
            ..RemoteConfig::default()
        });
        let result = shell.open().await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
