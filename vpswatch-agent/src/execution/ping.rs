use super::Reachability;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

/// Single-packet ICMP echo through the system `ping`
#[derive(Debug, Clone)]
pub struct PingProber {
    timeout: Duration,
}

impl PingProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(&self, address: &str) -> AsyncCommand {
        let mut cmd = AsyncCommand::new("ping");
        if cfg!(target_os = "windows") {
            cmd.args(["-n", "1", "-w", &self.timeout.as_millis().to_string()]);
        } else {
            // -W takes whole seconds on Linux
            let secs = self.timeout.as_secs().max(1);
            cmd.args(["-c", "1", "-W", &secs.to_string()]);
        }
        cmd.arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Reachability for PingProber {
    async fn probe(&self, address: &str) -> bool {
        // Outer bound in case the platform ignores the per-packet timeout
        let deadline = self.timeout + Duration::from_secs(1);
        let status = tokio::time::timeout(deadline, self.command(address).status()).await;

        match status {
            Ok(Ok(status)) => {
                debug!("Ping {} exited with {:?}", address, status.code());
                status.success()
            }
            Ok(Err(e)) => {
                warn!("Error checking server status: {}", e);
                false
            }
            Err(_) => {
                debug!("Ping {} timed out after {:?}", address, deadline);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unresolvable_address_is_offline() {
        let prober = PingProber::new(Duration::from_secs(1));
        assert!(!prober.probe("invalid.host.vpswatch.test").await);
    }

    #[tokio::test]
    async fn test_probe_never_exceeds_deadline() {
        let prober = PingProber::new(Duration::from_secs(1));
        let start = std::time::Instant::now();
        // TEST-NET-1, not routed
        let _ = prober.probe("192.0.2.1").await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
