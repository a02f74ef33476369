//! Command execution for VPS Watch
//!
//! Handles the two ways the agent runs commands:
//! - Remote shell sessions on the monitored host (SSH, with PTY + stdin for sudo)
//! - Local reachability probing with a hard timeout (system `ping`)
//!
//! Both sit behind traits so the cycles can be driven by test doubles.

mod ping;
mod ssh;

pub use ping::PingProber;
pub use ssh::SshShell;

use crate::error::TransportError;
use async_trait::async_trait;
use serde::Serialize;

/// Output of one remote command
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// Factory for sessions against the monitored host
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, TransportError>;
}

/// One authenticated session; callers must `close` it on every path
#[async_trait]
pub trait RemoteSession: Send {
    /// Run `command` to completion. With `interactive_input`, a PTY is requested and
    /// the line is written to the channel once the command has started.
    async fn exec(
        &mut self,
        command: &str,
        interactive_input: Option<&str>,
    ) -> Result<CommandOutput, TransportError>;

    async fn close(self: Box<Self>);
}

/// Network liveness check, independent of the remote shell
#[async_trait]
pub trait Reachability: Send + Sync {
    /// True only on a successful echo reply; every failure is `false`
    async fn probe(&self, address: &str) -> bool;
}
