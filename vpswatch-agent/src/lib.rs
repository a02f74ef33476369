//! VPS Watch Agent - remote VPS monitoring with Discord notifications
//!
//! The agent keeps an eye on one remote host:
//! - CPU / memory usage over SSH, shown in a single status message edited in place
//! - Reachability through an independent ping
//! - New SSH logins from the auth log, each alerted exactly once
//! - An on-demand `!status` command

pub mod chat;
pub mod config;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod logins;
pub mod metrics;
pub mod presenter;
pub mod scheduler;
pub mod service;

pub use config::WatchConfig;
pub use service::{Collaborators, LoginCycleReport, MonitorService, StatusOutcome};
