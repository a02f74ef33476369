//! Error taxonomy shared by the collectors, the presenter and the chat client
//!
//! Every variant here is caught at a cycle boundary and turned into
//! "no data this cycle"; only `ConfigError` can stop the process.

use thiserror::Error;

/// Remote session open / exec failure
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {host}: {message}")]
    Connect { host: String, message: String },

    #[error("authentication rejected for user {0}")]
    Authentication(String),

    #[error("remote command failed: {0}")]
    Exec(String),

    #[error("session already closed")]
    Closed,
}

/// Unexpected shape of the diagnostic command output
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("missing {0} line in diagnostic output")]
    MissingLine(&'static str),

    #[error("missing {field} field in line {line:?}")]
    MissingField { field: &'static str, line: String },

    #[error("invalid number {value:?} for {field}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Failure of a full telemetry collection
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Public IP lookup failure; degrades the self-IP filter only
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("ip lookup request failed: {0}")]
    Request(String),

    #[error("ip lookup returned an invalid address: {0}")]
    InvalidAddress(String),
}

/// Chat platform failure on lookup / send / edit / delete
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("missing permission: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("chat api returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("chat request failed: {0}")]
    Request(String),

    #[error("unexpected chat api response: {0}")]
    InvalidResponse(String),
}

/// Startup configuration problem (fatal)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to read config file {path}: {message}")]
    File { path: String, message: String },
}
