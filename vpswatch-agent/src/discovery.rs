//! Self-identification of the agent on the public network
//!
//! The monitored host logs the agent's own SSH logins. This module finds
//! the address those logins come from so the login cycle can drop them:
//! - Public IP lookup over HTTP (ipify JSON shape)
//! - Resolution of the self-filter address according to `SelfIpMode`

use crate::config::SelfIpMode;
use crate::error::LookupError;
use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

/// External "what is my IP" service
#[async_trait]
pub trait PublicIpLookup: Send + Sync {
    async fn public_ip(&self) -> Result<IpAddr, LookupError>;
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// ipify-compatible lookup (`{"ip": "..."}`)
#[derive(Clone)]
pub struct HttpIpLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpIpLookup {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("vpswatch-agent")
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

fn parse_ip_response(body: &str) -> Result<IpAddr, LookupError> {
    let response: IpResponse =
        serde_json::from_str(body).map_err(|e| LookupError::InvalidAddress(e.to_string()))?;
    response
        .ip
        .trim()
        .parse()
        .map_err(|_| LookupError::InvalidAddress(response.ip.clone()))
}

#[async_trait]
impl PublicIpLookup for HttpIpLookup {
    async fn public_ip(&self) -> Result<IpAddr, LookupError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LookupError::Request(format!(
                "ip lookup returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;
        let ip = parse_ip_response(&body)?;
        debug!("Public IP resolved to {}", ip);
        Ok(ip)
    }
}

/// Address to drop from login events, or `None` when the filter is inactive
///
/// `EnvIndirect` reads the environment variable *named* after the looked-up
/// address, so it almost always yields `None`.
pub async fn resolve_self_ip<F>(
    mode: SelfIpMode,
    lookup: &dyn PublicIpLookup,
    env: F,
) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if mode == SelfIpMode::Off {
        return None;
    }

    let ip = match lookup.public_ip().await {
        Ok(ip) => ip,
        Err(e) => {
            warn!("Error retrieving public IP: {}", e);
            return None;
        }
    };

    match mode {
        SelfIpMode::Lookup => Some(ip.to_string()),
        SelfIpMode::EnvIndirect => env(&ip.to_string()).filter(|value| !value.is_empty()),
        SelfIpMode::Off => None,
    }
}
