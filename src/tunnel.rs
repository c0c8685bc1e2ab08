//! Development helper: expose the local port through ngrok.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::config::TunnelConfig;

const POLL_ATTEMPTS: u32 = 20;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<TunnelInfo>,
}

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    public_url: String,
    #[serde(default)]
    proto: String,
}

/// A running ngrok process. The process is killed when this is dropped.
pub struct Tunnel {
    pub public_url: String,
    _child: Child,
}

/// First HTTPS public URL in an `/api/tunnels` response body.
fn https_url(body: &str) -> Result<Option<String>> {
    let list: TunnelList = serde_json::from_str(body).context("Unexpected ngrok API response")?;
    Ok(list
        .tunnels
        .into_iter()
        .find(|t| t.proto == "https" || t.public_url.starts_with("https://"))
        .map(|t| t.public_url))
}

/// One look at the inspection API. Any failure means "not ready yet".
async fn poll_once(client: &reqwest::Client, api: &str, attempt: u32) -> Option<String> {
    let response = match client.get(api).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!("ngrok API not ready (attempt {}): {}", attempt, e);
            return None;
        }
    };
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!("Failed to read ngrok API response (attempt {}): {}", attempt, e);
            return None;
        }
    };
    match https_url(&body) {
        Ok(url) => url,
        Err(e) => {
            debug!("{:#} (attempt {})", e, attempt);
            None
        }
    }
}

pub async fn open(config: &TunnelConfig, port: u16) -> Result<Tunnel> {
    let child = Command::new(&config.ngrok_command)
        .arg("http")
        .arg(port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {}", config.ngrok_command))?;

    let api = format!("{}/api/tunnels", config.inspect_url.trim_end_matches('/'));
    let client = reqwest::Client::new();

    for attempt in 1..=POLL_ATTEMPTS {
        tokio::time::sleep(POLL_INTERVAL).await;
        if let Some(public_url) = poll_once(&client, &api, attempt).await {
            info!("Tunnel URL: {}", public_url);
            return Ok(Tunnel {
                public_url,
                _child: child,
            });
        }
    }

    anyhow::bail!(
        "ngrok did not report a public URL after {} attempts",
        POLL_ATTEMPTS
    )
}
