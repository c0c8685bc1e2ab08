mod access;
mod bot;
mod config;
mod files;
mod llm;
mod messages;
mod ocr;
mod platform;
mod processor;
mod tunnel;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::platform::telegram::TelegramRelay;

/// How the webhook URL gets registered before serving.
enum Startup {
    Serve,
    Register(String),
    Tunnel,
}

fn parse_args(args: &[String]) -> Result<(PathBuf, Startup)> {
    let mut config_path = None;
    let mut startup = Startup::Serve;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--tunnel" => startup = Startup::Tunnel,
            "--register" => {
                let url = iter.next().context("--register needs a public URL")?;
                startup = Startup::Register(url.clone());
            }
            other => config_path = Some(PathBuf::from(other)),
        }
    }

    Ok((
        config_path.unwrap_or_else(|| PathBuf::from("config.toml")),
        startup,
    ))
}

fn webhook_url(public_url: &str) -> String {
    format!("{}/webhook", public_url.trim_end_matches('/'))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,snapnote=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, startup) = parse_args(&args)?;

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Mode: {}", config.mode);
    info!("  Model: {} ({})", config.llm.model, config.llm.provider);
    info!("  Allowed chats: {:?}", config.telegram.allowed_chat_ids);
    info!("  Download dir: {}", config.ocr.download_dir.display());

    let relay = Arc::new(TelegramRelay::new(&config.telegram.bot_token));
    let secret = config.telegram.webhook_secret.as_deref().filter(|s| !s.is_empty());

    // Held for the lifetime of the server; dropping it stops ngrok.
    let _tunnel = match startup {
        Startup::Serve => None,
        Startup::Register(public_url) => {
            relay.register_webhook(&webhook_url(&public_url), secret).await?;
            None
        }
        Startup::Tunnel => {
            let tunnel = tunnel::open(&config.tunnel, config.server.port).await?;
            relay
                .register_webhook(&webhook_url(&tunnel.public_url), secret)
                .await?;
            Some(tunnel)
        }
    };

    let state = Arc::new(AppState::new(&config, relay));

    bot::run(state, &config.server.host, config.server.port).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_config_path() {
        let (path, startup) = parse_args(&[]).unwrap();
        assert_eq!(path, PathBuf::from("config.toml"));
        assert!(matches!(startup, Startup::Serve));
    }

    #[test]
    fn test_tunnel_flag_and_path() {
        let (path, startup) = parse_args(&args(&["bot.toml", "--tunnel"])).unwrap();
        assert_eq!(path, PathBuf::from("bot.toml"));
        assert!(matches!(startup, Startup::Tunnel));
    }

    #[test]
    fn test_register_needs_url() {
        assert!(parse_args(&args(&["--register"])).is_err());
        let (_, startup) = parse_args(&args(&["--register", "https://x.example"])).unwrap();
        assert!(matches!(startup, Startup::Register(url) if url == "https://x.example"));
    }

    #[test]
    fn test_webhook_url() {
        assert_eq!(webhook_url("https://abc.ngrok.io/"), "https://abc.ngrok.io/webhook");
        assert_eq!(webhook_url("https://abc.ngrok.io"), "https://abc.ngrok.io/webhook");
    }
}
