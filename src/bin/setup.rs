//! snapnote setup wizard.
//!
//! Asks for the bot token, completion API key and the other settings in the
//! terminal and writes a ready-to-use `config.toml` to the project root
//! (`SNAPNOTE_ROOT`, default the current directory).
//!
//! With `--print`: writes the generated config to stdout instead.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    mode: &'a str,
    tg_token: &'a str,
    chat_ids: &'a [i64],
    api_key: &'a str,
    provider: &'a str,
    model: &'a str,
    port: u16,
    download_dir: &'a str,
    webhook_secret: &'a str,
}

/// A TOML string literal, quoted and escaped.
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_owned()).to_string()
}

fn parse_chat_ids(input: &str) -> Result<Vec<i64>> {
    input
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("'{s}' is not a numeric chat ID"))
        })
        .collect()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let ids_str = p
        .chat_ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let secret_line = if p.webhook_secret.is_empty() {
        "# webhook_secret = \"random-string\"".to_owned()
    } else {
        format!("webhook_secret = {}", quoted(p.webhook_secret))
    };

    let mode = quoted(p.mode);
    let tg_token = quoted(p.tg_token);
    let api_key = quoted(p.api_key);
    let provider = quoted(p.provider);
    let model = quoted(p.model);
    let port = p.port;
    let download_dir = quoted(p.download_dir);

    format!(
        r#"mode = {mode}

[telegram]
bot_token = {tg_token}
allowed_chat_ids = [{ids_str}]
{secret_line}

[llm]
provider = {provider}
model = {model}
api_key = {api_key}
system_prompt = "You are a helpful assistant."

[server]
host = "127.0.0.1"
port = {port}

[ocr]
command = "tesseract"
languages = "eng"
download_dir = {download_dir}
"#
    )
}

fn normalize_mode(input: &str) -> Result<&'static str> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" | "ocr" => Ok("ocr"),
        "chat" => Ok("chat"),
        other => anyhow::bail!("Unknown mode '{other}' (expected 'chat' or 'ocr')"),
    }
}

// ── CLI wizard ─────────────────────────────────────────────────────────────────

fn run_cli() -> Result<String> {
    println!("=== snapnote setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let mode = normalize_mode(&read_line("Mode, chat or ocr [ocr]: ")?)?;
    let tg_token = read_line("Telegram bot token: ")?;
    let chat_ids = parse_chat_ids(&read_line("Allowed chat IDs (comma-separated): ")?)?;
    let provider = or_default(read_line("LLM provider [openai]: ")?, "openai");
    let api_key = read_line("Completion API key: ")?;
    let model = or_default(read_line("Model [gpt-3.5-turbo]: ")?, "gpt-3.5-turbo");
    let port: u16 = or_default(read_line("Port [5000]: ")?, "5000")
        .parse()
        .context("Port must be a number")?;
    let download_dir = or_default(read_line("Download directory [downloads]: ")?, "downloads");
    let webhook_secret = read_line("Webhook secret (optional): ")?;

    Ok(format_config(&ConfigParams {
        mode,
        tg_token: &tg_token,
        chat_ids: &chat_ids,
        api_key: &api_key,
        provider: &provider,
        model: &model,
        port,
        download_dir: &download_dir,
        webhook_secret: &webhook_secret,
    }))
}

fn write_config(project_root: &Path, config: &str) -> Result<PathBuf> {
    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;
    Ok(config_path)
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let project_root =
        PathBuf::from(std::env::var("SNAPNOTE_ROOT").unwrap_or_else(|_| ".".to_string()));

    let config = run_cli()?;

    if args.iter().any(|a| a == "--print") {
        println!("\n{config}");
        return Ok(());
    }

    let path = write_config(&project_root, &config)?;
    println!("\n✓  config.toml saved to {}", path.display());
    println!("   Run the bot with:  cargo run -- config.toml --tunnel");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
