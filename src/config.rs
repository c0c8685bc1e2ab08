use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which webhook flow the server runs.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    /// Relay plain text to the completion API.
    Chat,
    /// OCR an attached image and summarize it.
    #[default]
    Ocr,
}

impl std::fmt::Display for BotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotMode::Chat => write!(f, "chat"),
            BotMode::Ocr => write!(f, "ocr"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return self.base_url.trim_end_matches('/');
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub mode: BotMode,
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
    #[serde(default = "default_not_whitelisted_message")]
    pub not_whitelisted_message: String,
    /// Checked against `X-Telegram-Bot-Api-Secret-Token` when set.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_command")]
    pub command: String,
    #[serde(default = "default_ocr_languages")]
    pub languages: String,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_ocr_command(),
            languages: default_ocr_languages(),
            download_dir: default_download_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TunnelConfig {
    #[serde(default = "default_ngrok_command")]
    pub ngrok_command: String,
    #[serde(default = "default_inspect_url")]
    pub inspect_url: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ngrok_command: default_ngrok_command(),
            inspect_url: default_inspect_url(),
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_not_whitelisted_message() -> String {
    "You are not whitelisted. Please request access from the bot owner".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_ocr_command() -> String {
    "tesseract".to_string()
}

fn default_ocr_languages() -> String {
    "eng".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_ngrok_command() -> String {
    "ngrok".to_string()
}

fn default_inspect_url() -> String {
    "http://127.0.0.1:4040".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;

        if !config.ocr.download_dir.exists() {
            std::fs::create_dir_all(&config.ocr.download_dir).with_context(|| {
                format!(
                    "Failed to create download directory: {}",
                    config.ocr.download_dir.display()
                )
            })?;
        }

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Secrets may come from the environment instead of the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                self.telegram.bot_token = token;
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.llm.api_key = key;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token is empty (set it in the config or TELEGRAM_BOT_TOKEN)");
        }
        if self.llm.api_key.trim().is_empty() && self.llm.provider != LlmProvider::Ollama {
            anyhow::bail!(
                "llm.api_key is empty for provider '{}' (set it in the config or OPENAI_API_KEY)",
                self.llm.provider
            );
        }
        if self.mode == BotMode::Chat && self.telegram.allowed_chat_ids.is_empty() {
            tracing::warn!("Chat mode with an empty allow-list: every chat will be rejected");
        }
        Ok(())
    }
}
