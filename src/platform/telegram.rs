use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::payloads::SetWebhookSetters;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::{debug, info};

use super::Messenger;

/// Telegram rejects messages over 4096 characters.
pub const MAX_MESSAGE_CHARS: usize = 4095;

/// Split text into pieces of at most `max_chars` characters. Counts
/// characters rather than bytes so multi-byte text is never cut mid-char.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    chunks.push(current);

    chunks
}

/// Bot API client for one bot token.
pub struct TelegramRelay {
    bot: Bot,
}

impl TelegramRelay {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Point the bot's webhook at `url`.
    pub async fn register_webhook(&self, url: &str, secret: Option<&str>) -> Result<()> {
        let url = reqwest::Url::parse(url)
            .with_context(|| format!("Invalid webhook URL: {}", url))?;

        let mut request = self.bot.set_webhook(url.clone());
        if let Some(secret) = secret {
            request = request.secret_token(secret.to_string());
        }
        request
            .await
            .with_context(|| format!("Failed to register webhook {}", url))?;

        info!("Webhook registered: {}", url);
        Ok(())
    }
}

#[async_trait]
impl Messenger for TelegramRelay {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        debug!("Sending {} chars to chat {}", text.chars().count(), chat_id);
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        Ok(())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<()> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .with_context(|| format!("Failed to resolve file {}", file_id))?;

        let mut dst = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .with_context(|| format!("Failed to download {}", file.path))?;

        debug!("Downloaded {} to {}", file_id, dest.display());
        Ok(())
    }
}
