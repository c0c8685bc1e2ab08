pub mod telegram;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// One inbound event as posted to the webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookUpdate {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    /// Available sizes of a photo, smallest first.
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl IncomingMessage {
    /// File reference of the attachment, preferring the largest photo size
    /// over a document.
    pub fn attachment_file_id(&self) -> Option<&str> {
        if let Some(last) = self.photo.as_ref().and_then(|sizes| sizes.last()) {
            return Some(&last.file_id);
        }
        self.document.as_ref().map(|d| d.file_id.as_str())
    }

    /// Attachment details for logging, e.g. `1280x853` or `scan.png (image/png)`.
    pub fn attachment_details(&self) -> Option<String> {
        if let Some(last) = self.photo.as_ref().and_then(|sizes| sizes.last()) {
            return Some(format!("{}x{}", last.width, last.height));
        }
        let document = self.document.as_ref()?;
        let name = document.file_name.as_deref().unwrap_or("unnamed");
        Some(match &document.mime_type {
            Some(mime) => format!("{} ({})", name, mime),
            None => name.to_string(),
        })
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        if self.photo.as_ref().is_some_and(|p| !p.is_empty()) {
            "photo"
        } else if self.document.is_some() {
            "document"
        } else if self.text.is_some() {
            "text"
        } else {
            "other"
        }
    }
}

/// A body is usable when it has a `message` carrying text, a photo or a
/// document.
pub fn is_valid_update(data: &Value) -> bool {
    let Some(message) = data.get("message").and_then(Value::as_object) else {
        return false;
    };
    ["text", "photo", "document"]
        .iter()
        .any(|key| message.contains_key(*key))
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send one text message to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Resolve a file reference and write its bytes to `dest`.
    async fn download(&self, file_id: &str, dest: &Path) -> Result<()>;
}
