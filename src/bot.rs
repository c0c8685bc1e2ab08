use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use image::{DynamicImage, ImageReader};
use tracing::{debug, error, info, warn};

use crate::access::AccessGuard;
use crate::config::{BotMode, Config};
use crate::files;
use crate::llm::{Completion, LlmClient, ANSWER_INSTRUCTION};
use crate::messages;
use crate::ocr::{OcrEngine, TesseractCli};
use crate::platform::telegram::{chunk_text, MAX_MESSAGE_CHARS};
use crate::platform::{is_valid_update, IncomingMessage, Messenger, WebhookUpdate};
use crate::processor::{ImageProcessor, ProcessError};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared application state. Immutable once built; every request gets the
/// same `Arc`.
pub struct AppState {
    pub mode: BotMode,
    pub messenger: Arc<dyn Messenger>,
    pub llm: Arc<dyn Completion>,
    pub ocr: Arc<dyn OcrEngine>,
    pub guard: AccessGuard,
    pub download_dir: PathBuf,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(config: &Config, messenger: Arc<dyn Messenger>) -> Self {
        let ocr = TesseractCli::new(
            config.ocr.command.clone(),
            config.ocr.languages.clone(),
            config.ocr.download_dir.clone(),
        );
        Self {
            mode: config.mode,
            messenger,
            llm: Arc::new(LlmClient::new(config.llm.clone())),
            ocr: Arc::new(ocr),
            guard: AccessGuard::new(
                config.telegram.allowed_chat_ids.iter().copied(),
                config.telegram.not_whitelisted_message.clone(),
            ),
            download_dir: config.ocr.download_dir.clone(),
            webhook_secret: config
                .telegram
                .webhook_secret
                .clone()
                .filter(|s| !s.is_empty()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// Serve the webhook until Ctrl-C.
pub async fn run(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on http://{} ({} mode)", addr, state.mode);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if let Some(secret) = &state.webhook_secret {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(secret.as_str()) {
            warn!("Rejected webhook call with missing or wrong secret token");
            return (StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }

    let data: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("Webhook body is not JSON: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid data");
        }
    };
    if !is_valid_update(&data) {
        warn!("Webhook body has no usable message");
        return (StatusCode::BAD_REQUEST, "Invalid data");
    }
    let update: WebhookUpdate = match serde_json::from_value(data) {
        Ok(u) => u,
        Err(e) => {
            warn!("Webhook body does not match the update schema: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid data");
        }
    };
    let Some(message) = update.message else {
        return (StatusCode::BAD_REQUEST, "Invalid data");
    };

    match message.attachment_details() {
        Some(details) => info!(
            "Update {} from chat {} ({}: {})",
            update.update_id,
            message.chat.id,
            message.kind(),
            details
        ),
        None => info!(
            "Update {} from chat {} ({})",
            update.update_id,
            message.chat.id,
            message.kind()
        ),
    }

    match state.mode {
        BotMode::Chat => handle_chat(&state, &message).await,
        BotMode::Ocr => handle_image(&state, &message).await,
    }

    (StatusCode::OK, "OK")
}

async fn handle_chat(state: &AppState, message: &IncomingMessage) {
    let chat_id = message.chat.id;

    if !state.guard.is_allowed(chat_id) {
        warn!("Chat {} is not on the allow-list", chat_id);
        notify(state, chat_id, &state.guard.rejection_notice(chat_id)).await;
        return;
    }

    if let Err(e) = answer_text(state, chat_id, message.text.as_deref()).await {
        error!("Error answering chat {}: {:#}", chat_id, e);
        report_failure(state, chat_id, &e.to_string()).await;
    }
}

async fn answer_text(state: &AppState, chat_id: i64, text: Option<&str>) -> Result<()> {
    state.messenger.send_text(chat_id, messages::WORKING).await?;

    let text = match text {
        Some(t) if !t.is_empty() && t != "/start" => t,
        _ => return Ok(()),
    };

    let answer = state.llm.ask(ANSWER_INSTRUCTION, text).await?;
    for chunk in chunk_text(&answer, MAX_MESSAGE_CHARS) {
        state.messenger.send_text(chat_id, &chunk).await?;
    }
    Ok(())
}

async fn handle_image(state: &AppState, message: &IncomingMessage) {
    let chat_id = message.chat.id;
    notify(state, chat_id, messages::FILE_RECEIVED).await;

    let Some(file_id) = message.attachment_file_id() else {
        notify(state, chat_id, messages::NO_ATTACHMENT).await;
        return;
    };

    // `saved` removes the file when it goes out of scope, whatever happens below.
    let (saved, downloaded) =
        files::fetch_attachment(state.messenger.as_ref(), file_id, &state.download_dir).await;

    let outcome = match downloaded {
        Ok(()) => summarize_file(state, chat_id, saved.path()).await,
        Err(e) => Err(ProcessError::Other(e)),
    };

    match outcome {
        Ok(summary) => {
            notify(state, chat_id, messages::SUMMARIZED).await;
            for chunk in chunk_text(&summary, MAX_MESSAGE_CHARS) {
                notify(state, chat_id, &chunk).await;
            }
        }
        Err(ProcessError::Ocr(e)) => {
            warn!("OCR failed for chat {}: {}", chat_id, e);
            let notice = format!(
                "{}{}{}",
                messages::ERROR_PROCESSING_IMAGE,
                e,
                messages::ERROR_IN_IMAGE_SUFFIX
            );
            notify(state, chat_id, &notice).await;
        }
        Err(ProcessError::NoText) => {
            info!("No text found in image from chat {}", chat_id);
            notify(state, chat_id, messages::NO_TEXT).await;
        }
        Err(ProcessError::Other(e)) => {
            error!("Error processing image for chat {}: {:#}", chat_id, e);
            report_failure(state, chat_id, &e.to_string()).await;
        }
    }

    drop(saved);
}

async fn summarize_file(state: &AppState, chat_id: i64, path: &Path) -> Result<String, ProcessError> {
    let image = load_image(path).await?;
    debug!("Decoded {}x{} image", image.width(), image.height());

    let processor = ImageProcessor::new(
        state.messenger.as_ref(),
        state.ocr.as_ref(),
        state.llm.as_ref(),
    );
    processor.summarize(chat_id, image).await
}

/// Decode by content rather than extension; Telegram photos arrive as JPEG.
async fn load_image(path: &Path) -> Result<DynamicImage> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
        let reader = ImageReader::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("Failed to read {}", path.display()))?;
        reader.decode().context("Invalid image")
    })
    .await
    .context("Image decoding task failed")?
}

async fn report_failure(state: &AppState, chat_id: i64, detail: &str) {
    notify(state, chat_id, messages::ERROR).await;
    if !detail.is_empty() {
        notify(state, chat_id, detail).await;
    }
}

/// Best-effort send; failures are logged, never propagated.
async fn notify(state: &AppState, chat_id: i64, text: &str) {
    if let Err(e) = state.messenger.send_text(chat_id, text).await {
        error!("Failed to notify chat {}: {:#}", chat_id, e);
    }
}
