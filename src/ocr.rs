//! Text extraction through the Tesseract command line tool.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use image::DynamicImage;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::files::SavedFile;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// The engine refused the image because of its dimensions.
    #[error("{0}")]
    ImageTooLarge(String),
    #[error("{0}")]
    Failed(String),
    #[error("failed to run OCR engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to prepare image for OCR: {0}")]
    Prepare(String),
}

impl OcrError {
    pub fn is_too_large(&self) -> bool {
        matches!(self, OcrError::ImageTooLarge(_))
    }
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Map a failed run's stderr to an error.
pub fn classify_failure(stderr: &str) -> OcrError {
    let message = stderr.trim().to_string();
    if message.contains("Image too large") {
        OcrError::ImageTooLarge(message)
    } else if message.is_empty() {
        OcrError::Failed("OCR engine exited without output".to_string())
    } else {
        OcrError::Failed(message)
    }
}

pub struct TesseractCli {
    command: String,
    languages: String,
    scratch_dir: PathBuf,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, languages: impl Into<String>, scratch_dir: PathBuf) -> Self {
        Self {
            command: command.into(),
            languages: languages.into(),
            scratch_dir,
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn extract(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let scratch = SavedFile::new(self.scratch_dir.join(format!("ocr_{}.png", Uuid::new_v4())));

        let owned = image.clone();
        let path = scratch.path().to_path_buf();
        tokio::task::spawn_blocking(move || owned.save(&path))
            .await
            .map_err(|e| OcrError::Prepare(e.to_string()))?
            .map_err(|e| OcrError::Prepare(e.to_string()))?;

        debug!(
            "Running {} on {}x{} image",
            self.command,
            image.width(),
            image.height()
        );

        let output = Command::new(&self.command)
            .arg(scratch.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(OcrError::Spawn)?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
