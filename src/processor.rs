use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{info, warn};

use crate::llm::{Completion, SUMMARY_INSTRUCTION};
use crate::messages;
use crate::ocr::{OcrEngine, OcrError};
use crate::platform::telegram::{chunk_text, MAX_MESSAGE_CHARS};
use crate::platform::Messenger;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{0}")]
    Ocr(#[from] OcrError),
    #[error("no text found in the image")]
    NoText,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// OCR + summary pipeline for one chat.
pub struct ImageProcessor<'a> {
    messenger: &'a dyn Messenger,
    ocr: &'a dyn OcrEngine,
    llm: &'a dyn Completion,
}

impl<'a> ImageProcessor<'a> {
    pub fn new(messenger: &'a dyn Messenger, ocr: &'a dyn OcrEngine, llm: &'a dyn Completion) -> Self {
        Self { messenger, ocr, llm }
    }

    /// Extract the text of `image`, relay it to the chat, and return a
    /// bulleted summary of it.
    pub async fn summarize(&self, chat_id: i64, image: DynamicImage) -> Result<String, ProcessError> {
        self.messenger.send_text(chat_id, messages::WORKING).await?;

        let text = self.extract_with_retry(image).await?;
        if text.trim().is_empty() {
            return Err(ProcessError::NoText);
        }
        info!("Extracted {} chars for chat {}", text.chars().count(), chat_id);

        self.messenger.send_text(chat_id, messages::EXTRACTED).await?;
        for chunk in chunk_text(&text, MAX_MESSAGE_CHARS) {
            self.messenger.send_text(chat_id, &chunk).await?;
        }

        let summary = self.llm.ask(SUMMARY_INSTRUCTION, &text).await?;
        Ok(summary.trim().to_string())
    }

    /// Run OCR; a size rejection gets exactly one more attempt at half width
    /// and height.
    async fn extract_with_retry(&self, image: DynamicImage) -> Result<String, OcrError> {
        match self.ocr.extract(&image).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_too_large() => {
                warn!(
                    "OCR rejected {}x{} image as too large, retrying at half size",
                    image.width(),
                    image.height()
                );
                let smaller = halve(image).await?;
                self.ocr.extract(&smaller).await
            }
            Err(e) => Err(e),
        }
    }
}

async fn halve(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    tokio::task::spawn_blocking(move || {
        let width = (image.width() / 2).max(1);
        let height = (image.height() / 2).max(1);
        image.resize_exact(width, height, FilterType::Triangle)
    })
    .await
    .map_err(|e| OcrError::Prepare(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Barrier;

    #[derive(Default)]
    pub struct FakeMessenger {
        pub sent: Mutex<Vec<(i64, String)>>,
        /// Bytes written by `download`; `None` makes the download fail.
        pub file_bytes: Option<Vec<u8>>,
        pub downloaded_to: Mutex<Vec<std::path::PathBuf>>,
        /// When set, every download waits here after writing its file.
        pub download_barrier: Option<Arc<Barrier>>,
    }

    impl FakeMessenger {
        pub fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }

        async fn download(&self, _file_id: &str, dest: &Path) -> Result<()> {
            self.downloaded_to.lock().unwrap().push(dest.to_path_buf());
            let Some(bytes) = &self.file_bytes else {
                anyhow::bail!("file not found");
            };
            std::fs::write(dest, bytes)?;
            if let Some(barrier) = &self.download_barrier {
                barrier.wait().await;
            }
            Ok(())
        }
    }

    pub struct FakeOcr {
        pub results: Mutex<VecDeque<Result<String, OcrError>>>,
        pub seen_sizes: Mutex<Vec<(u32, u32)>>,
    }

    impl FakeOcr {
        pub fn new(results: Vec<Result<String, OcrError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                seen_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OcrEngine for FakeOcr {
        async fn extract(&self, image: &DynamicImage) -> Result<String, OcrError> {
            self.seen_sizes
                .lock()
                .unwrap()
                .push((image.width(), image.height()));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OcrError::Failed("unexpected call".to_string())))
        }
    }

    pub struct FakeLlm {
        pub reply: Result<String, String>,
        pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl FakeLlm {
        pub fn new(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Every request fails with `message`.
        pub fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Completion for FakeLlm {
        fn system_prompt(&self) -> &str {
            "You are a helpful assistant."
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.reply.clone().map_err(anyhow::Error::msg)
        }
    }

    fn too_large() -> OcrError {
        OcrError::ImageTooLarge("Image too large: (9000, 7000)".to_string())
    }

    #[tokio::test]
    async fn test_success_relays_text_and_summarizes() {
        let messenger = FakeMessenger::default();
        let ocr = FakeOcr::new(vec![Ok("Invoice 42\nTotal: 10".to_string())]);
        let llm = FakeLlm::new("  - Invoice 42\n- Total 10  \n");
        let processor = ImageProcessor::new(&messenger, &ocr, &llm);

        let summary = processor
            .summarize(7, DynamicImage::new_rgb8(100, 80))
            .await
            .unwrap();

        assert_eq!(summary, "- Invoice 42\n- Total 10");
        assert_eq!(
            messenger.texts(),
            vec![
                messages::WORKING.to_string(),
                messages::EXTRACTED.to_string(),
                "Invoice 42\nTotal: 10".to_string(),
            ]
        );
        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0][1].content.as_deref(),
            Some("Can you summarize the following into bulleted points?\nInvoice 42\nTotal: 10")
        );
    }

    #[tokio::test]
    async fn test_too_large_retries_once_at_half_size() {
        let messenger = FakeMessenger::default();
        let ocr = FakeOcr::new(vec![Err(too_large()), Ok("text".to_string())]);
        let llm = FakeLlm::new("summary");
        let processor = ImageProcessor::new(&messenger, &ocr, &llm);

        let summary = processor
            .summarize(1, DynamicImage::new_rgb8(200, 101))
            .await
            .unwrap();

        assert_eq!(summary, "summary");
        assert_eq!(*ocr.seen_sizes.lock().unwrap(), vec![(200, 101), (100, 50)]);
    }

    #[tokio::test]
    async fn test_second_too_large_fails_permanently() {
        let messenger = FakeMessenger::default();
        let ocr = FakeOcr::new(vec![Err(too_large()), Err(too_large()), Ok("never".to_string())]);
        let llm = FakeLlm::new("summary");
        let processor = ImageProcessor::new(&messenger, &ocr, &llm);

        let err = processor
            .summarize(1, DynamicImage::new_rgb8(64, 64))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::Ocr(OcrError::ImageTooLarge(_))));
        assert_eq!(ocr.seen_sizes.lock().unwrap().len(), 2);
        assert!(llm.requests.lock().unwrap().is_empty());
        assert_eq!(messenger.texts(), vec![messages::WORKING.to_string()]);
    }

    #[tokio::test]
    async fn test_other_ocr_error_not_retried() {
        let messenger = FakeMessenger::default();
        let ocr = FakeOcr::new(vec![
            Err(OcrError::Failed("bad data".to_string())),
            Ok("never".to_string()),
        ]);
        let llm = FakeLlm::new("summary");
        let processor = ImageProcessor::new(&messenger, &ocr, &llm);

        let err = processor
            .summarize(1, DynamicImage::new_rgb8(64, 64))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "bad data");
        assert_eq!(ocr.seen_sizes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_long_text_chunked() {
        let text = "y".repeat(MAX_MESSAGE_CHARS * 2 + 10);
        let messenger = FakeMessenger::default();
        let ocr = FakeOcr::new(vec![Ok(text.clone())]);
        let llm = FakeLlm::new("summary");
        let processor = ImageProcessor::new(&messenger, &ocr, &llm);

        processor
            .summarize(1, DynamicImage::new_rgb8(8, 8))
            .await
            .unwrap();

        let sent = messenger.texts();
        // working + extracted header + chunks
        assert_eq!(sent.len(), 2 + text.len().div_ceil(MAX_MESSAGE_CHARS));
        assert_eq!(sent[2..].concat(), text);
        assert_eq!(llm.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_failure_is_other_error() {
        let messenger = FakeMessenger::default();
        let ocr = FakeOcr::new(vec![Ok("some text".to_string())]);
        let llm = FakeLlm::failing("Completion API error (429): rate limited");
        let processor = ImageProcessor::new(&messenger, &ocr, &llm);

        let err = processor
            .summarize(1, DynamicImage::new_rgb8(8, 8))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::Other(_)));
        assert_eq!(err.to_string(), "Completion API error (429): rate limited");
        assert_eq!(llm.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_text_is_no_text() {
        let messenger = FakeMessenger::default();
        let ocr = FakeOcr::new(vec![Ok(" \n\x0c".to_string())]);
        let llm = FakeLlm::new("summary");
        let processor = ImageProcessor::new(&messenger, &ocr, &llm);

        let err = processor
            .summarize(1, DynamicImage::new_rgb8(8, 8))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::NoText));
        assert!(llm.requests.lock().unwrap().is_empty());
    }
}
