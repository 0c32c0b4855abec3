//! Chat transport boundary
//!
//! The state machine only needs a handful of outbound operations; this module
//! names them and wraps any implementation with bounded retries.

pub mod telegram;

use crate::state_machine::{ChatId, MessageId};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const MAX_SEND_ATTEMPTS: u32 = 3;

/// Transport error with classification for retry logic
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never reached the chat service
    #[error("Connection failed: {0}")]
    Connect(String),
    /// Timeouts and dropped bodies; the request may have been applied
    #[error("Network error: {0}")]
    Network(String),
    /// The chat service rejected the call
    #[error("API error {status}: {description}")]
    Api { status: u16, description: String },
    /// Unexpected response shape
    #[error("Failed to decode response: {0}")]
    Decode(String),
    /// A local file to upload could not be read
    #[error("Cannot read {path}: {message}")]
    LocalFile { path: String, message: String },
}

impl TransportError {
    /// Worth retrying an idempotent call
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect(_) | TransportError::Network(_) => true,
            TransportError::Api { status, .. } => *status == 429 || *status >= 500,
            TransportError::Decode(_) | TransportError::LocalFile { .. } => false,
        }
    }

    /// The call was refused or never sent, so resending cannot duplicate a message
    pub fn is_unsent(&self) -> bool {
        match self {
            TransportError::Connect(_) => true,
            TransportError::Api { status, .. } => *status == 429 || *status >= 500,
            TransportError::Network(_)
            | TransportError::Decode(_)
            | TransportError::LocalFile { .. } => false,
        }
    }
}

/// One button of an inline keyboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Keyboard attached under a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    #[serde(rename = "inline_keyboard")]
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }
}

/// Photo payload for outbound messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    /// Read from local disk at send time
    Path(PathBuf),
    /// Already in memory
    Bytes { data: Vec<u8>, file_name: String },
}

impl PhotoSource {
    pub fn jpeg(data: Vec<u8>, file_name: impl Into<String>) -> Self {
        PhotoSource::Bytes {
            data,
            file_name: file_name.into(),
        }
    }

    /// Load the bytes and a file name for upload
    pub async fn load(&self) -> Result<(Vec<u8>, String), TransportError> {
        match self {
            PhotoSource::Path(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| TransportError::LocalFile {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?;
                Ok((data, file_name_of(path)))
            }
            PhotoSource::Bytes { data, file_name } => Ok((data.clone(), file_name.clone())),
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "photo.jpg".to_string(), |n| n.to_string_lossy().into_owned())
}

/// Outbound operations the bot needs from the chat service
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message, optionally as a reply
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError>;

    /// Send a photo with optional caption and keyboard
    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: PhotoSource,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, TransportError>;

    /// Replace the photo (and keyboard) of an existing message in place
    async fn edit_photo(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        photo: PhotoSource,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TransportError>;

    /// Acknowledge a button press
    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError>;

    /// Show the typing indicator
    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError>;

    /// Fetch an uploaded file's bytes
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError>;

    /// Point inbound delivery at `url`
    async fn set_webhook(&self, url: &str) -> Result<(), TransportError>;

    /// Stop inbound delivery
    async fn delete_webhook(&self) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError> {
        (**self).send_text(chat_id, text, reply_to).await
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: PhotoSource,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, TransportError> {
        (**self).send_photo(chat_id, photo, caption, keyboard).await
    }

    async fn edit_photo(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        photo: PhotoSource,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TransportError> {
        (**self).edit_photo(chat_id, message_id, photo, keyboard).await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        (**self).answer_callback(callback_id).await
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError> {
        (**self).send_typing(chat_id).await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        (**self).download_file(file_id).await
    }

    async fn set_webhook(&self, url: &str) -> Result<(), TransportError> {
        (**self).set_webhook(url).await
    }

    async fn delete_webhook(&self) -> Result<(), TransportError> {
        (**self).delete_webhook().await
    }
}

// ============================================================================
// Retrying wrapper
// ============================================================================

/// Retries failed calls with exponential backoff. Sends are only retried when
/// the failure proves nothing was delivered; other calls are idempotent.
pub struct RetryingTransport<T> {
    inner: T,
    max_attempts: u32,
    base_delay: Duration,
}

impl<T: ChatTransport> RetryingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_attempts: MAX_SEND_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        // 1x, 2x, 4x ...
        self.base_delay * (1 << (attempt - 1))
    }

    async fn retry<R, F, Fut>(
        &self,
        op: &'static str,
        should_retry: fn(&TransportError) -> bool,
        mut call: F,
    ) -> Result<R, TransportError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<R, TransportError>> + Send,
        R: Send,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if should_retry(&e) && attempt < self.max_attempts => {
                    let delay = self.retry_delay(attempt);
                    tracing::warn!(
                        op,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Transport call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<T: ChatTransport> ChatTransport for RetryingTransport<T> {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError> {
        self.retry("send_text", TransportError::is_unsent, || {
            self.inner.send_text(chat_id, text, reply_to)
        })
        .await
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: PhotoSource,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, TransportError> {
        self.retry("send_photo", TransportError::is_unsent, || {
            self.inner
                .send_photo(chat_id, photo.clone(), caption, keyboard)
        })
        .await
    }

    async fn edit_photo(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        photo: PhotoSource,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TransportError> {
        self.retry("edit_photo", TransportError::is_retryable, || {
            self.inner
                .edit_photo(chat_id, message_id, photo.clone(), keyboard)
        })
        .await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.retry("answer_callback", TransportError::is_retryable, || {
            self.inner.answer_callback(callback_id)
        })
        .await
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.retry("send_typing", TransportError::is_retryable, || {
            self.inner.send_typing(chat_id)
        })
        .await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        self.retry("download_file", TransportError::is_retryable, || {
            self.inner.download_file(file_id)
        })
        .await
    }

    async fn set_webhook(&self, url: &str) -> Result<(), TransportError> {
        self.retry("set_webhook", TransportError::is_retryable, || {
            self.inner.set_webhook(url)
        })
        .await
    }

    async fn delete_webhook(&self) -> Result<(), TransportError> {
        self.retry("delete_webhook", TransportError::is_retryable, || {
            self.inner.delete_webhook()
        })
        .await
    }
}
