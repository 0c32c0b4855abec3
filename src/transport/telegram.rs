//! Telegram Bot API transport
//!
//! Outbound calls go through one long-lived `reqwest::Client`; inbound updates
//! arrive on the webhook and are normalized in `update`.

pub mod update;

use super::{ChatTransport, InlineKeyboard, PhotoSource, TransportError};
use crate::state_machine::{ChatId, MessageId};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Telegram API client
pub struct TelegramTransport {
    client: Client,
    /// `{api}/bot{token}`
    method_base: String,
    /// `{api}/file/bot{token}`
    file_base: String,
}

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

impl TelegramTransport {
    pub fn new(api_url: &str, token: &str) -> Result<Self, TransportError> {
        let api_url = api_url.trim_end_matches('/');
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            method_base: format!("{api_url}/bot{token}"),
            file_base: format!("{api_url}/file/bot{token}"),
        })
    }

    fn classify_send_error(e: &reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Network(format!("Request failed: {e}"))
        }
    }

    async fn parse<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read response: {e}")))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                TransportError::Decode(format!("{method}: {e}"))
            } else {
                TransportError::Api {
                    status: status.as_u16(),
                    description: body.clone(),
                }
            }
        })?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                ok: true,
                result: None,
                ..
            } => Err(TransportError::Decode(format!("{method}: missing result"))),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(TransportError::Api {
                status: error_code.unwrap_or_else(|| status.as_u16()),
                description: description.unwrap_or_default(),
            }),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, TransportError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.method_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;
        Self::parse(method, response).await
    }

    async fn call_multipart<T: DeserializeOwned>(
        &self,
        method: &str,
        form: Form,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.method_base))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;
        Self::parse(method, response).await
    }

    async fn photo_part(photo: &PhotoSource) -> Result<Part, TransportError> {
        let (data, file_name) = photo.load().await?;
        Part::bytes(data)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|e| TransportError::Decode(format!("invalid mime type: {e}")))
    }

    fn with_keyboard(form: Form, keyboard: Option<&InlineKeyboard>) -> Result<Form, TransportError> {
        match keyboard {
            Some(keyboard) => {
                let markup = serde_json::to_string(keyboard)
                    .map_err(|e| TransportError::Decode(format!("keyboard: {e}")))?;
                Ok(form.text("reply_markup", markup))
            }
            None => Ok(form),
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(reply_to) = reply_to {
            body["reply_to_message_id"] = json!(reply_to);
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: PhotoSource,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageId, TransportError> {
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", Self::photo_part(&photo).await?);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        let form = Self::with_keyboard(form, keyboard)?;
        let sent: SentMessage = self.call_multipart("sendPhoto", form).await?;
        Ok(sent.message_id)
    }

    async fn edit_photo(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        photo: PhotoSource,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TransportError> {
        let media = json!({ "type": "photo", "media": "attach://photo" });
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("message_id", message_id.to_string())
            .text("media", media.to_string())
            .part("photo", Self::photo_part(&photo).await?);
        let form = Self::with_keyboard(form, keyboard)?;
        // Result is the edited message, or `true` for inline messages
        let _: Value = self.call_multipart("editMessageMedia", form).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "sendChatAction",
                json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        let info: FileInfo = self.call("getFile", json!({ "file_id": file_id })).await?;
        let file_path = info
            .file_path
            .ok_or_else(|| TransportError::Decode(format!("file {file_id} has no path")))?;

        let response = self
            .client
            .get(format!("{}/{file_path}", self.file_base))
            .send()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Api {
                status: status.as_u16(),
                description: format!("download of {file_id} failed"),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read file: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn set_webhook(&self, url: &str) -> Result<(), TransportError> {
        let _: bool = self.call("setWebhook", json!({ "url": url })).await?;
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<(), TransportError> {
        let _: bool = self.call("deleteWebhook", json!({})).await?;
        Ok(())
    }
}
