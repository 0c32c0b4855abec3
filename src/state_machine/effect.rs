//! Effects produced by state transitions

use super::MessageId;
use crate::catalog::StyleMenu;
use crate::jobs::JobRequest;

/// Effects to be executed after state transition, in order
#[derive(Debug, Clone)]
pub enum Effect {
    /// Write the new session to the store
    PersistSession,

    /// Remove the user's session from the store
    ClearSession,

    /// Send a text message, optionally quoting the user's message
    SendText {
        text: String,
        reply_to: Option<MessageId>,
    },

    /// Send the style menu as a new photo message
    SendMenu { menu: StyleMenu },

    /// Replace the photo and keyboard of an existing menu message
    EditMenu {
        message_id: MessageId,
        menu: StyleMenu,
    },

    /// Dismiss the pending spinner on a pressed button
    AnswerCallback { callback_id: String },

    /// Show the "typing" chat action
    SendTyping,

    /// Download an uploaded photo into the user's content file
    StoreContent { file_id: String },

    /// Hand a job to the runner (spawns off the event loop)
    SubmitJob { job: JobRequest },

    /// Send a rendered result image
    DeliverResult { jpeg: Vec<u8>, caption: String },

    /// Delete every temp file belonging to this user
    PurgeUserFiles,
}

impl Effect {
    pub fn send_text(text: impl Into<String>) -> Self {
        Effect::SendText {
            text: text.into(),
            reply_to: None,
        }
    }

    pub fn reply_text(reply_to: MessageId, text: impl Into<String>) -> Self {
        Effect::SendText {
            text: text.into(),
            reply_to: Some(reply_to),
        }
    }

    pub fn answer_callback(callback_id: impl Into<String>) -> Self {
        Effect::AnswerCallback {
            callback_id: callback_id.into(),
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::PersistSession => "persist_session",
            Effect::ClearSession => "clear_session",
            Effect::SendText { .. } => "send_text",
            Effect::SendMenu { .. } => "send_menu",
            Effect::EditMenu { .. } => "edit_menu",
            Effect::AnswerCallback { .. } => "answer_callback",
            Effect::SendTyping => "send_typing",
            Effect::StoreContent { .. } => "store_content",
            Effect::SubmitJob { .. } => "submit_job",
            Effect::DeliverResult { .. } => "deliver_result",
            Effect::PurgeUserFiles => "purge_user_files",
        }
    }

    /// Whether this effect touches the session store
    pub fn is_session_write(&self) -> bool {
        matches!(self, Effect::PersistSession | Effect::ClearSession)
    }
}
