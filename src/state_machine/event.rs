//! Events that drive a user's session

use super::MessageId;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    Command {
        command: Command,
        message_id: MessageId,
    },
    Callback {
        callback_id: String,
        /// Message carrying the pressed keyboard, if still accessible
        message_id: Option<MessageId>,
        action: CallbackAction,
    },
    /// Any non-command message; `photo` is set when it carries an image
    Message {
        message_id: MessageId,
        photo: Option<PhotoRef>,
    },

    // Runtime events
    JobFinished {
        job_id: String,
        outcome: JobOutcome,
    },
    /// Session store or content file operation failed for this user
    StorageFailed { message: String },
}

impl Event {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Command { .. } => "command",
            Event::Callback { .. } => "callback",
            Event::Message { photo: Some(_), .. } => "photo",
            Event::Message { photo: None, .. } => "message",
            Event::JobFinished { .. } => "job_finished",
            Event::StorageFailed { .. } => "storage_failed",
        }
    }
}

/// Recognized bot commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    About,
    Reset,
    Stylization,
    Painting,
    /// Anything else starting with `/`
    Other(String),
}

impl Command {
    /// Parse a command name without the leading slash or `@botname` suffix
    pub fn parse(name: &str) -> Self {
        match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "about" => Command::About,
            "reset" => Command::Reset,
            "stylization" => Command::Stylization,
            "painting" => Command::Painting,
            other => Command::Other(other.to_string()),
        }
    }
}

/// Inline keyboard actions from the style menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Show the named style
    Navigate(String),
    /// The page-counter button; acknowledged, nothing else
    Ignore,
    Accept,
    Unknown(String),
}

pub const NAVIGATE_PREFIX: &str = "style:";
pub const IGNORE_PAYLOAD: &str = "ignore_style";
pub const ACCEPT_PAYLOAD: &str = "accept_style";

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        match data {
            IGNORE_PAYLOAD => CallbackAction::Ignore,
            ACCEPT_PAYLOAD => CallbackAction::Accept,
            _ => match data.strip_prefix(NAVIGATE_PREFIX) {
                Some(name) if !name.is_empty() => CallbackAction::Navigate(name.to_string()),
                _ => CallbackAction::Unknown(data.to_string()),
            },
        }
    }

    pub fn navigate_payload(style: &str) -> String {
        format!("{NAVIGATE_PREFIX}{style}")
    }
}

/// Reference to an uploaded photo on the chat service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub file_id: String,
}

/// Result reported by the job runner
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Rendered { jpeg: Vec<u8>, elapsed_secs: f64 },
    Failed { error: String },
}
