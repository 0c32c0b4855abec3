//! Session and state types

use super::{ChatId, UserId};
use crate::catalog::StyleCatalog;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// One of the two independent conversation paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Fast style transfer onto a content image, using a catalog style
    Stylization,
    /// Generative painting of a content image
    Painting,
}

impl Flow {
    pub fn as_str(self) -> &'static str {
        match self {
            Flow::Stylization => "stylization",
            Flow::Painting => "painting",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a user in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotState {
    /// No flow in progress
    #[default]
    Idle,

    /// Stylization: browsing the style menu
    SelectingStyle,

    /// Stylization: style accepted, waiting for the content photo
    AwaitingContentImage,

    /// Stylization: job in flight
    RunningStyleJob { job_id: String },

    /// Painting: waiting for the content photo
    AwaitingContentImageGnst,

    /// Painting: job in flight
    RunningPaintJob { job_id: String },
}

impl BotState {
    /// Flow this state belongs to, `None` for idle
    pub fn flow(&self) -> Option<Flow> {
        match self {
            BotState::Idle => None,
            BotState::SelectingStyle
            | BotState::AwaitingContentImage
            | BotState::RunningStyleJob { .. } => Some(Flow::Stylization),
            BotState::AwaitingContentImageGnst | BotState::RunningPaintJob { .. } => {
                Some(Flow::Painting)
            }
        }
    }

    /// Id of the job in flight, if this is a job-bearing state
    pub fn running_job(&self) -> Option<&str> {
        match self {
            BotState::RunningStyleJob { job_id } | BotState::RunningPaintJob { job_id } => {
                Some(job_id)
            }
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_job().is_some()
    }

    pub fn is_awaiting_content(&self) -> bool {
        matches!(
            self,
            BotState::AwaitingContentImage | BotState::AwaitingContentImageGnst
        )
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            BotState::Idle => "idle",
            BotState::SelectingStyle => "selecting_style",
            BotState::AwaitingContentImage => "awaiting_content_image",
            BotState::RunningStyleJob { .. } => "running_style_job",
            BotState::AwaitingContentImageGnst => "awaiting_content_image_gnst",
            BotState::RunningPaintJob { .. } => "running_paint_job",
        }
    }
}

/// Per-flow scratch data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Scratch {
    /// Currently selected style image (stylization only)
    #[serde(default)]
    pub style_path: Option<PathBuf>,
}

/// Per-user record of conversation progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub state: BotState,
    #[serde(default)]
    pub scratch: Scratch,
}

impl Session {
    /// A fresh idle session, used when the store holds nothing for the user
    pub fn idle(user_id: UserId) -> Self {
        Self {
            user_id,
            state: BotState::Idle,
            scratch: Scratch::default(),
        }
    }

    pub fn with_state(&self, state: BotState) -> Self {
        Self {
            user_id: self.user_id,
            state,
            scratch: self.scratch.clone(),
        }
    }

    pub fn with_style(mut self, style_path: PathBuf) -> Self {
        self.scratch.style_path = Some(style_path);
        self
    }

    pub fn is_idle(&self) -> bool {
        self.state == BotState::Idle
    }
}

/// Immutable inputs a transition may consult
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: UserId,
    /// Chat the current event came from
    pub chat_id: ChatId,
    /// Where this user's uploaded content image is stored
    pub content_path: PathBuf,
    pub catalog: Arc<StyleCatalog>,
}

impl SessionContext {
    pub fn new(
        user_id: UserId,
        chat_id: ChatId,
        content_path: PathBuf,
        catalog: Arc<StyleCatalog>,
    ) -> Self {
        Self {
            user_id,
            chat_id,
            content_path,
            catalog,
        }
    }
}
