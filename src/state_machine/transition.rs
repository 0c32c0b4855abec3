//! Pure state transition function
//!
//! Given a session, its context and an event, decide the next session and the
//! effects the runtime must carry out. No I/O happens here.

use super::{
    BotState, CallbackAction, Command, Effect, Event, Flow, JobOutcome, MessageId, PhotoRef,
    Session, SessionContext,
};
use crate::catalog::DEFAULT_STYLE;
use crate::jobs::JobRequest;
use thiserror::Error;

pub const HELP_TEXT: &str = "/help — View the list of available options ❓\n\
/reset — Reset, if you've uploaded the wrong images 🔄\n\
/stylization — Select a style to transfer onto your image 🌈\n\
/painting — Upload your image to turn it into a painting 🎨\n\
/about — Check out the source code, if you're curious 🤓\n";
pub const ABOUT_TEXT: &str =
    "Author: @tensorush 👨‍💻\nGitHub: https://github.com/geotrush/Neural-Painter-Bot";
pub const RESET_TEXT: &str = "Changed your mind? Alright, let's start over 🙄";
pub const UNRECOGNIZED_TEXT: &str = "Sorry, I don't get what you're saying 🤨";
pub const STYLIZATION_CHOSEN_TEXT: &str = "You've chosen stylization 🌈";
pub const PAINTING_CHOSEN_TEXT: &str = "You've chosen painting 🎨";
pub const STYLE_ACCEPTED_TEXT: &str = "Splendid! 🎇";
pub const STYLIZATION_UPLOAD_PROMPT: &str = "2️⃣ Upload a content image...";
pub const PAINTING_UPLOAD_PROMPT: &str = "1️⃣ Upload a content image...";
pub const RETRY_PROMPT: &str = "Please try again - just send a compressed JPEG or PNG 🖼";
pub const UPLOAD_RECEIVED_TEXT: &str = "Brilliant! 💎\n";
pub const STYLIZATION_PROCESSING_TEXT: &str =
    "3️⃣ Be patient — it'll take half a minute at most ⏳";
pub const PAINTING_PROCESSING_TEXT: &str = "2️⃣ Be patient — it'll take half a minute at most ⏳";
pub const JOB_FAILED_TEXT: &str = "Sorry, something went wrong while processing your image 😔 \
Try again with /stylization or /painting";
pub const STORAGE_FAILED_TEXT: &str =
    "Sorry, I couldn't keep hold of your image 😔 Let's start over";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_session: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            new_session: session,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A job is already running for this user")]
    JobInFlight,
    #[error("Discarding result of superseded job {0}")]
    StaleJob(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
#[allow(clippy::too_many_lines)] // One arm per (state, event) pair reads best flat
pub fn transition(
    session: &Session,
    ctx: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (&session.state, event) {
        // ============================================================
        // Global commands, valid from any state
        // ============================================================
        (
            _,
            Event::Command {
                command: Command::Start | Command::Help,
                ..
            },
        ) => Ok(TransitionResult::new(session.clone()).with_effect(Effect::send_text(HELP_TEXT))),

        (
            _,
            Event::Command {
                command: Command::About,
                ..
            },
        ) => Ok(TransitionResult::new(session.clone()).with_effect(Effect::send_text(ABOUT_TEXT))),

        (
            _,
            Event::Command {
                command: Command::Reset,
                ..
            },
        ) => Ok(reset_to_idle(session, [Effect::send_text(RESET_TEXT)])),

        // Failed storage always abandons the flow
        (_, Event::StorageFailed { .. }) => {
            Ok(reset_to_idle(session, [Effect::send_text(STORAGE_FAILED_TEXT)]))
        }

        // ============================================================
        // Idle
        // ============================================================
        (
            BotState::Idle,
            Event::Command {
                command: Command::Stylization,
                ..
            },
        ) => {
            let style_path = ctx.catalog.path_of(DEFAULT_STYLE);
            let menu = ctx.catalog.menu(DEFAULT_STYLE).ok_or_else(|| {
                TransitionError::InvalidTransition(format!(
                    "default style {DEFAULT_STYLE} missing from catalog"
                ))
            })?;
            Ok(TransitionResult::new(
                session
                    .with_state(BotState::SelectingStyle)
                    .with_style(style_path),
            )
            .with_effect(Effect::PersistSession)
            .with_effect(Effect::send_text(STYLIZATION_CHOSEN_TEXT))
            .with_effect(Effect::SendMenu { menu }))
        }

        (
            BotState::Idle,
            Event::Command {
                command: Command::Painting,
                ..
            },
        ) => Ok(
            TransitionResult::new(session.with_state(BotState::AwaitingContentImageGnst))
                .with_effect(Effect::PersistSession)
                .with_effect(Effect::send_text(PAINTING_CHOSEN_TEXT))
                .with_effect(Effect::send_text(PAINTING_UPLOAD_PROMPT)),
        ),

        (BotState::Idle, Event::Command { .. } | Event::Message { .. }) => Ok(
            TransitionResult::new(session.clone()).with_effect(Effect::send_text(UNRECOGNIZED_TEXT)),
        ),

        // ============================================================
        // Style selection
        // ============================================================
        (
            BotState::SelectingStyle,
            Event::Callback {
                callback_id,
                message_id,
                action: CallbackAction::Navigate(name),
            },
        ) => {
            let Some(menu) = ctx.catalog.menu(&name) else {
                return Ok(TransitionResult::new(session.clone())
                    .with_effect(Effect::answer_callback(callback_id)));
            };
            let menu_effect = match message_id {
                Some(message_id) => Effect::EditMenu { message_id, menu },
                None => Effect::SendMenu { menu },
            };
            Ok(
                TransitionResult::new(session.clone().with_style(ctx.catalog.path_of(&name)))
                    .with_effect(Effect::answer_callback(callback_id))
                    .with_effect(Effect::PersistSession)
                    .with_effect(menu_effect),
            )
        }

        (
            BotState::SelectingStyle,
            Event::Callback {
                callback_id,
                action: CallbackAction::Accept,
                ..
            },
        ) => Ok(
            TransitionResult::new(session.with_state(BotState::AwaitingContentImage))
                .with_effect(Effect::answer_callback(callback_id))
                .with_effect(Effect::PersistSession)
                .with_effect(Effect::send_text(STYLE_ACCEPTED_TEXT))
                .with_effect(Effect::send_text(STYLIZATION_UPLOAD_PROMPT)),
        ),

        // Ignore button, stray buttons and buttons outside the menu: acknowledge only
        (_, Event::Callback { callback_id, .. }) => Ok(
            TransitionResult::new(session.clone())
                .with_effect(Effect::answer_callback(callback_id)),
        ),

        // ============================================================
        // Content upload
        // ============================================================
        (
            BotState::AwaitingContentImage,
            Event::Message {
                message_id,
                photo: Some(photo),
            },
        ) => Ok(start_job(session, ctx, Flow::Stylization, message_id, photo)),

        (
            BotState::AwaitingContentImageGnst,
            Event::Message {
                message_id,
                photo: Some(photo),
            },
        ) => Ok(start_job(session, ctx, Flow::Painting, message_id, photo)),

        (
            BotState::AwaitingContentImage | BotState::AwaitingContentImageGnst,
            Event::Message { message_id, .. } | Event::Command { message_id, .. },
        ) => Ok(
            TransitionResult::new(session.clone())
                .with_effect(Effect::reply_text(message_id, RETRY_PROMPT)),
        ),

        // ============================================================
        // Job completion
        // ============================================================
        (
            BotState::RunningStyleJob { job_id: running } | BotState::RunningPaintJob { job_id: running },
            Event::JobFinished { job_id, outcome },
        ) if *running == job_id => {
            let flow = session.state.flow().unwrap_or(Flow::Painting);
            let report = match outcome {
                JobOutcome::Rendered { jpeg, elapsed_secs } => Effect::DeliverResult {
                    jpeg,
                    caption: result_caption(flow, elapsed_secs),
                },
                JobOutcome::Failed { .. } => Effect::send_text(JOB_FAILED_TEXT),
            };
            Ok(reset_to_idle(session, [report]))
        }

        (_, Event::JobFinished { job_id, .. }) => Err(TransitionError::StaleJob(job_id)),

        // ============================================================
        // Invalid transitions
        // ============================================================
        (BotState::RunningStyleJob { .. } | BotState::RunningPaintJob { .. }, _) => {
            Err(TransitionError::JobInFlight)
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {event:?}",
            state.name()
        ))),
    }
}

/// Clear the session and purge its files, followed by `report` effects
fn reset_to_idle(
    session: &Session,
    report: impl IntoIterator<Item = Effect>,
) -> TransitionResult {
    TransitionResult::new(Session::idle(session.user_id))
        .with_effects(report)
        .with_effect(Effect::PurgeUserFiles)
        .with_effect(Effect::ClearSession)
}

fn start_job(
    session: &Session,
    ctx: &SessionContext,
    flow: Flow,
    message_id: MessageId,
    photo: PhotoRef,
) -> TransitionResult {
    // Message ids are unique per chat, so this never repeats for a user
    let job_id = format!("{}-{}-{message_id}", ctx.user_id, ctx.chat_id);
    let (next, processing_text, style_path) = match flow {
        Flow::Stylization => (
            BotState::RunningStyleJob {
                job_id: job_id.clone(),
            },
            STYLIZATION_PROCESSING_TEXT,
            session.scratch.style_path.clone(),
        ),
        Flow::Painting => (
            BotState::RunningPaintJob {
                job_id: job_id.clone(),
            },
            PAINTING_PROCESSING_TEXT,
            None,
        ),
    };
    let job = JobRequest {
        job_id,
        flow,
        user_id: ctx.user_id,
        chat_id: ctx.chat_id,
        content_path: ctx.content_path.clone(),
        style_path,
    };

    TransitionResult::new(session.with_state(next))
        .with_effect(Effect::StoreContent {
            file_id: photo.file_id,
        })
        .with_effect(Effect::PersistSession)
        .with_effect(Effect::send_text(UPLOAD_RECEIVED_TEXT))
        .with_effect(Effect::send_text(processing_text))
        .with_effect(Effect::SendTyping)
        .with_effect(Effect::SubmitJob { job })
}

pub fn result_caption(flow: Flow, elapsed_secs: f64) -> String {
    let verb = match flow {
        Flow::Stylization => "Stylization",
        Flow::Painting => "Painting",
    };
    format!("{verb} took only {elapsed_secs:.2} seconds ⏰")
}
