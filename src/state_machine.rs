//! Conversation state machine
//!
//! Pure transitions from (session, event) to (session, effects). All I/O lives
//! in the runtime, which interprets the returned effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{CallbackAction, Command, Event, JobOutcome, PhotoRef};
pub use state::{BotState, Flow, Scratch, Session, SessionContext};
pub use transition::{transition, TransitionError, TransitionResult};

/// Chat-side user identifier
pub type UserId = i64;

/// Chat identifier (where replies go)
pub type ChatId = i64;

/// Message identifier within a chat
pub type MessageId = i64;
