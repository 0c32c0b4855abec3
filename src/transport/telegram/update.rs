//! Inbound webhook updates and their normalization into bot events

use crate::runtime::Inbound;
use crate::state_machine::{CallbackAction, ChatId, Command, Event, MessageId, PhotoRef, UserId};
use serde::Deserialize;

/// Subset of the Bot API `Update` object the bot reacts to
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    /// Available sizes of a photo, smallest first
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: UserId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

impl Update {
    /// Convert to a bot event; `None` for updates the bot does not handle
    pub fn normalize(self) -> Option<Inbound> {
        if let Some(query) = self.callback_query {
            return Some(normalize_callback(query));
        }
        self.message.and_then(normalize_message)
    }
}

fn normalize_callback(query: CallbackQuery) -> Inbound {
    let (chat_id, message_id) = match &query.message {
        Some(message) => (message.chat.id, Some(message.message_id)),
        // Private chats share the user's id
        None => (query.from.id, None),
    };
    let action = CallbackAction::parse(query.data.as_deref().unwrap_or_default());
    Inbound::new(
        query.from.id,
        chat_id,
        Event::Callback {
            callback_id: query.id,
            message_id,
            action,
        },
    )
}

fn normalize_message(message: Message) -> Option<Inbound> {
    let user_id = message.from.as_ref()?.id;
    let chat_id = message.chat.id;
    let message_id = message.message_id;

    if let Some(name) = message.text.as_deref().and_then(command_name) {
        return Some(Inbound::new(
            user_id,
            chat_id,
            Event::Command {
                command: Command::parse(name),
                message_id,
            },
        ));
    }

    let photo = message
        .photo
        .as_deref()
        .and_then(largest_photo)
        .map(|size| PhotoRef {
            file_id: size.file_id.clone(),
        });
    Some(Inbound::new(
        user_id,
        chat_id,
        Event::Message { message_id, photo },
    ))
}

/// `/painting@NeuralPainterBot extra` -> `painting`
fn command_name(text: &str) -> Option<&str> {
    let word = text.split_whitespace().next()?.strip_prefix('/')?;
    let name = word.split('@').next().unwrap_or(word);
    (!name.is_empty()).then_some(name)
}

fn largest_photo(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes
        .iter()
        .enumerate()
        // Later entries win ties; the API lists sizes in ascending order
        .max_by_key(|(idx, p)| (u64::from(p.width) * u64::from(p.height), *idx))
        .map(|(_, p)| p)
}
