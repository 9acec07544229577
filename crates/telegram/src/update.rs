use serde::Deserialize;

/// Raw webhook payload as delivered by the chat platform. Only the fields
/// the core consumes are modeled; everything else is ignored on parse.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<User>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub from: Option<User>,
}

/// What the user actually sent: typed text or an inline-button payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundText {
    Text(String),
    Callback(String),
}

/// The normalized inbound unit the orchestrator works with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub text: InboundText,
}

impl InboundUpdate {
    /// Extracts `(update_id, chat_id, text)` from a raw update. Updates
    /// without usable content (joins, stickers, edits) are dropped.
    pub fn from_raw(update: Update) -> Option<Self> {
        if let Some(callback) = update.callback_query {
            let chat_id = callback.message.as_ref().map(|message| message.chat.id)?;
            let data = callback.data.filter(|data| !data.trim().is_empty())?;
            return Some(Self {
                update_id: update.update_id,
                chat_id,
                username: callback.from.and_then(|user| user.username),
                text: InboundText::Callback(data),
            });
        }

        let message = update.message?;
        let text = message.text.filter(|text| !text.trim().is_empty())?;
        Some(Self {
            update_id: update.update_id,
            chat_id: message.chat.id,
            username: message.from.and_then(|user| user.username),
            text: InboundText::Text(text),
        })
    }
}
