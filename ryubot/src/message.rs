//! Message types exchanged between the Telegram adapter and the dispatcher.

use serde::{Deserialize, Serialize};

/// Telegram chat identifier.
pub type ChatId = i64;

/// Chat type as reported by Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Get the chat type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }

    /// Group and supergroup chats are subject to mention gating.
    pub const fn is_group(&self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// The chat a message arrived in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: ChatId,
    pub kind: ChatKind,
    /// Group title
    #[serde(default)]
    pub title: Option<String>,
    /// Private chat partner's first name
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl ChatInfo {
    /// Human-readable chat name: group title for groups, otherwise first
    /// name, username, and finally the numeric id.
    pub fn display_name(&self) -> String {
        let non_empty =
            |s: &Option<String>| s.as_deref().filter(|v| !v.is_empty()).map(String::from);

        if self.kind.is_group() {
            if let Some(title) = non_empty(&self.title) {
                return title;
            }
        }

        non_empty(&self.first_name)
            .or_else(|| non_empty(&self.username))
            .or_else(|| non_empty(&self.title))
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// The user who sent a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Sender {
    /// Name used in log records: username, else full name, else id.
    pub fn handle(&self) -> String {
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return format!("@{username}");
        }

        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if full.is_empty() {
            self.id.to_string()
        } else {
            full
        }
    }
}

/// The bot's own account, resolved once via `getMe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

impl BotIdentity {
    /// The `@username` form used for mentions.
    pub fn mention(&self) -> String {
        format!("@{}", self.username)
    }
}

/// Unified inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Telegram message ID within the chat
    pub message_id: i64,
    pub chat: ChatInfo,
    #[serde(default)]
    pub from: Option<Sender>,
    /// Text body; `None` for stickers, photos and other non-text content
    #[serde(default)]
    pub text: Option<String>,
    /// Author of the message this one replies to, if any
    #[serde(default)]
    pub reply_to_user_id: Option<i64>,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID for following this message through the logs
    pub trace_id: String,
}

impl ChannelMessage {
    /// Get the text content if this is a text message.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat.id
    }

    /// Sender handle for logging; "unknown" for anonymous posts.
    pub fn sender_handle(&self) -> String {
        self.from
            .as_ref()
            .map_or_else(|| "unknown".to_string(), Sender::handle)
    }

    /// Whether this message replies to one of the given user's messages.
    pub fn is_reply_to(&self, user_id: i64) -> bool {
        self.reply_to_user_id == Some(user_id)
    }
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingContent {
    /// Plain text
    Text { text: String },
    /// Telegram legacy Markdown
    Markdown { text: String },
}

impl OutgoingContent {
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text } | Self::Markdown { text } => text,
        }
    }

    /// The same text without rich formatting.
    pub fn to_plain(&self) -> Self {
        Self::Text {
            text: self.text().to_string(),
        }
    }
}

/// A persistent reply keyboard shown under the input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
    pub resize: bool,
    pub one_time: bool,
}

impl ReplyKeyboard {
    /// One button per row.
    pub fn single_column<I, S>(buttons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: buttons.into_iter().map(|b| vec![b.into()]).collect(),
            resize: true,
            one_time: false,
        }
    }

    /// Bot API `ReplyKeyboardMarkup` representation.
    pub fn to_markup(&self) -> serde_json::Value {
        let keyboard: Vec<Vec<serde_json::Value>> = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|text| serde_json::json!({ "text": text }))
                    .collect()
            })
            .collect();

        serde_json::json!({
            "keyboard": keyboard,
            "resize_keyboard": self.resize,
            "one_time_keyboard": self.one_time,
        })
    }
}

/// Outgoing message to send to a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    pub content: OutgoingContent,
    #[serde(default)]
    pub keyboard: Option<ReplyKeyboard>,
}

impl OutgoingMessage {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            content: OutgoingContent::Text { text: text.into() },
            keyboard: None,
        }
    }

    pub fn markdown(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            content: OutgoingContent::Markdown { text: text.into() },
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: ReplyKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Chat status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

impl ChatAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Typing => "typing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(kind: ChatKind) -> ChatInfo {
        ChatInfo {
            id: 42,
            kind,
            title: None,
            first_name: None,
            username: None,
        }
    }

    #[test]
    fn test_display_name_prefers_group_title() {
        let mut c = chat(ChatKind::Supergroup);
        c.title = Some("Rust ID".into());
        c.first_name = Some("ignored".into());
        assert_eq!(c.display_name(), "Rust ID");
    }

    #[test]
    fn test_display_name_private_fallbacks() {
        let mut c = chat(ChatKind::Private);
        assert_eq!(c.display_name(), "42");

        c.username = Some("ryu".into());
        assert_eq!(c.display_name(), "ryu");

        c.first_name = Some("Ryu".into());
        assert_eq!(c.display_name(), "Ryu");
    }

    #[test]
    fn test_sender_handle() {
        let mut s = Sender {
            id: 7,
            username: None,
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
        };
        assert_eq!(s.handle(), "Ada Lovelace");

        s.username = Some("ada".into());
        assert_eq!(s.handle(), "@ada");

        s.username = None;
        s.first_name = None;
        s.last_name = None;
        assert_eq!(s.handle(), "7");
    }

    #[test]
    fn test_reply_keyboard_markup() {
        let kb = ReplyKeyboard::single_column(["/help", "/clear"]);
        let markup = kb.to_markup();
        assert_eq!(markup["keyboard"][0][0]["text"], "/help");
        assert_eq!(markup["keyboard"][1][0]["text"], "/clear");
        assert_eq!(markup["resize_keyboard"], true);
        assert_eq!(markup["one_time_keyboard"], false);
    }

    #[test]
    fn test_outgoing_to_plain() {
        let md = OutgoingContent::Markdown {
            text: "*bold*".into(),
        };
        assert_eq!(
            md.to_plain(),
            OutgoingContent::Text {
                text: "*bold*".into()
            }
        );
    }
}
