//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving and sending messages
//! through the Telegram Bot API.

use crate::message::{
    BotIdentity, ChannelMessage, ChatAction, ChatId, ChatInfo, ChatKind, OutgoingContent,
    OutgoingMessage, Sender,
};
use crate::traits::{Channel, ChannelError, ChannelResult, Messenger};
use async_trait::async_trait;
use ryubot_common::config::TelegramConfig;
use ryubot_common::logging::generate_trace_id;
use ryubot_common::util::{sanitize_for_log, truncate_with_ellipsis};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Maximum characters in one Telegram text message.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Timeout for every call except long polling.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// Bot API types
// ============================================================================

/// Envelope around every Bot API reply.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> ChannelResult<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ChannelError::InvalidResponse(format!(
                "{method}: {}",
                self.description.as_deref().unwrap_or("no result")
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    #[serde(default)]
    date: i64,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: ChatId,
    #[serde(rename = "type")]
    kind: ChatKind,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl Chat {
    fn into_chat_info(self) -> ChatInfo {
        ChatInfo {
            id: self.id,
            kind: self.kind,
            title: self.title,
            first_name: self.first_name,
            username: self.username,
        }
    }
}

impl User {
    fn into_sender(self) -> Sender {
        Sender {
            id: self.id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}

impl Message {
    fn into_channel_message(self) -> ChannelMessage {
        ChannelMessage {
            message_id: self.message_id,
            chat: self.chat.into_chat_info(),
            from: self.from.map(User::into_sender),
            text: self.text,
            reply_to_user_id: self
                .reply_to_message
                .and_then(|reply| reply.from)
                .map(|user| user.id),
            timestamp: self.date * 1000,
            trace_id: generate_trace_id(),
        }
    }
}

// ============================================================================
// Telegram Channel
// ============================================================================

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    poll_timeout: Duration,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            poll_timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &TelegramConfig) -> Self {
        Self::new(
            config.bot_token.clone(),
            config.api_base.clone(),
            Duration::from_secs(config.poll_timeout_secs),
        )
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// POST a Bot API method and decode its `result`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> ChannelResult<T> {
        let resp = self
            .client
            .post(self.api_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(sanitize_for_log(&e.to_string())))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ChannelError::Connection(sanitize_for_log(&e.to_string())))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| {
            ChannelError::InvalidResponse(format!(
                "{method} returned HTTP {status}: {e}: {}",
                truncate_with_ellipsis(&text, 200)
            ))
        })?;
        parsed.into_result(method)
    }

    /// Fetch the next batch of updates starting at `offset`.
    ///
    /// Updates are returned raw so that one malformed entry cannot stall the
    /// offset for the whole batch.
    async fn get_updates(&self, offset: i64) -> ChannelResult<Vec<serde_json::Value>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message"]
        });
        self.call("getUpdates", &body, self.poll_timeout + REQUEST_TIMEOUT)
            .await
    }

    /// Turn a raw update into a channel message, if it carries one.
    fn parse_update(raw: serde_json::Value) -> Option<ChannelMessage> {
        let update: Update = match serde_json::from_value(raw) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!("Telegram: skipping undecodable update: {e}");
                return None;
            }
        };
        if update.message.is_none() {
            tracing::debug!(update_id = update.update_id, "Telegram: update carries no message");
        }
        update.message.map(Message::into_channel_message)
    }
}

/// Split text into consecutive chunks of at most `max_chars` characters.
///
/// Chunks are cut by position only, so concatenating them yields the input.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[async_trait]
impl Messenger for TelegramChannel {
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<i64> {
        let mut body = serde_json::json!({
            "chat_id": message.chat_id,
            "text": message.content.text(),
        });
        if matches!(message.content, OutgoingContent::Markdown { .. }) {
            body["parse_mode"] = serde_json::Value::from("Markdown");
        }
        if let Some(keyboard) = &message.keyboard {
            body["reply_markup"] = keyboard.to_markup();
        }

        let sent: SentMessage = self
            .call("sendMessage", &body, REQUEST_TIMEOUT)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        tracing::debug!(
            chat_id = message.chat_id,
            message_id = sent.message_id,
            chars = message.content.text().chars().count(),
            "Telegram message sent"
        );
        Ok(sent.message_id)
    }

    async fn send_action(&self, chat_id: ChatId, action: ChatAction) -> ChannelResult<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": action.as_str(),
        });
        let _: bool = self
            .call("sendChatAction", &body, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&mut self) -> ChannelResult<BotIdentity> {
        // Verify bot token by calling getMe
        let me: User = self
            .call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT)
            .await
            .map_err(|e| match e {
                ChannelError::InvalidResponse(msg) => {
                    ChannelError::Auth(format!("Invalid bot token: {msg}"))
                }
                other => other,
            })?;

        let username = me
            .username
            .ok_or_else(|| ChannelError::InvalidResponse("getMe: bot has no username".into()))?;

        tracing::info!(bot_id = me.id, username = %username, "Telegram channel initialized");
        Ok(BotIdentity { id: me.id, username })
    }

    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for raw in updates {
                if let Some(uid) = raw.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = offset.max(uid + 1);
                }

                let Some(msg) = Self::parse_update(raw) else {
                    continue;
                };

                tracing::info!(
                    channel = "telegram",
                    trace_id = %msg.trace_id,
                    user = %msg.sender_handle(),
                    chat_id = msg.chat_id(),
                    chat_type = msg.chat.kind.as_str(),
                    text = %truncate_with_ellipsis(msg.text().unwrap_or(""), 100),
                    "IM message received"
                );

                callback(msg);
            }
        }
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ReplyKeyboard;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new("123:ABC", server.uri(), Duration::from_secs(1))
    }

    #[test]
    fn telegram_channel_name() {
        let ch =
            TelegramChannel::new("fake-token", "https://api.telegram.org", Duration::from_secs(60));
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch =
            TelegramChannel::new("123:ABC", "https://api.telegram.org/", Duration::from_secs(60));
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn split_message_short() {
        let result = split_message("Hello, World!", MAX_MESSAGE_LEN);
        assert_eq!(result, vec!["Hello, World!".to_string()]);
    }

    #[test]
    fn split_message_empty() {
        assert_eq!(split_message("", MAX_MESSAGE_LEN), vec![String::new()]);
    }

    #[test]
    fn split_message_long() {
        let msg = "x".repeat(5000);
        let result = split_message(&msg, MAX_MESSAGE_LEN);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].chars().count(), 4096);
        assert_eq!(result[1].chars().count(), 904);
        assert_eq!(result.concat(), msg);
    }

    #[test]
    fn split_message_counts_characters_not_bytes() {
        let msg = "é".repeat(4097);
        let result = split_message(&msg, MAX_MESSAGE_LEN);
        assert_eq!(result.len(), 2);
        assert_eq!(result[1], "é");
    }

    #[test]
    fn parse_update_group_reply() {
        let raw = serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1_700_000_000,
                "chat": {"id": -100, "type": "supergroup", "title": "Rust ID"},
                "from": {"id": 7, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "text": "why?",
                "reply_to_message": {
                    "message_id": 4,
                    "date": 1_699_999_990,
                    "chat": {"id": -100, "type": "supergroup", "title": "Rust ID"},
                    "from": {
                        "id": 99, "is_bot": true, "first_name": "RyuBot", "username": "ryu_bot"
                    },
                    "text": "answer"
                }
            }
        });

        let msg = TelegramChannel::parse_update(raw).unwrap();
        assert_eq!(msg.chat_id(), -100);
        assert_eq!(msg.chat.kind, ChatKind::Supergroup);
        assert_eq!(msg.text(), Some("why?"));
        assert!(msg.is_reply_to(99));
        assert_eq!(msg.sender_handle(), "@ada");
        assert_eq!(msg.timestamp, 1_700_000_000_000);
        assert!(!msg.trace_id.is_empty());
    }

    #[test]
    fn parse_update_without_text() {
        let raw = serde_json::json!({
            "update_id": 11,
            "message": {
                "message_id": 6,
                "date": 0,
                "chat": {"id": 1, "type": "private", "first_name": "Ada"},
                "sticker": {"file_id": "x"}
            }
        });
        let msg = TelegramChannel::parse_update(raw).unwrap();
        assert!(msg.text().is_none());
    }

    #[test]
    fn parse_update_ignores_non_message_updates() {
        let raw = serde_json::json!({"update_id": 12, "edited_message": {}});
        assert!(TelegramChannel::parse_update(raw).is_none());
        assert!(TelegramChannel::parse_update(serde_json::json!({"bogus": true})).is_none());
    }

    #[tokio::test]
    async fn init_resolves_bot_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"id": 99, "is_bot": true, "first_name": "RyuBot", "username": "ryu_bot"}
            })))
            .mount(&server)
            .await;

        let mut ch = channel(&server);
        let me = ch.init().await.unwrap();
        assert_eq!(me, BotIdentity { id: 99, username: "ryu_bot".into() });
        assert_eq!(me.mention(), "@ryu_bot");
    }

    #[tokio::test]
    async fn init_rejects_bad_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "ok": false, "error_code": 401, "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let err = channel(&server).init().await.unwrap_err();
        assert!(matches!(err, ChannelError::Auth(msg) if msg.contains("Unauthorized")));
    }

    #[tokio::test]
    async fn send_markdown_with_keyboard() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": 42,
                "text": "*hi*",
                "parse_mode": "Markdown",
                "reply_markup": {"keyboard": [[{"text": "/help"}]], "resize_keyboard": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true, "result": {"message_id": 777}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let msg = OutgoingMessage::markdown(42, "*hi*")
            .with_keyboard(ReplyKeyboard::single_column(["/help"]));
        assert_eq!(channel(&server).send(msg).await.unwrap(), 777);
    }

    #[tokio::test]
    async fn send_reports_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities"
            })))
            .mount(&server)
            .await;

        let err = channel(&server)
            .send(OutgoingMessage::markdown(42, "*broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed(msg) if msg.contains("parse entities")));
    }

    #[tokio::test]
    async fn send_action_posts_typing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendChatAction"))
            .and(body_partial_json(serde_json::json!({"chat_id": 42, "action": "typing"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true, "result": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        channel(&server)
            .send_action(42, ChatAction::Typing)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn listen_delivers_text_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [{
                    "update_id": 1,
                    "message": {
                        "message_id": 1,
                        "date": 0,
                        "chat": {"id": 42, "type": "private", "first_name": "Ada"},
                        "from": {"id": 7, "first_name": "Ada"},
                        "text": "hello"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let ch = std::sync::Arc::new(channel(&server));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = {
            let ch = ch.clone();
            tokio::spawn(async move {
                let _ = ch
                    .listen(move |msg| {
                        let _ = tx.send(msg);
                    })
                    .await;
            })
        };

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.text(), Some("hello"));
        assert_eq!(msg.chat_id(), 42);
        listener.abort();
    }
}
