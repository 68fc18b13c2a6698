//! Routes inbound messages to command handlers or the completion flow.

use crate::completion::CompletionProvider;
use crate::export::ConversationExporter;
use crate::message::{
    BotIdentity, ChannelMessage, ChatAction, ChatId, OutgoingMessage, ReplyKeyboard,
};
use crate::mode::ModeSelector;
use crate::session::{ChatLocks, SessionStore, Turn};
use crate::telegram::{split_message, MAX_MESSAGE_LEN};
use crate::traits::Messenger;
use anyhow::Result;
use ryubot_common::{api_call_span, channel_span};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

const GREETING: &str =
    "🤖 Hi! I'm your coding assistant. Send me code or an error to analyse, or just ask a question!";
const TEXT_ONLY: &str = "Sorry, I can only respond to text messages.";
const NOTHING_TO_CLEAR: &str = "No conversation context to clear.";
const CONTEXT_CLEARED: &str = "ℹ️ Conversation context cleared.";
const EXPORT_FAILED: &str = "⚠️ Failed to save the conversation context.";
const UNKNOWN_COMMAND: &str = "ℹ️ That command is not available.";
const SEND_FAILED: &str = "⚠️ An error occurred while sending the message.";

const HELP_TEXT: &str = "Available commands
━━━━━━━━━━━━━━━━━━━━
/start - start the bot
/clear - clear the conversation context
/help - show this help message
/info - show the current conversation mode
/mode - switch between the \"chat\" and \"reasoning\" models

Aliases: /deepclear, /deephelp, /deepinfo, /deepcheck, /deepmodel";

/// Buttons on the `/start` reply keyboard.
const START_KEYBOARD: [&str; 4] = ["/help", "/clear", "/mode", "/info"];

// ============================================================================
// Routing
// ============================================================================

/// Bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Clear,
    SwitchMode,
    Help,
    Info,
    Unknown(String),
}

impl Command {
    fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "clear" | "deepclear" => Self::Clear,
            "mode" | "deepmodel" | "switch-mode" | "switch_mode" => Self::SwitchMode,
            "help" | "deephelp" => Self::Help,
            "info" | "deepinfo" | "deepcheck" => Self::Info,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

/// What to do with an inbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// A command addressed to a different bot (`/cmd@otherbot`).
    OtherBot,
    /// Free text for the completion flow.
    Text,
}

/// Classify `text` for a bot called `bot_username`.
pub fn route(text: &str, bot_username: &str) -> Route {
    let Some(rest) = text.strip_prefix('/') else {
        return Route::Text;
    };

    let token = rest.split_whitespace().next().unwrap_or("");
    let (name, target) = match token.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (token, None),
    };

    match target {
        Some(target) if !target.eq_ignore_ascii_case(bot_username) => Route::OtherBot,
        _ => Route::Command(Command::from_name(name)),
    }
}

/// Strip a leading `prefix`, comparing ASCII case-insensitively.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Per-message handler shared by all chats.
pub struct Dispatcher {
    messenger: Arc<dyn Messenger>,
    completion: Arc<dyn CompletionProvider>,
    store: SessionStore,
    modes: ModeSelector,
    exporter: ConversationExporter,
    locks: ChatLocks,
    identity: BotIdentity,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        completion: Arc<dyn CompletionProvider>,
        store: SessionStore,
        modes: ModeSelector,
        exporter: ConversationExporter,
        identity: BotIdentity,
    ) -> Self {
        Self {
            messenger,
            completion,
            store,
            modes,
            exporter,
            locks: ChatLocks::new(),
            identity,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn modes(&self) -> &ModeSelector {
        &self.modes
    }

    /// Handle one inbound message.
    pub async fn dispatch(&self, msg: ChannelMessage) -> Result<()> {
        let span = channel_span!(
            "telegram",
            msg.trace_id,
            msg.sender_handle(),
            chat_id = msg.chat_id()
        );
        self.handle(&msg).instrument(span).await
    }

    async fn handle(&self, msg: &ChannelMessage) -> Result<()> {
        match route(msg.text().unwrap_or(""), &self.identity.username) {
            Route::Command(cmd) => {
                tracing::info!(command = ?cmd, "Handling command");
                self.handle_command(cmd, msg).await
            }
            Route::OtherBot => {
                tracing::debug!("Ignoring command addressed to another bot");
                Ok(())
            }
            Route::Text => self.handle_text(msg).await,
        }
    }

    async fn handle_command(&self, cmd: Command, msg: &ChannelMessage) -> Result<()> {
        let chat_id = msg.chat_id();
        match cmd {
            Command::Start => {
                let keyboard = ReplyKeyboard::single_column(START_KEYBOARD);
                self.messenger
                    .send(OutgoingMessage::text(chat_id, GREETING).with_keyboard(keyboard))
                    .await?;
            }
            Command::Clear => self.handle_clear(msg).await?,
            Command::SwitchMode => {
                let mode = self.modes.toggle();
                let text = format!(
                    "ℹ️ Conversation mode switched to {} with temperature {:.1}.",
                    mode.model, mode.temperature
                );
                self.reply(chat_id, text).await?;
            }
            Command::Help => self.reply(chat_id, HELP_TEXT).await?,
            Command::Info => {
                self.messenger
                    .send(OutgoingMessage::markdown(chat_id, self.info_text(msg)))
                    .await?;
            }
            Command::Unknown(name) => {
                tracing::debug!(command = %name, "Unknown command");
                self.reply(chat_id, UNKNOWN_COMMAND).await?;
            }
        }
        Ok(())
    }

    fn info_text(&self, msg: &ChannelMessage) -> String {
        let mode = self.modes.current();
        let rule = "━━━━━━━━━━━━━━━━━━━━";

        let mut text = format!(
            "ⓘ *Chat info*\n{rule}\n⤷ {}\n⤷ Model: {}\n⤷ Temperature: {:.1}\n\n🤖 *Modes*\n{rule}\n",
            msg.chat.display_name(),
            mode.model,
            mode.temperature
        );
        for preset in self.modes.presets() {
            text.push_str(&format!(
                "⤷ *{}* ({:.1}): {}\n",
                preset.model, preset.temperature, preset.description
            ));
        }
        text
    }

    async fn handle_clear(&self, msg: &ChannelMessage) -> Result<()> {
        let chat_id = msg.chat_id();

        let cleared = {
            let _guard = self.locks.lock(chat_id).await;
            self.store.clear(chat_id)
        };

        let Some(session) = cleared else {
            return self.reply(chat_id, NOTHING_TO_CLEAR).await;
        };

        let mode = self.modes.current();
        match self.exporter.export(&msg.chat, &session, &mode).await {
            Ok(_) => self.reply(chat_id, CONTEXT_CLEARED).await,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    turns = session.len(),
                    "Failed to export cleared conversation"
                );
                self.reply(chat_id, EXPORT_FAILED).await
            }
        }
    }

    /// The text to send to the model, or `None` if a group message is not
    /// meant for this bot.
    fn user_input<'a>(&self, msg: &'a ChannelMessage) -> Option<&'a str> {
        let text = msg.text().unwrap_or("");
        if !msg.chat.kind.is_group() {
            return Some(text);
        }

        if let Some(rest) = strip_prefix_ignore_case(text, &self.identity.mention()) {
            return Some(rest.trim());
        }
        msg.is_reply_to(self.identity.id).then_some(text)
    }

    async fn handle_text(&self, msg: &ChannelMessage) -> Result<()> {
        let chat_id = msg.chat_id();

        let Some(input) = self.user_input(msg) else {
            tracing::debug!("Group message not addressed to the bot, ignoring");
            return Ok(());
        };

        if input.trim().is_empty() {
            return self.reply(chat_id, TEXT_ONLY).await;
        }

        if let Err(e) = self.messenger.send_action(chat_id, ChatAction::Typing).await {
            tracing::warn!("Failed to send typing indicator: {e}");
        }

        let outcome = {
            let _guard = self.locks.lock(chat_id).await;
            let mode = self.modes.current();
            let user_turn = Turn::user(input);
            let window = self.store.preview(chat_id, user_turn.clone());

            let span = api_call_span!(msg.trace_id, model = %mode.model, turns = window.len());
            let outcome = self.completion.complete(&window, &mode).instrument(span).await;

            if let Ok(reply) = &outcome {
                self.store.append(chat_id, user_turn);
                self.store.append(chat_id, Turn::assistant(reply.as_str()));
            }
            outcome
        };

        match outcome {
            Ok(reply) => {
                self.deliver(chat_id, &reply).await?;
                tracing::info!(
                    user = %msg.sender_handle(),
                    retained_turns = self.store.len(chat_id),
                    "Response delivered"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Completion failed");
                self.reply(chat_id, e.user_message()).await
            }
        }
    }

    /// Send a reply in chunks: Markdown first, plain text if that is
    /// rejected, and an error notice if both fail.
    async fn deliver(&self, chat_id: ChatId, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let markdown = OutgoingMessage::markdown(chat_id, chunk);
            let Err(e) = self.messenger.send(markdown.clone()).await else {
                continue;
            };
            tracing::warn!("Markdown send failed, retrying as plain text: {e}");

            let plain = OutgoingMessage {
                content: markdown.content.to_plain(),
                ..markdown
            };
            if let Err(e) = self.messenger.send(plain).await {
                tracing::error!("Plain text send failed: {e}");
                self.reply(chat_id, SEND_FAILED).await?;
            }
        }
        Ok(())
    }

    async fn reply(&self, chat_id: ChatId, text: impl Into<String>) -> Result<()> {
        self.messenger
            .send(OutgoingMessage::text(chat_id, text))
            .await?;
        Ok(())
    }

    /// Start a background processor that handles messages from a channel.
    pub fn spawn_processor(
        dispatcher: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Dispatcher processor started");

            while let Some(message) = rx.recv().await {
                let dispatcher = dispatcher.clone();

                // Process each message in its own task
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.dispatch(message).await {
                        tracing::error!(error = %e, "Failed to process message");
                    }
                });
            }

            tracing::info!("Dispatcher processor stopped");
        })
    }
}
