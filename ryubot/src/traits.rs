//! Channel traits for the messaging collaborator.

use crate::message::{BotIdentity, ChannelMessage, ChatAction, ChatId, OutgoingMessage};
use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Outbound half of a channel: what handlers need to talk back to a chat.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send one message. Returns the platform message ID.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<i64>;

    /// Show a status indicator such as "typing…".
    async fn send_action(&self, chat_id: ChatId, action: ChatAction) -> ChannelResult<()>;
}

/// Channel adapter trait.
#[async_trait]
pub trait Channel: Messenger {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Authenticate and resolve the bot's own identity.
    async fn init(&mut self) -> ChannelResult<BotIdentity>;

    /// Receive messages until the task is cancelled, invoking `callback`
    /// for each one.
    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static;

    /// Shutdown the channel gracefully.
    async fn shutdown(&self) -> ChannelResult<()>;
}
