//! RyuBot - a Telegram coding assistant backed by a DeepSeek-compatible
//! chat-completion API.
//!
//! ## Architecture
//!
//! ```text
//! Telegram ─ getUpdates ─→ TelegramChannel ─ mpsc ─→ Dispatcher ─→ CompletionClient
//!                                                     │   │
//!                                       SessionStore ─┘   └─ ConversationExporter
//! User ←──────── sendMessage ←──────── Messenger ←────┘
//! ```
//!
//! Every chat has its own bounded conversation window. A single mode
//! selector shared by all chats decides which model and temperature the
//! next completion uses. Clearing a chat writes its window to a JSON file.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod completion;
pub mod dispatcher;
pub mod export;
pub mod message;
pub mod mode;
pub mod session;
pub mod telegram;
pub mod traits;

// Re-export commonly used types
pub use completion::{CompletionClient, CompletionError, CompletionProvider};
pub use dispatcher::{Command, Dispatcher, Route};
pub use export::{ConversationExporter, ExportError};
pub use message::{
    BotIdentity, ChannelMessage, ChatInfo, ChatKind, OutgoingContent, OutgoingMessage,
};
pub use mode::{Mode, ModeSelector};
pub use session::{ChatGuard, ChatLocks, Role, Session, SessionStore, Turn};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult, Messenger};

use ryubot_common::config::Config;
use std::sync::Arc;

/// Connect to Telegram and serve chats until Ctrl-C.
pub async fn start_bot(config: &Config) -> anyhow::Result<()> {
    let mut telegram = TelegramChannel::from_config(&config.telegram);
    let identity = telegram.init().await?;
    let telegram = Arc::new(telegram);

    let completion = CompletionClient::from_config(&config.completion)?;
    let store = SessionStore::new(config.session.max_turns);
    let exporter = ConversationExporter::from_config(&config.export);

    tracing::info!(
        bot = %identity.mention(),
        model = %config.modes.primary.model,
        max_turns = store.max_turns(),
        export_dir = %exporter.dir().display(),
        "RyuBot started"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        telegram.clone(),
        Arc::new(completion),
        store,
        ModeSelector::from_config(&config.modes),
        exporter,
        identity.clone(),
    ));

    // Unbounded so the poller never drops an update.
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let processor_handle = Dispatcher::spawn_processor(dispatcher, rx);

    let on_message = move |msg: ChannelMessage| {
        if let Err(e) = tx.send(msg) {
            tracing::warn!("Dispatcher stopped, dropping inbound message: {e}");
        }
    };

    tokio::select! {
        result = telegram.listen(on_message) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
    }

    telegram.shutdown().await?;
    processor_handle.abort();

    Ok(())
}
