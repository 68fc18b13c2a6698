//! Per-chat conversation context.
//!
//! A [`SessionStore`] keeps a bounded sliding window of turns for every chat
//! that has talked to the bot. The window is trimmed strictly FIFO: once a
//! session holds `max_turns` turns, each new turn evicts the oldest one.
//! Sessions live only in memory; clearing one hands it back for export and
//! forgets it.

mod lock;

pub use lock::{ChatGuard, ChatLocks};

use crate::message::ChatId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered turns for one chat, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    turns: VecDeque<Turn>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and evict from the front until at most `max_turns`
    /// remain. Returns the number of evicted turns.
    pub fn push_bounded(&mut self, turn: Turn, max_turns: usize) -> usize {
        self.turns.push_back(turn);

        let excess = self.turns.len().saturating_sub(max_turns);
        self.turns.drain(..excess);
        excess
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns.into()
    }
}

/// Process-wide map from chat to session.
///
/// Each operation is atomic on its own. Sequences that must not interleave
/// with other handlers for the same chat (read, call the model, write back)
/// are additionally guarded by [`ChatLocks`].
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<ChatId, Session>,
    max_turns: usize,
}

impl SessionStore {
    /// Create a store retaining at most `max_turns` turns per chat.
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Append a turn, creating the session on first use.
    pub fn append(&self, chat_id: ChatId, turn: Turn) {
        let mut session = self.sessions.entry(chat_id).or_default();
        let evicted = session.push_bounded(turn, self.max_turns);
        if evicted > 0 {
            tracing::debug!(
                chat_id,
                evicted,
                retained = session.len(),
                "Session window full, dropped oldest turns"
            );
        }
    }

    /// Snapshot of a chat's session; empty if the chat has none.
    pub fn get(&self, chat_id: ChatId) -> Session {
        self.sessions
            .get(&chat_id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// The session as it would look after appending `turn`, without
    /// storing anything.
    pub fn preview(&self, chat_id: ChatId, turn: Turn) -> Session {
        let mut session = self.get(chat_id);
        session.push_bounded(turn, self.max_turns);
        session
    }

    /// Remove a chat's session and return it.
    ///
    /// Returns `None` when there is nothing to clear.
    pub fn clear(&self, chat_id: ChatId) -> Option<Session> {
        self.sessions
            .remove(&chat_id)
            .map(|(_, session)| session)
            .filter(|session| !session.is_empty())
    }

    /// Number of turns currently held for a chat.
    pub fn len(&self, chat_id: ChatId) -> usize {
        self.sessions.get(&chat_id).map_or(0, |s| s.len())
    }

    /// Number of chats with a live session.
    pub fn chat_count(&self) -> usize {
        self.sessions.len()
    }
}
