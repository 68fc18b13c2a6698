//! Per-chat mutual exclusion.

use crate::message::ChatId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per chat.
///
/// Handlers for the same chat run one after another; different chats never
/// wait on each other. The guard may be held across `.await` points such as
/// the completion request. A chat's entry is dropped once no handler holds
/// or waits for it.
#[derive(Debug, Default)]
pub struct ChatLocks {
    locks: DashMap<ChatId, Arc<Mutex<()>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `chat_id`.
    pub async fn lock(&self, chat_id: ChatId) -> ChatGuard<'_> {
        // The map shard guard is released before awaiting.
        let mutex = self.locks.entry(chat_id).or_default().value().clone();
        let guard = mutex.lock_owned().await;
        ChatGuard {
            locks: self,
            chat_id,
            guard: Some(guard),
        }
    }

    /// Number of chats with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Remove the entry for `chat_id` if nobody else references it.
    fn release(&self, chat_id: ChatId) {
        // Holders and waiters each keep a clone; 1 means only the map is left.
        self.locks
            .remove_if(&chat_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Exclusive access to one chat, released on drop.
#[derive(Debug)]
pub struct ChatGuard<'a> {
    locks: &'a ChatLocks,
    chat_id: ChatId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChatGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(self.chat_id);
    }
}
