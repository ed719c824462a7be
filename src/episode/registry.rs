//! Live-episode registry: conversation id -> cancellation token and the last
//! checkpointed transcript.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::{ConversationId, EpisodeId};

#[derive(Debug)]
struct LiveEpisode {
    episode_id: EpisodeId,
    token: CancellationToken,
    partial: String,
}

/// Shared registry of live episodes. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct EpisodeRegistry {
    inner: Arc<Mutex<HashMap<ConversationId, LiveEpisode>>>,
}

impl EpisodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new episode with a fresh token.
    ///
    /// An episode already live for the same conversation is displaced: its
    /// token is no longer reachable through [`cancel`](Self::cancel).
    pub fn register(&self, conversation_id: ConversationId) -> EpisodeRegistration {
        let episode_id = Uuid::new_v4();
        let token = CancellationToken::new();
        let previous = self.lock().insert(
            conversation_id,
            LiveEpisode {
                episode_id,
                token: token.clone(),
                partial: String::new(),
            },
        );
        if let Some(previous) = previous {
            tracing::warn!(
                conversation_id,
                displaced = %previous.episode_id,
                "registering episode over a live one"
            );
        }
        EpisodeRegistration {
            registry: self.clone(),
            conversation_id,
            episode_id,
            token,
        }
    }

    /// Cancel the live episode for `conversation_id`.
    ///
    /// Returns `false` when nothing is registered for it.
    pub fn cancel(&self, conversation_id: ConversationId) -> bool {
        match self.lock().get(&conversation_id) {
            Some(live) => {
                live.token.cancel();
                tracing::info!(conversation_id, episode_id = %live.episode_id, "cancelling episode");
                true
            }
            None => {
                tracing::warn!(conversation_id, "no live episode to cancel");
                false
            }
        }
    }

    pub fn is_live(&self, conversation_id: ConversationId) -> bool {
        self.lock().contains_key(&conversation_id)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    /// Cancel every live episode and clear the registry. Returns how many
    /// were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<LiveEpisode> = self.lock().drain().map(|(_, live)| live).collect();
        for live in &drained {
            live.token.cancel();
        }
        drained.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationId, LiveEpisode>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of one registry slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct EpisodeRegistration {
    registry: EpisodeRegistry,
    conversation_id: ConversationId,
    episode_id: EpisodeId,
    token: CancellationToken,
}

impl EpisodeRegistration {
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn episode_id(&self) -> EpisodeId {
        self.episode_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Store `transcript` as the last checkpoint, unless displaced.
    pub fn record_checkpoint(&self, transcript: &str) {
        if let Some(live) = self.own_slot().entry_mut() {
            live.partial.clear();
            live.partial.push_str(transcript);
        }
    }

    pub fn last_checkpoint(&self) -> Option<String> {
        self.own_slot().entry().map(|live| live.partial.clone())
    }

    /// Content stored for a cancelled episode: the last checkpoint (or
    /// `fallback` when displaced) followed by the notice.
    pub fn finalize_cancelled(&self, notice: &str, fallback: &str) -> String {
        let partial = self
            .last_checkpoint()
            .unwrap_or_else(|| fallback.to_string());
        if partial.is_empty() {
            notice.to_string()
        } else {
            format!("{partial}\n\n{notice}")
        }
    }

    fn own_slot(&self) -> SlotGuard<'_> {
        SlotGuard {
            guard: self.registry.lock(),
            conversation_id: self.conversation_id,
            episode_id: self.episode_id,
        }
    }
}

impl Drop for EpisodeRegistration {
    fn drop(&mut self) {
        let mut map = self.registry.lock();
        if map
            .get(&self.conversation_id)
            .is_some_and(|live| live.episode_id == self.episode_id)
        {
            map.remove(&self.conversation_id);
        }
    }
}

/// Locked view of a registration's own entry.
struct SlotGuard<'a> {
    guard: MutexGuard<'a, HashMap<ConversationId, LiveEpisode>>,
    conversation_id: ConversationId,
    episode_id: EpisodeId,
}

impl SlotGuard<'_> {
    fn entry(&self) -> Option<&LiveEpisode> {
        self.guard
            .get(&self.conversation_id)
            .filter(|live| live.episode_id == self.episode_id)
    }

    fn entry_mut(&mut self) -> Option<&mut LiveEpisode> {
        self.guard
            .get_mut(&self.conversation_id)
            .filter(|live| live.episode_id == self.episode_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_unknown_conversation_returns_false() {
        let registry = EpisodeRegistry::new();
        assert!(!registry.cancel(7));
    }

    #[test]
    fn cancel_sets_the_registered_token() {
        let registry = EpisodeRegistry::new();
        let registration = registry.register(1);
        assert!(registry.cancel(1));
        assert!(registration.is_cancelled());
    }

    #[test]
    fn dropping_the_registration_releases_the_slot() {
        let registry = EpisodeRegistry::new();
        let registration = registry.register(1);
        assert!(registry.is_live(1));
        drop(registration);
        assert!(!registry.is_live(1));
        assert!(!registry.cancel(1));
    }

    #[test]
    fn new_episode_displaces_the_old_token() {
        let registry = EpisodeRegistry::new();
        let old = registry.register(1);
        let new = registry.register(1);
        assert!(registry.cancel(1));
        assert!(new.is_cancelled());
        assert!(!old.is_cancelled());

        old.record_checkpoint("stale");
        assert_eq!(new.last_checkpoint().as_deref(), Some(""));
        drop(old);
        assert!(registry.is_live(1));
    }

    #[test]
    fn finalize_appends_notice_to_last_checkpoint() {
        let registry = EpisodeRegistry::new();
        let registration = registry.register(3);
        registration.record_checkpoint("<write path=\"a.ts\">x");
        assert_eq!(
            registration.finalize_cancelled("[Response cancelled by user]", "ignored"),
            "<write path=\"a.ts\">x\n\n[Response cancelled by user]"
        );
        assert_eq!(
            registry.register(4).finalize_cancelled("[stop]", ""),
            "[stop]"
        );
    }

    #[test]
    fn cancel_all_clears_the_registry() {
        let registry = EpisodeRegistry::new();
        let a = registry.register(1);
        let b = registry.register(2);
        assert_eq!(registry.cancel_all(), 2);
        assert!(a.is_cancelled() && b.is_cancelled());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn recovers_from_a_poisoned_lock() {
        let registry = EpisodeRegistry::new();
        let clone = registry.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.inner.lock().unwrap();
            panic!("poison");
        })
        .join();
        let _registration = registry.register(9);
        assert!(registry.is_live(9));
    }
}
