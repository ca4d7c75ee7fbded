//! Online-presence interface.
//!
//! Reported by the live-play subsystem; consumed by the instant-start
//! fast path and by grace-period absence detection.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::tournament::models::ParticipantId;

/// Presence collaborator consumed by the engine.
#[async_trait]
pub trait PresenceProvider: Send + Sync {
    /// Whether the participant is currently online and available.
    async fn is_online(&self, participant: ParticipantId) -> bool;
}

/// In-memory presence set, settable from tests or an embedding process.
#[derive(Debug, Default)]
pub struct StaticPresence {
    online: Mutex<HashSet<ParticipantId>>,
}

impl StaticPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, participant: ParticipantId) {
        self.online
            .lock()
            .expect("presence lock poisoned")
            .insert(participant);
    }

    pub fn set_offline(&self, participant: ParticipantId) {
        self.online
            .lock()
            .expect("presence lock poisoned")
            .remove(&participant);
    }
}

#[async_trait]
impl PresenceProvider for StaticPresence {
    async fn is_online(&self, participant: ParticipantId) -> bool {
        self.online
            .lock()
            .expect("presence lock poisoned")
            .contains(&participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_presence_tracks_membership() {
        let presence = StaticPresence::new();
        assert!(!presence.is_online(1).await);

        presence.set_online(1);
        assert!(presence.is_online(1).await);

        presence.set_offline(1);
        assert!(!presence.is_online(1).await);
    }
}
