use crate::domain::model::{ConnectionId, ParticipantId, RoundId};
use std::collections::HashMap;

/// Who a connection speaks for, and in which round it last took part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub participant_id: ParticipantId,
    pub round_id: Option<RoundId>,
}

/// Non-owning map of live connections to participant identities.
///
/// Never holds submission data; the engine consults it when a connection
/// drops to decide which estimate to withdraw.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    bindings: HashMap<ConnectionId, Presence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds (or re-binds) a connection. The last identity wins.
    pub fn bind(&mut self, connection: ConnectionId, participant_id: ParticipantId, round_id: Option<RoundId>) {
        if let Some(previous) = self.bindings.get(&connection) {
            if previous.participant_id != participant_id {
                tracing::debug!(
                    "{} switched identity from {} to {}",
                    connection,
                    previous.participant_id,
                    participant_id
                );
            }
        }
        self.bindings.insert(
            connection,
            Presence {
                participant_id,
                round_id,
            },
        );
    }

    pub fn current_participant(&self, connection: ConnectionId) -> Option<&ParticipantId> {
        self.bindings.get(&connection).map(|p| &p.participant_id)
    }

    pub fn presence(&self, connection: ConnectionId) -> Option<&Presence> {
        self.bindings.get(&connection)
    }

    pub fn unbind(&mut self, connection: ConnectionId) -> Option<Presence> {
        self.bindings.remove(&connection)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
