use crate::session::Session;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type SessionMap = HashMap<String, Session>;

/// Outcome of [`SessionRegistry::assign_conversation_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAssignment {
    /// The identifier was stored.
    Assigned,
    /// The session already had an identifier; it was kept.
    AlreadyAssigned(String),
    /// No session is registered under the key.
    Missing,
}

/// Concurrent table of active sessions.
///
/// Uses `std::sync::RwLock`: every critical section is a single HashMap
/// operation and never spans an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionMap> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            tracing::error!("session registry lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionMap> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            tracing::error!("session registry lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Stores a session under `key`, returning the session it replaced.
    pub fn put(&self, key: impl Into<String>, session: Session) -> Option<Session> {
        let key = key.into();
        let previous = self.write().insert(key.clone(), session);
        if previous.is_some() {
            tracing::warn!(key = %key, "replaced a live session registered under the same key");
        }
        previous
    }

    /// Returns a copy of the session registered under `key`.
    pub fn get(&self, key: &str) -> Option<Session> {
        self.read().get(key).cloned()
    }

    /// Removes and returns the session registered under `key`.
    pub fn delete(&self, key: &str) -> Option<Session> {
        self.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Records the voice-AI conversation identifier for a session.
    ///
    /// First write wins: once a session holds an identifier, later calls leave
    /// it untouched.
    pub fn assign_conversation_id(
        &self,
        key: &str,
        conversation_id: &str,
    ) -> ConversationAssignment {
        let mut sessions = self.write();
        let Some(session) = sessions.get_mut(key) else {
            return ConversationAssignment::Missing;
        };
        match &session.conversation_id {
            Some(existing) => ConversationAssignment::AlreadyAssigned(existing.clone()),
            None => {
                session.conversation_id = Some(conversation_id.to_string());
                ConversationAssignment::Assigned
            }
        }
    }

    /// Flags a session as tearing down. Returns `false` when absent.
    pub fn mark_disconnecting(&self, key: &str) -> bool {
        match self.write().get_mut(key) {
            Some(session) => {
                session.disconnecting = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copies every registered session, oldest first.
    pub fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.read().values().cloned().collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }
}
