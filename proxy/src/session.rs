//! `session_id -> ClientSession` registry. Grounded on the teacher's
//! `session.rs` (`Arc<DashMap<SessionId, SessionContext>>` keyed registry
//! of typed-id to per-session context), generalized from a UUID-keyed
//! PTY session table to the 16-bit rolling-counter session ids spec.md
//! section 4.4 requires.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::{debug, warn};

use clkmgr_core::message::INVALID_SESSION_ID;
use clkmgr_core::transport::Transport;
use clkmgr_core::ClkmgrError;

/// A live client association: its tx transport and the time bases it
/// has subscribed to.
pub struct ClientSession {
    pub client_id: String,
    pub transport: Arc<dyn Transport>,
    subscribed: Mutex<HashSet<u32>>,
}

impl ClientSession {
    pub fn is_subscribed(&self, time_base_index: u32) -> bool {
        self.subscribed.lock().unwrap().contains(&time_base_index)
    }
}

/// Maps `session_id -> ClientSession`. A single registry mutex guards
/// only the rolling-allocation counter; the session map itself is a
/// concurrent `DashMap` so lookups from many monitor threads don't
/// contend on one lock (spec.md section 5: "guarded by a single
/// registry mutex; short critical sections").
pub struct SessionRegistry {
    sessions: DashMap<u16, ClientSession>,
    next_id: Mutex<u16>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
            next_id: Mutex::new(0),
        }
    }

    /// Rolling allocation, skipping ids already live and the reserved
    /// invalid value. Returns `None` when all 65535 usable ids are
    /// live.
    fn allocate_id(&self) -> Option<u16> {
        let mut next = self.next_id.lock().unwrap();
        for _ in 0..=u16::MAX {
            let candidate = *next;
            *next = next.wrapping_add(1);
            if candidate == INVALID_SESSION_ID {
                continue;
            }
            if !self.sessions.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// `session_id == INVALID_SESSION_ID` allocates a fresh session;
    /// otherwise validates that the given id still exists (the
    /// liveness-probe reconnect path). Returns the live session id, or
    /// `INVALID_SESSION_ID` on allocation failure / an unknown probed
    /// id.
    pub fn connect(
        &self,
        session_id: u16,
        client_id: String,
        transport: Arc<dyn Transport>,
    ) -> u16 {
        if session_id != INVALID_SESSION_ID {
            return if self.sessions.contains_key(&session_id) {
                session_id
            } else {
                INVALID_SESSION_ID
            };
        }
        match self.allocate_id() {
            Some(id) => {
                self.sessions.insert(
                    id,
                    ClientSession {
                        client_id,
                        transport,
                        subscribed: Mutex::new(HashSet::new()),
                    },
                );
                debug!("allocated session {id:#06x}");
                id
            }
            None => {
                warn!("session table exhausted");
                INVALID_SESSION_ID
            }
        }
    }

    /// Idempotent: registering the same `(session, timeBase)` pair
    /// twice leaves the subscriber set unchanged.
    pub fn subscribe(&self, session_id: u16, time_base_index: u32) -> Result<(), ClkmgrError> {
        match self.sessions.get(&session_id) {
            Some(session) => {
                session.subscribed.lock().unwrap().insert(time_base_index);
                Ok(())
            }
            None => Err(ClkmgrError::InvalidSessionId(session_id)),
        }
    }

    pub fn remove(&self, session_id: u16) {
        if self.sessions.remove(&session_id).is_some() {
            debug!("removed session {session_id:#06x}");
        }
    }

    pub fn get_transport(&self, session_id: u16) -> Option<Arc<dyn Transport>> {
        self.sessions
            .get(&session_id)
            .map(|s| Arc::clone(&s.transport))
    }

    pub fn subscribers_for(&self, time_base_index: u32) -> Vec<u16> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_subscribed(time_base_index))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clkmgr_core::Message;

    struct NullTransport;
    impl Transport for NullTransport {
        fn send(&self, _msg: &Message) -> Result<(), ClkmgrError> {
            Ok(())
        }
    }

    #[test]
    fn allocates_distinct_ids() {
        let registry = SessionRegistry::new();
        let a = registry.connect(INVALID_SESSION_ID, "a".into(), Arc::new(NullTransport));
        let b = registry.connect(INVALID_SESSION_ID, "b".into(), Arc::new(NullTransport));
        assert_ne!(a, INVALID_SESSION_ID);
        assert_ne!(b, INVALID_SESSION_ID);
        assert_ne!(a, b);
    }

    #[test]
    fn reconnect_validates_existing_session() {
        let registry = SessionRegistry::new();
        let a = registry.connect(INVALID_SESSION_ID, "a".into(), Arc::new(NullTransport));
        assert_eq!(
            registry.connect(a, "a".into(), Arc::new(NullTransport)),
            a
        );
        assert_eq!(
            registry.connect(12345, "ghost".into(), Arc::new(NullTransport)),
            INVALID_SESSION_ID
        );
    }

    #[test]
    fn subscribe_is_idempotent() {
        let registry = SessionRegistry::new();
        let id = registry.connect(INVALID_SESSION_ID, "a".into(), Arc::new(NullTransport));
        registry.subscribe(id, 1).unwrap();
        registry.subscribe(id, 1).unwrap();
        assert_eq!(registry.subscribers_for(1), vec![id]);
    }

    #[test]
    fn subscribe_unknown_session_is_an_error() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.subscribe(999, 1),
            Err(ClkmgrError::InvalidSessionId(999))
        ));
    }

    #[test]
    fn exhaustion_returns_invalid() {
        let registry = SessionRegistry::new();
        for _ in 0..u16::MAX {
            let id = registry.connect(INVALID_SESSION_ID, "x".into(), Arc::new(NullTransport));
            assert_ne!(id, INVALID_SESSION_ID);
        }
        assert_eq!(registry.len(), u16::MAX as usize);
        let overflow = registry.connect(INVALID_SESSION_ID, "one-too-many".into(), Arc::new(NullTransport));
        assert_eq!(overflow, INVALID_SESSION_ID);
    }
}
