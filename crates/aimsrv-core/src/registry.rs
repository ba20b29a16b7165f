//! Session registry (`spec.md` §4.3): enforces at most one live non-chat
//! session per identity and indexes chat sessions by (identity, room
//! cookie).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aimsrv_wire::screen_name::Identity;

use crate::error::{CoreError, Result};
use crate::session::Session;

/// Key for a chat session: the room cookie plus the occupant's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatSessionKey {
    pub room_cookie: String,
    pub identity: Identity,
}

#[derive(Default)]
struct RegistryState {
    bos: HashMap<Identity, Arc<Session>>,
    chat: HashMap<ChatSessionKey, Arc<Session>>,
}

/// Tracks every live session. One BOS (or Auth/ICQ) session per identity is
/// allowed at a time; chat sessions are a separate namespace since a user
/// may be in several rooms while also signed on to BOS (`spec.md` §3).
#[derive(Default)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Registers a new BOS-family session. If `kick_existing` is false and
    /// an identity already has a live session, returns
    /// [`CoreError::AlreadySignedOn`]; the caller is responsible for closing
    /// and re-registering if `kick_existing` is true (`spec.md` §4.3).
    pub fn register(&self, session: Arc<Session>, kick_existing: bool) -> Result<Option<Arc<Session>>> {
        let mut state = self.lock();
        if let Some(existing) = state.bos.get(&session.identity) {
            if !kick_existing {
                return Err(CoreError::AlreadySignedOn(session.identity.to_string()));
            }
            let evicted = existing.clone();
            state.bos.insert(session.identity.clone(), session);
            return Ok(Some(evicted));
        }
        state.bos.insert(session.identity.clone(), session);
        Ok(None)
    }

    pub fn lookup(&self, identity: &Identity) -> Option<Arc<Session>> {
        self.lock().bos.get(identity).cloned()
    }

    /// Removes a session, but only if it is still the one on file — guards
    /// against an old session's teardown clobbering a newer registration
    /// for the same identity.
    pub fn deregister(&self, identity: &Identity, session: &Arc<Session>) {
        let mut state = self.lock();
        if let Some(current) = state.bos.get(identity) {
            if Arc::ptr_eq(current, session) {
                state.bos.remove(identity);
            }
        }
    }

    pub fn all_bos(&self) -> Vec<Arc<Session>> {
        self.lock().bos.values().cloned().collect()
    }

    pub fn bos_count(&self) -> usize {
        self.lock().bos.len()
    }

    pub fn register_chat(&self, room_cookie: String, session: Arc<Session>) {
        let key = ChatSessionKey {
            room_cookie,
            identity: session.identity.clone(),
        };
        self.lock().chat.insert(key, session);
    }

    pub fn deregister_chat(&self, room_cookie: &str, identity: &Identity) {
        let key = ChatSessionKey {
            room_cookie: room_cookie.to_string(),
            identity: identity.clone(),
        };
        self.lock().chat.remove(&key);
    }

    pub fn lookup_chat(&self, room_cookie: &str, identity: &Identity) -> Option<Arc<Session>> {
        let key = ChatSessionKey {
            room_cookie: room_cookie.to_string(),
            identity: identity.clone(),
        };
        self.lock().chat.get(&key).cloned()
    }

    /// All occupant sessions currently in the given room, in no particular
    /// order.
    pub fn chat_occupants(&self, room_cookie: &str) -> Vec<Arc<Session>> {
        self.lock()
            .chat
            .iter()
            .filter(|(key, _)| key.room_cookie == room_cookie)
            .map(|(_, session)| session.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5190)
    }

    fn session(name: &str) -> Arc<Session> {
        Arc::new(Session::new(Identity::from_display(name), name.to_string(), None, addr(), 0))
    }

    #[test]
    fn second_registration_without_kick_is_rejected() {
        let reg = SessionRegistry::new();
        reg.register(session("alice"), false).unwrap();
        let err = reg.register(session("alice"), false).unwrap_err();
        assert!(matches!(err, CoreError::AlreadySignedOn(_)));
    }

    #[test]
    fn kick_existing_evicts_prior_session() {
        let reg = SessionRegistry::new();
        let first = session("alice");
        reg.register(first.clone(), false).unwrap();
        let second = session("alice");
        let evicted = reg.register(second.clone(), true).unwrap().unwrap();
        assert!(Arc::ptr_eq(&evicted, &first));
        assert!(Arc::ptr_eq(&reg.lookup(&Identity::from_display("alice")).unwrap(), &second));
    }

    #[test]
    fn deregister_ignores_stale_session() {
        let reg = SessionRegistry::new();
        let first = session("alice");
        reg.register(first.clone(), false).unwrap();
        let second = session("alice");
        reg.register(second.clone(), true).unwrap();
        reg.deregister(&Identity::from_display("alice"), &first);
        assert!(reg.lookup(&Identity::from_display("alice")).is_some());
    }

    #[test]
    fn chat_occupants_scoped_to_room() {
        let reg = SessionRegistry::new();
        reg.register_chat("room-1".to_string(), session("alice"));
        reg.register_chat("room-1".to_string(), session("bob"));
        reg.register_chat("room-2".to_string(), session("carol"));
        assert_eq!(reg.chat_occupants("room-1").len(), 2);
        assert_eq!(reg.chat_occupants("room-2").len(), 1);
    }
}
