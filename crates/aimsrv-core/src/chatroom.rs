//! Chat room registry (`spec.md` §4.7, §4.9, C9): rooms indexed by cookie
//! and by (exchange, name). Public-exchange rooms persist via the
//! repository; private-exchange rooms live only in memory and are
//! garbage-collected when their last occupant leaves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aimsrv_db::model::ChatRoomRecord;
use aimsrv_db::Repository;
use aimsrv_wire::screen_name::Identity;

use crate::error::{CoreError, Result};

/// Public exchanges persist their rooms across restarts; all others are
/// transient (`spec.md` §3: "exchange 4 = public, 5 = private").
pub const PUBLIC_EXCHANGE: u16 = 4;
pub const PRIVATE_EXCHANGE: u16 = 5;

#[derive(Debug, Clone)]
pub struct ChatRoom {
    pub exchange: u16,
    pub cookie: String,
    pub instance: u16,
    pub creator: Identity,
    pub display_name: String,
    pub detail_level: u8,
    pub created_at: u64,
}

impl ChatRoom {
    pub fn is_public(&self) -> bool {
        self.exchange == PUBLIC_EXCHANGE
    }
}

struct RegistryState {
    by_cookie: HashMap<String, ChatRoom>,
    occupant_counts: HashMap<String, usize>,
}

/// Tracks chat room metadata; occupant membership itself lives in
/// [`crate::registry::SessionRegistry`] (`spec.md` §8 design note: "rooms
/// hold weak references... and resolve through the registry").
pub struct ChatRoomRegistry {
    state: Mutex<RegistryState>,
    repo: Arc<dyn Repository>,
}

impl ChatRoomRegistry {
    pub fn new(repo: Arc<dyn Repository>) -> Result<Self> {
        let mut by_cookie = HashMap::new();
        for record in repo.list_chat_rooms(PUBLIC_EXCHANGE)? {
            by_cookie.insert(record.cookie.clone(), from_record(record));
        }
        Ok(Self {
            state: Mutex::new(RegistryState {
                by_cookie,
                occupant_counts: HashMap::new(),
            }),
            repo,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Creates a room, generating its cookie as `"{exchange}-{instance}-{name}"`
    /// (`spec.md` §4.8). Public rooms are additionally persisted.
    pub fn create(&self, exchange: u16, instance: u16, creator: Identity, display_name: String, detail_level: u8, now: u64) -> Result<ChatRoom> {
        let cookie = format!("{exchange}-{instance}-{display_name}");
        let mut state = self.lock();
        if state.by_cookie.contains_key(&cookie) {
            return Err(CoreError::RoomAlreadyExists(cookie));
        }
        let room = ChatRoom {
            exchange,
            cookie: cookie.clone(),
            instance,
            creator,
            display_name,
            detail_level,
            created_at: now,
        };
        if exchange == PUBLIC_EXCHANGE {
            self.repo.create_chat_room(to_record(&room))?;
        }
        state.by_cookie.insert(cookie, room.clone());
        Ok(room)
    }

    pub fn lookup(&self, cookie: &str) -> Option<ChatRoom> {
        self.lock().by_cookie.get(cookie).cloned()
    }

    pub fn list_exchange(&self, exchange: u16) -> Vec<ChatRoom> {
        self.lock().by_cookie.values().filter(|r| r.exchange == exchange).cloned().collect()
    }

    /// Called when a session has observably joined the room.
    pub fn note_join(&self, cookie: &str) {
        let mut state = self.lock();
        *state.occupant_counts.entry(cookie.to_string()).or_insert(0) += 1;
    }

    /// Called when a session has observably left; removes a private room
    /// once it has no remaining occupants (`spec.md` §4.7: "garbage
    /// collected when its session set becomes empty and exchange is
    /// private").
    pub fn note_leave(&self, cookie: &str) {
        let mut state = self.lock();
        let Some(count) = state.occupant_counts.get_mut(cookie) else {
            return;
        };
        *count = count.saturating_sub(1);
        let now_empty = *count == 0;
        if now_empty {
            state.occupant_counts.remove(cookie);
            if let Some(room) = state.by_cookie.get(cookie) {
                if !room.is_public() {
                    state.by_cookie.remove(cookie);
                }
            }
        }
    }
}

fn to_record(room: &ChatRoom) -> ChatRoomRecord {
    ChatRoomRecord {
        exchange: room.exchange,
        cookie: room.cookie.clone(),
        instance: room.instance,
        creator: room.creator.clone(),
        display_name: room.display_name.clone(),
        detail_level: room.detail_level,
        created_at: room.created_at,
    }
}

fn from_record(record: ChatRoomRecord) -> ChatRoom {
    ChatRoom {
        exchange: record.exchange,
        cookie: record.cookie,
        instance: record.instance,
        creator: record.creator,
        display_name: record.display_name,
        detail_level: record.detail_level,
        created_at: record.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aimsrv_db::memory::InMemoryRepository;

    fn registry() -> ChatRoomRegistry {
        ChatRoomRegistry::new(Arc::new(InMemoryRepository::new())).unwrap()
    }

    #[test]
    fn create_generates_cookie_from_parts() {
        let reg = registry();
        let room = reg.create(PUBLIC_EXCHANGE, 1, Identity::from_display("alice"), "Lobby".into(), 0, 0).unwrap();
        assert_eq!(room.cookie, "4-1-Lobby");
        assert!(reg.lookup(&room.cookie).is_some());
    }

    #[test]
    fn duplicate_room_is_rejected() {
        let reg = registry();
        reg.create(PUBLIC_EXCHANGE, 1, Identity::from_display("alice"), "Lobby".into(), 0, 0).unwrap();
        let err = reg.create(PUBLIC_EXCHANGE, 1, Identity::from_display("bob"), "Lobby".into(), 0, 0).unwrap_err();
        assert!(matches!(err, CoreError::RoomAlreadyExists(_)));
    }

    #[test]
    fn private_room_is_collected_when_last_occupant_leaves() {
        let reg = registry();
        let room = reg.create(PRIVATE_EXCHANGE, 1, Identity::from_display("alice"), "Scratch".into(), 0, 0).unwrap();
        reg.note_join(&room.cookie);
        reg.note_join(&room.cookie);
        reg.note_leave(&room.cookie);
        assert!(reg.lookup(&room.cookie).is_some());
        reg.note_leave(&room.cookie);
        assert!(reg.lookup(&room.cookie).is_none());
    }

    #[test]
    fn public_room_survives_last_occupant_leaving() {
        let reg = registry();
        let room = reg.create(PUBLIC_EXCHANGE, 1, Identity::from_display("alice"), "Lobby".into(), 0, 0).unwrap();
        reg.note_join(&room.cookie);
        reg.note_leave(&room.cookie);
        assert!(reg.lookup(&room.cookie).is_some());
    }
}
