//! In-memory [`Repository`] implementation: the default for tests and for
//! the `memory://` DSN.

use std::collections::HashMap;
use std::sync::Mutex;

use aimsrv_wire::screen_name::Identity;

use crate::model::{Account, BartItem, ChatRoomRecord, DirectoryProfile, DirectoryQuery, FeedbagItem, OfflineMessage};
use crate::{RepoError, Repository, Result};

#[derive(Default)]
struct State {
    accounts: HashMap<Identity, Account>,
    uin_index: HashMap<u32, Identity>,
    feedbags: HashMap<Identity, (Vec<FeedbagItem>, u64)>,
    bart_blobs: HashMap<(u16, [u8; 16]), Vec<u8>>,
    bart_refs: HashMap<(Identity, u16), [u8; 16]>,
    offline: Vec<OfflineMessage>,
    next_offline_id: u64,
    chat_rooms: HashMap<(u16, String), ChatRoomRecord>,
    directory: HashMap<String, DirectoryProfile>,
}

/// Plain in-memory repository. Not persisted across restarts, matching
/// `spec.md` §3's statement that private-exchange rooms and (in this
/// implementation) the whole store exist only while the process runs.
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Repository for InMemoryRepository {
    fn create_account(&self, account: Account) -> Result<()> {
        let mut state = self.lock();
        if state.accounts.contains_key(&account.identity) {
            return Err(RepoError::AlreadyExists(account.identity.to_string()));
        }
        if let Some(uin) = account.uin {
            state.uin_index.insert(uin, account.identity.clone());
        }
        state.accounts.insert(account.identity.clone(), account);
        Ok(())
    }

    fn get_account(&self, identity: &Identity) -> Result<Option<Account>> {
        Ok(self.lock().accounts.get(identity).cloned())
    }

    fn get_account_by_uin(&self, uin: u32) -> Result<Option<Account>> {
        let state = self.lock();
        Ok(state
            .uin_index
            .get(&uin)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    fn update_password_hash(&self, identity: &Identity, hash: Vec<u8>) -> Result<()> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get_mut(identity)
            .ok_or_else(|| RepoError::NotFound(identity.to_string()))?;
        account.password_hash = hash;
        Ok(())
    }

    fn update_display_screen_name(&self, identity: &Identity, display: &str) -> Result<()> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get_mut(identity)
            .ok_or_else(|| RepoError::NotFound(identity.to_string()))?;
        account.display_screen_name = display.to_string();
        Ok(())
    }

    fn update_email(&self, identity: &Identity, email: &str) -> Result<()> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get_mut(identity)
            .ok_or_else(|| RepoError::NotFound(identity.to_string()))?;
        account.email = email.to_string();
        Ok(())
    }

    fn set_confirmed(&self, identity: &Identity, confirmed: bool) -> Result<()> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get_mut(identity)
            .ok_or_else(|| RepoError::NotFound(identity.to_string()))?;
        account.confirmed = confirmed;
        Ok(())
    }

    fn set_registration_open(&self, identity: &Identity, open: bool) -> Result<()> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get_mut(identity)
            .ok_or_else(|| RepoError::NotFound(identity.to_string()))?;
        account.registration_open = open;
        Ok(())
    }

    fn get_profile(&self, identity: &Identity) -> Result<String> {
        Ok(self
            .lock()
            .accounts
            .get(identity)
            .map(|a| a.profile.clone())
            .unwrap_or_default())
    }

    fn set_profile(&self, identity: &Identity, profile: &str) -> Result<()> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get_mut(identity)
            .ok_or_else(|| RepoError::NotFound(identity.to_string()))?;
        account.profile = profile.to_string();
        Ok(())
    }

    fn get_feedbag(&self, identity: &Identity) -> Result<Vec<FeedbagItem>> {
        Ok(self
            .lock()
            .feedbags
            .get(identity)
            .map(|(items, _)| items.clone())
            .unwrap_or_default())
    }

    fn upsert_feedbag_items(&self, identity: &Identity, items: Vec<FeedbagItem>) -> Result<u64> {
        let mut state = self.lock();
        let entry = state.feedbags.entry(identity.clone()).or_insert_with(|| (Vec::new(), 0));
        for item in items {
            if let Some(existing) = entry
                .0
                .iter_mut()
                .find(|i| i.group_id == item.group_id && i.item_id == item.item_id)
            {
                *existing = item;
            } else {
                entry.0.push(item);
            }
        }
        entry.1 = now();
        Ok(entry.1)
    }

    fn delete_feedbag_items(&self, identity: &Identity, items: &[(u16, u16)]) -> Result<u64> {
        let mut state = self.lock();
        let entry = state.feedbags.entry(identity.clone()).or_insert_with(|| (Vec::new(), 0));
        entry.0.retain(|i| !items.contains(&(i.group_id, i.item_id)));
        entry.1 = now();
        Ok(entry.1)
    }

    fn feedbag_last_modified(&self, identity: &Identity) -> Result<u64> {
        Ok(self.lock().feedbags.get(identity).map(|(_, ts)| *ts).unwrap_or(0))
    }

    fn put_bart_item(&self, item: BartItem) -> Result<()> {
        self.lock().bart_blobs.insert((item.item_type, item.md5), item.blob);
        Ok(())
    }

    fn get_bart_item(&self, item_type: u16, md5: &[u8; 16]) -> Result<Option<BartItem>> {
        Ok(self
            .lock()
            .bart_blobs
            .get(&(item_type, *md5))
            .map(|blob| BartItem {
                item_type,
                md5: *md5,
                blob: blob.clone(),
            }))
    }

    fn set_bart_ref(&self, identity: &Identity, item_type: u16, md5: [u8; 16]) -> Result<()> {
        self.lock().bart_refs.insert((identity.clone(), item_type), md5);
        Ok(())
    }

    fn get_bart_ref(&self, identity: &Identity, item_type: u16) -> Result<Option<[u8; 16]>> {
        Ok(self.lock().bart_refs.get(&(identity.clone(), item_type)).copied())
    }

    fn enqueue_offline_message(&self, mut msg: OfflineMessage) -> Result<()> {
        let mut state = self.lock();
        state.next_offline_id += 1;
        msg.id = state.next_offline_id;
        state.offline.push(msg);
        Ok(())
    }

    fn drain_offline_messages(&self, recipient: &Identity) -> Result<Vec<OfflineMessage>> {
        let state = self.lock();
        let mut msgs: Vec<OfflineMessage> = state.offline.iter().filter(|m| &m.recipient == recipient).cloned().collect();
        msgs.sort_by_key(|m| m.sent_at);
        Ok(msgs)
    }

    fn delete_offline_message(&self, id: u64) -> Result<()> {
        self.lock().offline.retain(|m| m.id != id);
        Ok(())
    }

    fn offline_message_count(&self, recipient: &Identity) -> Result<usize> {
        Ok(self.lock().offline.iter().filter(|m| &m.recipient == recipient).count())
    }

    fn create_chat_room(&self, room: ChatRoomRecord) -> Result<()> {
        let mut state = self.lock();
        let key = (room.exchange, room.cookie.clone());
        if state.chat_rooms.contains_key(&key) {
            return Err(RepoError::AlreadyExists(room.cookie));
        }
        state.chat_rooms.insert(key, room);
        Ok(())
    }

    fn get_chat_room(&self, exchange: u16, cookie: &str) -> Result<Option<ChatRoomRecord>> {
        Ok(self.lock().chat_rooms.get(&(exchange, cookie.to_string())).cloned())
    }

    fn find_chat_room_by_name(&self, exchange: u16, name: &str) -> Result<Option<ChatRoomRecord>> {
        Ok(self
            .lock()
            .chat_rooms
            .values()
            .find(|r| r.exchange == exchange && r.display_name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn list_chat_rooms(&self, exchange: u16) -> Result<Vec<ChatRoomRecord>> {
        Ok(self.lock().chat_rooms.values().filter(|r| r.exchange == exchange).cloned().collect())
    }

    fn delete_chat_room(&self, exchange: u16, cookie: &str) -> Result<()> {
        self.lock().chat_rooms.remove(&(exchange, cookie.to_string()));
        Ok(())
    }

    fn set_directory_profile(&self, profile: DirectoryProfile) -> Result<()> {
        self.lock().directory.insert(profile.identity.clone(), profile);
        Ok(())
    }

    fn search_directory(&self, query: &DirectoryQuery) -> Result<Vec<DirectoryProfile>> {
        let state = self.lock();
        let matches = state
            .directory
            .values()
            .filter(|p| match query {
                DirectoryQuery::Email(email) => p.email.eq_ignore_ascii_case(email),
                DirectoryQuery::Keyword(kw) => p.interests.iter().any(|i| i.eq_ignore_ascii_case(kw)),
                DirectoryQuery::NameAndAddress {
                    first_name,
                    last_name,
                    city,
                    state: st,
                    country,
                } => {
                    (first_name.is_empty() || p.first_name.eq_ignore_ascii_case(first_name))
                        && (last_name.is_empty() || p.last_name.eq_ignore_ascii_case(last_name))
                        && (city.is_empty() || p.city.eq_ignore_ascii_case(city))
                        && (st.is_empty() || p.state.eq_ignore_ascii_case(st))
                        && (country.is_empty() || p.country.eq_ignore_ascii_case(country))
                }
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(s: &str) -> Identity {
        Identity::from_display(s)
    }

    fn account(name: &str) -> Account {
        Account {
            identity: identity(name),
            display_screen_name: name.to_string(),
            password_hash: vec![],
            email: format!("{name}@example.com"),
            confirmed: false,
            uin: None,
            created_at: 0,
            profile: String::new(),
            registration_open: true,
        }
    }

    #[test]
    fn create_and_fetch_account() {
        let repo = InMemoryRepository::new();
        repo.create_account(account("Alice")).unwrap();
        let fetched = repo.get_account(&identity("alice")).unwrap().unwrap();
        assert_eq!(fetched.display_screen_name, "Alice");
    }

    #[test]
    fn duplicate_account_rejected() {
        let repo = InMemoryRepository::new();
        repo.create_account(account("Alice")).unwrap();
        assert!(matches!(repo.create_account(account("alice")), Err(RepoError::AlreadyExists(_))));
    }

    #[test]
    fn feedbag_upsert_tracks_last_modified() {
        let repo = InMemoryRepository::new();
        let id = identity("alice");
        let before = repo.feedbag_last_modified(&id).unwrap();
        assert_eq!(before, 0);
        repo.upsert_feedbag_items(
            &id,
            vec![FeedbagItem {
                group_id: 1,
                item_id: 1,
                class: crate::model::FeedbagItemClass::Buddy,
                name: "Bob".to_string(),
                data: vec![],
            }],
        )
        .unwrap();
        assert!(repo.feedbag_last_modified(&id).unwrap() > 0);
        assert_eq!(repo.get_feedbag(&id).unwrap().len(), 1);
    }

    #[test]
    fn offline_messages_drain_in_send_order() {
        let repo = InMemoryRepository::new();
        let alice = identity("alice");
        let bob = identity("bob");
        repo.enqueue_offline_message(OfflineMessage {
            id: 0,
            sender: alice.clone(),
            recipient: bob.clone(),
            payload: b"first".to_vec(),
            sent_at: 100,
        })
        .unwrap();
        repo.enqueue_offline_message(OfflineMessage {
            id: 0,
            sender: alice,
            recipient: bob.clone(),
            payload: b"second".to_vec(),
            sent_at: 50,
        })
        .unwrap();
        let drained = repo.drain_offline_messages(&bob).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload, b"second");
        assert_eq!(drained[1].payload, b"first");
    }

    #[test]
    fn chat_room_round_trip() {
        let repo = InMemoryRepository::new();
        repo.create_chat_room(ChatRoomRecord {
            exchange: 4,
            cookie: "4-1-lobby".to_string(),
            instance: 1,
            creator: identity("alice"),
            display_name: "Lobby".to_string(),
            detail_level: 2,
            created_at: 0,
        })
        .unwrap();
        assert!(repo.get_chat_room(4, "4-1-lobby").unwrap().is_some());
        repo.delete_chat_room(4, "4-1-lobby").unwrap();
        assert!(repo.get_chat_room(4, "4-1-lobby").unwrap().is_none());
    }
}
