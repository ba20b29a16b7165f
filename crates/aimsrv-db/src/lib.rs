//! # aimsrv-db
//!
//! Persistence for the OSCAR server (`spec.md` §6: "Persistence").
//!
//! This crate owns exactly the operations named in the specification —
//! account CRUD, feedbag read/upsert/delete with modification timestamps,
//! BART blob storage, offline message queueing, chat-room CRUD, profile
//! storage, and ICQ directory search — behind a single [`Repository`]
//! trait. Two implementations are provided: [`memory::InMemoryRepository`]
//! (the default, used in tests and for `memory://` DSNs) and
//! [`sqlite::SqliteRepository`] (`rusqlite`-backed, used for `sqlite://`
//! DSNs).

pub mod memory;
pub mod model;
pub mod schema;
pub mod sqlite;

use aimsrv_wire::screen_name::Identity;
use model::{Account, BartItem, ChatRoomRecord, DirectoryProfile, DirectoryQuery, FeedbagItem, OfflineMessage};

/// Errors surfaced by a [`Repository`] implementation. These map onto the
/// "infrastructure error" class of `spec.md` §7: callers log and respond
/// with a generic service-unavailable SNAC rather than propagating detail
/// to the client.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, RepoError>;

/// Repository operations named in `spec.md` §6. Methods are synchronous —
/// both implementations complete quickly against local storage, and callers
/// (matching the teacher's own `state.db.lock().await` pattern) hold an
/// async-aware lock around the call rather than making the operation itself
/// `async`.
pub trait Repository: Send + Sync {
    // --- Accounts -------------------------------------------------------
    fn create_account(&self, account: Account) -> Result<()>;
    fn get_account(&self, identity: &Identity) -> Result<Option<Account>>;
    fn get_account_by_uin(&self, uin: u32) -> Result<Option<Account>>;
    fn update_password_hash(&self, identity: &Identity, hash: Vec<u8>) -> Result<()>;
    fn update_display_screen_name(&self, identity: &Identity, display: &str) -> Result<()>;
    fn update_email(&self, identity: &Identity, email: &str) -> Result<()>;
    fn set_confirmed(&self, identity: &Identity, confirmed: bool) -> Result<()>;
    fn set_registration_open(&self, identity: &Identity, open: bool) -> Result<()>;

    // --- Profile ----------------------------------------------------------
    fn get_profile(&self, identity: &Identity) -> Result<String>;
    fn set_profile(&self, identity: &Identity, profile: &str) -> Result<()>;

    // --- Feedbag ----------------------------------------------------------
    fn get_feedbag(&self, identity: &Identity) -> Result<Vec<FeedbagItem>>;
    fn upsert_feedbag_items(&self, identity: &Identity, items: Vec<FeedbagItem>) -> Result<u64>;
    fn delete_feedbag_items(&self, identity: &Identity, items: &[(u16, u16)]) -> Result<u64>;
    fn feedbag_last_modified(&self, identity: &Identity) -> Result<u64>;

    // --- BART ---------------------------------------------------------------
    fn put_bart_item(&self, item: BartItem) -> Result<()>;
    fn get_bart_item(&self, item_type: u16, md5: &[u8; 16]) -> Result<Option<BartItem>>;
    fn set_bart_ref(&self, identity: &Identity, item_type: u16, md5: [u8; 16]) -> Result<()>;
    fn get_bart_ref(&self, identity: &Identity, item_type: u16) -> Result<Option<[u8; 16]>>;

    // --- Offline messages ---------------------------------------------------
    fn enqueue_offline_message(&self, msg: OfflineMessage) -> Result<()>;
    fn drain_offline_messages(&self, recipient: &Identity) -> Result<Vec<OfflineMessage>>;
    fn delete_offline_message(&self, id: u64) -> Result<()>;
    fn offline_message_count(&self, recipient: &Identity) -> Result<usize>;

    // --- Chat rooms (public exchanges only) ---------------------------------
    fn create_chat_room(&self, room: ChatRoomRecord) -> Result<()>;
    fn get_chat_room(&self, exchange: u16, cookie: &str) -> Result<Option<ChatRoomRecord>>;
    fn find_chat_room_by_name(&self, exchange: u16, name: &str) -> Result<Option<ChatRoomRecord>>;
    fn list_chat_rooms(&self, exchange: u16) -> Result<Vec<ChatRoomRecord>>;
    fn delete_chat_room(&self, exchange: u16, cookie: &str) -> Result<()>;

    // --- ICQ directory search ------------------------------------------------
    fn set_directory_profile(&self, profile: DirectoryProfile) -> Result<()>;
    fn search_directory(&self, query: &DirectoryQuery) -> Result<Vec<DirectoryProfile>>;
}
