//! Durable entities (`spec.md` §3, `SPEC_FULL.md` §3).

use aimsrv_wire::screen_name::Identity;

/// A registered account. Credential hashing itself is out of scope
/// (`spec.md` §1); the repository only stores and returns the opaque hash
/// bytes produced by whatever scheme the auth food-group uses.
#[derive(Debug, Clone)]
pub struct Account {
    pub identity: Identity,
    pub display_screen_name: String,
    pub password_hash: Vec<u8>,
    pub email: String,
    pub confirmed: bool,
    pub uin: Option<u32>,
    pub created_at: u64,
    pub profile: String,
    pub registration_open: bool,
}

/// A single feedbag (server-side buddy list) entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbagItem {
    pub group_id: u16,
    pub item_id: u16,
    pub class: FeedbagItemClass,
    pub name: String,
    pub data: Vec<u8>,
}

/// The feedbag item classes this server interprets. Unrecognized classes
/// round-trip through the repository as `Other` without the server acting
/// on their contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbagItemClass {
    Group,
    Buddy,
    PermitDenySetting,
    Permit,
    Deny,
    IconRef,
    Preauth,
    Other(u16),
}

impl FeedbagItemClass {
    pub fn from_wire(code: u16) -> Self {
        match code {
            1 => Self::Group,
            0 => Self::Buddy,
            2 => Self::Permit,
            3 => Self::Deny,
            4 => Self::PermitDenySetting,
            20 => Self::IconRef,
            23 => Self::Preauth,
            other => Self::Other(other),
        }
    }

    pub fn to_wire(self) -> u16 {
        match self {
            Self::Buddy => 0,
            Self::Group => 1,
            Self::Permit => 2,
            Self::Deny => 3,
            Self::PermitDenySetting => 4,
            Self::IconRef => 20,
            Self::Preauth => 23,
            Self::Other(code) => code,
        }
    }
}

/// Privacy modes recorded via a `PermitDenySetting` feedbag item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrivacyMode {
    #[default]
    AllowAll,
    DenyAll,
    PermitOnly,
    DenyOnly,
}

/// A persisted chat room. Only rooms in a public exchange are durable
/// (`spec.md` §3); private rooms live solely in the in-memory chat room
/// registry and never reach this repository.
#[derive(Debug, Clone)]
pub struct ChatRoomRecord {
    pub exchange: u16,
    pub cookie: String,
    pub instance: u16,
    pub creator: Identity,
    pub display_name: String,
    pub detail_level: u8,
    pub created_at: u64,
}

/// A queued offline ICBM message (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct OfflineMessage {
    pub id: u64,
    pub sender: Identity,
    pub recipient: Identity,
    pub payload: Vec<u8>,
    pub sent_at: u64,
}

/// A BART (icon/asset) blob, content-addressed by MD5 hash.
#[derive(Debug, Clone)]
pub struct BartItem {
    pub item_type: u16,
    pub md5: [u8; 16],
    pub blob: Vec<u8>,
}

/// The derived, queryable projection of account + profile fields used by
/// ODir search (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, Default)]
pub struct DirectoryProfile {
    pub identity: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub maiden_name: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub nickname: String,
    pub zip: String,
    pub address: String,
    pub interests: Vec<String>,
}

/// A single ODir search criterion. `spec.md` §4.7 requires exactly one of
/// these drive a query.
#[derive(Debug, Clone)]
pub enum DirectoryQuery {
    Email(String),
    Keyword(String),
    NameAndAddress {
        first_name: String,
        last_name: String,
        city: String,
        state: String,
        country: String,
    },
}
