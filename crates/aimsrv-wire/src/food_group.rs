//! Food-group and subgroup numeric constants (`spec.md` §2, glossary).
//!
//! These are the stable (food-group, subgroup) pairs this server
//! implements. The rate-limit governor's SNAC→class mapping and the
//! dispatcher's routing table are both keyed on these constants, so they
//! live in one place shared by every crate that needs them.

/// Subgroup 0x01 means "error reply" within any food group (`spec.md`
/// §4.6 step 4).
pub const ERROR_SUBGROUP: u16 = 0x01;

pub mod group {
    pub const OSERVICE: u16 = 0x01;
    pub const LOCATE: u16 = 0x02;
    pub const BUDDY: u16 = 0x03;
    pub const ICBM: u16 = 0x04;
    pub const ADVERT: u16 = 0x05;
    pub const INVITE: u16 = 0x06;
    pub const ADMIN: u16 = 0x07;
    pub const POPUP: u16 = 0x08;
    pub const PERMIT_DENY: u16 = 0x09;
    pub const USER_LOOKUP: u16 = 0x0A;
    pub const STATS: u16 = 0x0B;
    pub const TRANSLATE: u16 = 0x0C;
    pub const CHAT_NAV: u16 = 0x0D;
    pub const CHAT: u16 = 0x0E;
    pub const ODIR: u16 = 0x0F;
    pub const BART: u16 = 0x10;
    pub const FEEDBAG: u16 = 0x13;
    pub const ICQ: u16 = 0x15;
    pub const BUCP: u16 = 0x17;
    pub const ALERT: u16 = 0x18;
}

pub mod oservice {
    pub const ERROR: u16 = 0x01;
    pub const CLIENT_ONLINE: u16 = 0x02;
    pub const HOST_ONLINE: u16 = 0x03;
    pub const SERVICE_REQUEST: u16 = 0x04;
    pub const SERVICE_RESPONSE: u16 = 0x05;
    pub const RATE_PARAMS_QUERY: u16 = 0x06;
    pub const RATE_PARAMS_REPLY: u16 = 0x07;
    pub const RATE_PARAMS_SUB_ADD: u16 = 0x08;
    pub const RATE_PARAM_CHANGE: u16 = 0x0A;
    pub const USER_INFO_QUERY: u16 = 0x0B;
    pub const USER_INFO_UPDATE: u16 = 0x0C;
    pub const IDLE_NOTIFICATION: u16 = 0x11;
    pub const CLIENT_VERSIONS: u16 = 0x17;
    pub const HOST_VERSIONS: u16 = 0x18;
    pub const SET_USER_INFO_FIELDS: u16 = 0x1E;
}

pub mod buddy {
    pub const RIGHTS_QUERY: u16 = 0x02;
    pub const RIGHTS_REPLY: u16 = 0x03;
    pub const ADD_BUDDIES: u16 = 0x04;
    pub const DEL_BUDDIES: u16 = 0x05;
    pub const ARRIVED: u16 = 0x0B;
    pub const DEPARTED: u16 = 0x0C;
}

pub mod icbm {
    pub const CHANNEL_MSG_TO_HOST: u16 = 0x06;
    pub const CHANNEL_MSG_TO_CLIENT: u16 = 0x07;
    pub const EVIL_REQUEST: u16 = 0x08;
    pub const EVIL_REPLY: u16 = 0x09;
    pub const MISSED_CALLS: u16 = 0x0A;
    pub const HOST_ACK: u16 = 0x0C;
    pub const CLIENT_EVENT: u16 = 0x14;
}

pub mod chat {
    pub const ROOM_INFO_UPDATE: u16 = 0x02;
    pub const USERS_JOINED: u16 = 0x03;
    pub const USERS_LEFT: u16 = 0x04;
    pub const CHANNEL_MSG_TO_HOST: u16 = 0x05;
    pub const CHANNEL_MSG_TO_CLIENT: u16 = 0x06;
}

pub mod chat_nav {
    pub const REQUEST_CHAT_RIGHTS: u16 = 0x02;
    pub const REQUEST_EXCHANGE_INFO: u16 = 0x03;
    pub const REQUEST_ROOM_INFO: u16 = 0x04;
    pub const CREATE_ROOM: u16 = 0x08;
    pub const NAV_REPLY: u16 = 0x09;
}

pub mod feedbag {
    pub const RIGHTS_QUERY: u16 = 0x02;
    pub const RIGHTS_REPLY: u16 = 0x03;
    pub const QUERY: u16 = 0x04;
    pub const REPLY: u16 = 0x06;
    pub const INSERT_ITEM: u16 = 0x08;
    pub const UPDATE_ITEM: u16 = 0x09;
    pub const DELETE_ITEM: u16 = 0x0A;
    pub const STATUS: u16 = 0x0E;
}

pub mod bart {
    pub const UPSERT_ITEM: u16 = 0x02;
    pub const UPSERT_REPLY: u16 = 0x03;
    pub const RETRIEVE_ITEM: u16 = 0x04;
    pub const RETRIEVE_REPLY: u16 = 0x05;
}

pub mod admin {
    pub const INFO_CHANGE_REQUEST: u16 = 0x04;
    pub const INFO_CHANGE_REPLY: u16 = 0x05;
    pub const CONFIRM_REQUEST: u16 = 0x06;
    pub const CONFIRM_REPLY: u16 = 0x07;
}

pub mod odir {
    pub const INFO_QUERY: u16 = 0x02;
    pub const SEARCH_QUERY: u16 = 0x03;
    pub const SEARCH_REPLY: u16 = 0x04;
}

pub mod permit_deny {
    pub const RIGHTS_QUERY: u16 = 0x02;
    pub const RIGHTS_REPLY: u16 = 0x03;
    pub const ADD_PERMIT: u16 = 0x05;
    pub const DEL_PERMIT: u16 = 0x06;
    pub const ADD_DENY: u16 = 0x07;
    pub const DEL_DENY: u16 = 0x08;
}

pub mod icq {
    pub const META_REQUEST: u16 = 0x02;
    pub const META_REPLY: u16 = 0x03;
}

pub mod alert {
    pub const NOTIFY_REQUEST: u16 = 0x02;
}

pub mod user_lookup {
    pub const FIND_BY_EMAIL: u16 = 0x02;
    pub const FIND_REPLY: u16 = 0x03;
}

/// BUCP (auth-service) subgroups. Credential verification itself is out of
/// scope (`spec.md` §1); this food group only exchanges a screen name for a
/// service-dispatch cookie to the BOS service.
pub mod bucp {
    pub const LOGIN_REQUEST: u16 = 0x02;
    pub const LOGIN_RESPONSE: u16 = 0x03;
}

/// Service-dispatch cookie tags (`spec.md` §4.8) for services that are not
/// themselves a single food group. Per-food-group service handoffs (Chat,
/// ChatNav, BART, Admin, Alert, ODir) use the requested food group's own
/// constant as the tag instead.
pub mod service_code {
    pub const BOS: u16 = 0x0100;
}

/// SNAC-level error codes (`spec.md` §7, "business"/"protocol" errors).
pub mod error_code {
    pub const NOT_SUPPORTED_BY_HOST: u16 = 0x01;
    pub const SERVICE_UNAVAILABLE: u16 = 0x13;
    pub const NO_SUCH_USER: u16 = 0x04;
    pub const INVALID_SNAC: u16 = 0x02;
    pub const INSUFFICIENT_RIGHTS: u16 = 0x1A;
    pub const NOT_FOUND: u16 = 0x14;
    pub const INVALID_NICKNAME_LENGTH: u16 = 0x06;
    pub const RATE_LIMITED: u16 = 0x0A;
}
