//! SQL schema definition for the SQLite repository.

/// Complete schema for schema version 1. All timestamps are Unix epoch
/// seconds, matching the teacher repository's convention.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    identity TEXT PRIMARY KEY,
    display_screen_name TEXT NOT NULL,
    password_hash BLOB NOT NULL,
    email TEXT NOT NULL DEFAULT '',
    confirmed INTEGER NOT NULL DEFAULT 0,
    uin INTEGER,
    created_at INTEGER NOT NULL,
    profile TEXT NOT NULL DEFAULT '',
    registration_open INTEGER NOT NULL DEFAULT 1
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_uin ON accounts(uin) WHERE uin IS NOT NULL;

CREATE TABLE IF NOT EXISTS feedbag_items (
    owner TEXT NOT NULL REFERENCES accounts(identity) ON DELETE CASCADE,
    group_id INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    class INTEGER NOT NULL,
    name TEXT NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (owner, group_id, item_id)
);

CREATE TABLE IF NOT EXISTS feedbag_meta (
    owner TEXT PRIMARY KEY REFERENCES accounts(identity) ON DELETE CASCADE,
    last_modified INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS bart_blobs (
    item_type INTEGER NOT NULL,
    md5 BLOB NOT NULL,
    blob BLOB NOT NULL,
    PRIMARY KEY (item_type, md5)
);

CREATE TABLE IF NOT EXISTS bart_refs (
    owner TEXT NOT NULL REFERENCES accounts(identity) ON DELETE CASCADE,
    item_type INTEGER NOT NULL,
    md5 BLOB NOT NULL,
    PRIMARY KEY (owner, item_type)
);

CREATE TABLE IF NOT EXISTS offline_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender TEXT NOT NULL,
    recipient TEXT NOT NULL,
    payload BLOB NOT NULL,
    sent_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_offline_recipient ON offline_messages(recipient, sent_at);

CREATE TABLE IF NOT EXISTS chat_rooms (
    exchange INTEGER NOT NULL,
    cookie TEXT NOT NULL,
    instance INTEGER NOT NULL,
    creator TEXT NOT NULL,
    display_name TEXT NOT NULL,
    detail_level INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (exchange, cookie)
);

CREATE TABLE IF NOT EXISTS directory_profiles (
    identity TEXT PRIMARY KEY,
    email TEXT NOT NULL DEFAULT '',
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    middle_name TEXT NOT NULL DEFAULT '',
    maiden_name TEXT NOT NULL DEFAULT '',
    country TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT '',
    nickname TEXT NOT NULL DEFAULT '',
    zip TEXT NOT NULL DEFAULT '',
    address TEXT NOT NULL DEFAULT '',
    interests TEXT NOT NULL DEFAULT ''
);
"#;
