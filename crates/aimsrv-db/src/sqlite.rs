//! SQLite-backed [`Repository`] implementation.

use std::path::Path;
use std::sync::Mutex;

use aimsrv_wire::screen_name::Identity;
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{Account, BartItem, ChatRoomRecord, DirectoryProfile, DirectoryQuery, FeedbagItem, FeedbagItemClass, OfflineMessage};
use crate::{schema, RepoError, Repository, Result};

/// Current schema version, tracked in `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 1;

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current == 0 {
        tracing::info!("initializing aimsrv database schema v{SCHEMA_VERSION}");
        conn.execute_batch(schema::SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    } else if current > SCHEMA_VERSION {
        return Err(RepoError::Unavailable(format!(
            "database schema v{current} is newer than supported v{SCHEMA_VERSION}"
        )));
    }
    Ok(())
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Repository for SqliteRepository {
    fn create_account(&self, account: Account) -> Result<()> {
        let conn = self.lock();
        let inserted = conn.execute(
            "INSERT INTO accounts (identity, display_screen_name, password_hash, email, confirmed, uin, created_at, profile, registration_open)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                account.identity.as_str(),
                account.display_screen_name,
                account.password_hash,
                account.email,
                account.confirmed as i64,
                account.uin,
                account.created_at as i64,
                account.profile,
                account.registration_open as i64,
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(RepoError::AlreadyExists(account.identity.to_string()))
            }
            Err(e) => Err(RepoError::Sqlite(e)),
        }
    }

    fn get_account(&self, identity: &Identity) -> Result<Option<Account>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT identity, display_screen_name, password_hash, email, confirmed, uin, created_at, profile, registration_open
                 FROM accounts WHERE identity = ?1",
                params![identity.as_str()],
                row_to_account,
            )
            .optional()?;
        Ok(row)
    }

    fn get_account_by_uin(&self, uin: u32) -> Result<Option<Account>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT identity, display_screen_name, password_hash, email, confirmed, uin, created_at, profile, registration_open
                 FROM accounts WHERE uin = ?1",
                params![uin],
                row_to_account,
            )
            .optional()?;
        Ok(row)
    }

    fn update_password_hash(&self, identity: &Identity, hash: Vec<u8>) -> Result<()> {
        let n = self.lock().execute(
            "UPDATE accounts SET password_hash = ?1 WHERE identity = ?2",
            params![hash, identity.as_str()],
        )?;
        require_updated(n, identity)
    }

    fn update_display_screen_name(&self, identity: &Identity, display: &str) -> Result<()> {
        let n = self.lock().execute(
            "UPDATE accounts SET display_screen_name = ?1 WHERE identity = ?2",
            params![display, identity.as_str()],
        )?;
        require_updated(n, identity)
    }

    fn update_email(&self, identity: &Identity, email: &str) -> Result<()> {
        let n = self.lock().execute(
            "UPDATE accounts SET email = ?1 WHERE identity = ?2",
            params![email, identity.as_str()],
        )?;
        require_updated(n, identity)
    }

    fn set_confirmed(&self, identity: &Identity, confirmed: bool) -> Result<()> {
        let n = self.lock().execute(
            "UPDATE accounts SET confirmed = ?1 WHERE identity = ?2",
            params![confirmed as i64, identity.as_str()],
        )?;
        require_updated(n, identity)
    }

    fn set_registration_open(&self, identity: &Identity, open: bool) -> Result<()> {
        let n = self.lock().execute(
            "UPDATE accounts SET registration_open = ?1 WHERE identity = ?2",
            params![open as i64, identity.as_str()],
        )?;
        require_updated(n, identity)
    }

    fn get_profile(&self, identity: &Identity) -> Result<String> {
        let conn = self.lock();
        let profile = conn
            .query_row(
                "SELECT profile FROM accounts WHERE identity = ?1",
                params![identity.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(profile.unwrap_or_default())
    }

    fn set_profile(&self, identity: &Identity, profile: &str) -> Result<()> {
        let n = self.lock().execute(
            "UPDATE accounts SET profile = ?1 WHERE identity = ?2",
            params![profile, identity.as_str()],
        )?;
        require_updated(n, identity)
    }

    fn get_feedbag(&self, identity: &Identity) -> Result<Vec<FeedbagItem>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT group_id, item_id, class, name, data FROM feedbag_items WHERE owner = ?1 ORDER BY group_id, item_id",
        )?;
        let rows = stmt.query_map(params![identity.as_str()], |row| {
            Ok(FeedbagItem {
                group_id: row.get::<_, i64>(0)? as u16,
                item_id: row.get::<_, i64>(1)? as u16,
                class: FeedbagItemClass::from_wire(row.get::<_, i64>(2)? as u16),
                name: row.get(3)?,
                data: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(RepoError::from)
    }

    fn upsert_feedbag_items(&self, identity: &Identity, items: Vec<FeedbagItem>) -> Result<u64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for item in &items {
            tx.execute(
                "INSERT INTO feedbag_items (owner, group_id, item_id, class, name, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(owner, group_id, item_id) DO UPDATE SET class = excluded.class, name = excluded.name, data = excluded.data",
                params![identity.as_str(), item.group_id, item.item_id, item.class.to_wire(), item.name, item.data],
            )?;
        }
        let ts = now();
        tx.execute(
            "INSERT INTO feedbag_meta (owner, last_modified) VALUES (?1, ?2)
             ON CONFLICT(owner) DO UPDATE SET last_modified = excluded.last_modified",
            params![identity.as_str(), ts],
        )?;
        tx.commit()?;
        Ok(ts as u64)
    }

    fn delete_feedbag_items(&self, identity: &Identity, items: &[(u16, u16)]) -> Result<u64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for (group_id, item_id) in items {
            tx.execute(
                "DELETE FROM feedbag_items WHERE owner = ?1 AND group_id = ?2 AND item_id = ?3",
                params![identity.as_str(), group_id, item_id],
            )?;
        }
        let ts = now();
        tx.execute(
            "INSERT INTO feedbag_meta (owner, last_modified) VALUES (?1, ?2)
             ON CONFLICT(owner) DO UPDATE SET last_modified = excluded.last_modified",
            params![identity.as_str(), ts],
        )?;
        tx.commit()?;
        Ok(ts as u64)
    }

    fn feedbag_last_modified(&self, identity: &Identity) -> Result<u64> {
        let conn = self.lock();
        let ts = conn
            .query_row(
                "SELECT last_modified FROM feedbag_meta WHERE owner = ?1",
                params![identity.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(ts.unwrap_or(0) as u64)
    }

    fn put_bart_item(&self, item: BartItem) -> Result<()> {
        self.lock().execute(
            "INSERT INTO bart_blobs (item_type, md5, blob) VALUES (?1, ?2, ?3)
             ON CONFLICT(item_type, md5) DO UPDATE SET blob = excluded.blob",
            params![item.item_type, item.md5.as_slice(), item.blob],
        )?;
        Ok(())
    }

    fn get_bart_item(&self, item_type: u16, md5: &[u8; 16]) -> Result<Option<BartItem>> {
        let conn = self.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT blob FROM bart_blobs WHERE item_type = ?1 AND md5 = ?2",
                params![item_type, md5.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|blob| BartItem {
            item_type,
            md5: *md5,
            blob,
        }))
    }

    fn set_bart_ref(&self, identity: &Identity, item_type: u16, md5: [u8; 16]) -> Result<()> {
        self.lock().execute(
            "INSERT INTO bart_refs (owner, item_type, md5) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner, item_type) DO UPDATE SET md5 = excluded.md5",
            params![identity.as_str(), item_type, md5.as_slice()],
        )?;
        Ok(())
    }

    fn get_bart_ref(&self, identity: &Identity, item_type: u16) -> Result<Option<[u8; 16]>> {
        let conn = self.lock();
        let md5: Option<Vec<u8>> = conn
            .query_row(
                "SELECT md5 FROM bart_refs WHERE owner = ?1 AND item_type = ?2",
                params![identity.as_str(), item_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(md5.map(|v| {
            let mut out = [0u8; 16];
            out.copy_from_slice(&v[..16.min(v.len())]);
            out
        }))
    }

    fn enqueue_offline_message(&self, msg: OfflineMessage) -> Result<()> {
        self.lock().execute(
            "INSERT INTO offline_messages (sender, recipient, payload, sent_at) VALUES (?1, ?2, ?3, ?4)",
            params![msg.sender.as_str(), msg.recipient.as_str(), msg.payload, msg.sent_at as i64],
        )?;
        Ok(())
    }

    fn drain_offline_messages(&self, recipient: &Identity) -> Result<Vec<OfflineMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, sender, recipient, payload, sent_at FROM offline_messages WHERE recipient = ?1 ORDER BY sent_at",
        )?;
        let rows = stmt.query_map(params![recipient.as_str()], |row| {
            Ok(OfflineMessage {
                id: row.get::<_, i64>(0)? as u64,
                sender: Identity::from_display(&row.get::<_, String>(1)?),
                recipient: Identity::from_display(&row.get::<_, String>(2)?),
                payload: row.get(3)?,
                sent_at: row.get::<_, i64>(4)? as u64,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(RepoError::from)
    }

    fn delete_offline_message(&self, id: u64) -> Result<()> {
        self.lock().execute("DELETE FROM offline_messages WHERE id = ?1", params![id as i64])?;
        Ok(())
    }

    fn offline_message_count(&self, recipient: &Identity) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM offline_messages WHERE recipient = ?1",
            params![recipient.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn create_chat_room(&self, room: ChatRoomRecord) -> Result<()> {
        let inserted = self.lock().execute(
            "INSERT INTO chat_rooms (exchange, cookie, instance, creator, display_name, detail_level, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                room.exchange,
                room.cookie,
                room.instance,
                room.creator.as_str(),
                room.display_name,
                room.detail_level,
                room.created_at as i64,
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(RepoError::AlreadyExists(room.cookie))
            }
            Err(e) => Err(RepoError::Sqlite(e)),
        }
    }

    fn get_chat_room(&self, exchange: u16, cookie: &str) -> Result<Option<ChatRoomRecord>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT exchange, cookie, instance, creator, display_name, detail_level, created_at
             FROM chat_rooms WHERE exchange = ?1 AND cookie = ?2",
            params![exchange, cookie],
            row_to_room,
        )
        .optional()
        .map_err(RepoError::from)
    }

    fn find_chat_room_by_name(&self, exchange: u16, name: &str) -> Result<Option<ChatRoomRecord>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT exchange, cookie, instance, creator, display_name, detail_level, created_at
             FROM chat_rooms WHERE exchange = ?1 AND display_name = ?2 COLLATE NOCASE",
            params![exchange, name],
            row_to_room,
        )
        .optional()
        .map_err(RepoError::from)
    }

    fn list_chat_rooms(&self, exchange: u16) -> Result<Vec<ChatRoomRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT exchange, cookie, instance, creator, display_name, detail_level, created_at
             FROM chat_rooms WHERE exchange = ?1",
        )?;
        let rows = stmt.query_map(params![exchange], row_to_room)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(RepoError::from)
    }

    fn delete_chat_room(&self, exchange: u16, cookie: &str) -> Result<()> {
        self.lock().execute(
            "DELETE FROM chat_rooms WHERE exchange = ?1 AND cookie = ?2",
            params![exchange, cookie],
        )?;
        Ok(())
    }

    fn set_directory_profile(&self, profile: DirectoryProfile) -> Result<()> {
        self.lock().execute(
            "INSERT INTO directory_profiles (identity, email, first_name, last_name, middle_name, maiden_name, country, state, city, nickname, zip, address, interests)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(identity) DO UPDATE SET email=excluded.email, first_name=excluded.first_name, last_name=excluded.last_name,
                middle_name=excluded.middle_name, maiden_name=excluded.maiden_name, country=excluded.country, state=excluded.state,
                city=excluded.city, nickname=excluded.nickname, zip=excluded.zip, address=excluded.address, interests=excluded.interests",
            params![
                profile.identity,
                profile.email,
                profile.first_name,
                profile.last_name,
                profile.middle_name,
                profile.maiden_name,
                profile.country,
                profile.state,
                profile.city,
                profile.nickname,
                profile.zip,
                profile.address,
                profile.interests.join(","),
            ],
        )?;
        Ok(())
    }

    fn search_directory(&self, query: &DirectoryQuery) -> Result<Vec<DirectoryProfile>> {
        let conn = self.lock();
        let (sql, like): (&str, String) = match query {
            DirectoryQuery::Email(email) => ("SELECT * FROM directory_profiles WHERE email = ?1", email.clone()),
            DirectoryQuery::Keyword(kw) => (
                "SELECT * FROM directory_profiles WHERE ',' || interests || ',' LIKE '%,' || ?1 || ',%'",
                kw.clone(),
            ),
            DirectoryQuery::NameAndAddress { .. } => {
                return self.search_directory_by_name_and_address(query);
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![like], row_to_profile)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(RepoError::from)
    }
}

impl SqliteRepository {
    fn search_directory_by_name_and_address(&self, query: &DirectoryQuery) -> Result<Vec<DirectoryProfile>> {
        let DirectoryQuery::NameAndAddress { first_name, last_name, city, state, country } = query else {
            unreachable!("caller guarantees NameAndAddress variant")
        };
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM directory_profiles WHERE
                (?1 = '' OR first_name = ?1) AND (?2 = '' OR last_name = ?2)
                AND (?3 = '' OR city = ?3) AND (?4 = '' OR state = ?4) AND (?5 = '' OR country = ?5)",
        )?;
        let rows = stmt.query_map(params![first_name, last_name, city, state, country], row_to_profile)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(RepoError::from)
    }
}

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    Ok(Account {
        identity: Identity::from_display(&row.get::<_, String>(0)?),
        display_screen_name: row.get(1)?,
        password_hash: row.get(2)?,
        email: row.get(3)?,
        confirmed: row.get::<_, i64>(4)? != 0,
        uin: row.get::<_, Option<i64>>(5)?.map(|v| v as u32),
        created_at: row.get::<_, i64>(6)? as u64,
        profile: row.get(7)?,
        registration_open: row.get::<_, i64>(8)? != 0,
    })
}

fn row_to_room(row: &rusqlite::Row) -> rusqlite::Result<ChatRoomRecord> {
    Ok(ChatRoomRecord {
        exchange: row.get::<_, i64>(0)? as u16,
        cookie: row.get(1)?,
        instance: row.get::<_, i64>(2)? as u16,
        creator: Identity::from_display(&row.get::<_, String>(3)?),
        display_name: row.get(4)?,
        detail_level: row.get::<_, i64>(5)? as u8,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<DirectoryProfile> {
    let interests: String = row.get("interests")?;
    Ok(DirectoryProfile {
        identity: row.get("identity")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        middle_name: row.get("middle_name")?,
        maiden_name: row.get("maiden_name")?,
        country: row.get("country")?,
        state: row.get("state")?,
        city: row.get("city")?,
        nickname: row.get("nickname")?,
        zip: row.get("zip")?,
        address: row.get("address")?,
        interests: interests.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
    })
}

fn require_updated(rows_changed: usize, identity: &Identity) -> Result<()> {
    if rows_changed == 0 {
        Err(RepoError::NotFound(identity.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> Account {
        Account {
            identity: Identity::from_display(name),
            display_screen_name: name.to_string(),
            password_hash: vec![1, 2, 3],
            email: format!("{name}@example.com"),
            confirmed: false,
            uin: None,
            created_at: 0,
            profile: String::new(),
            registration_open: true,
        }
    }

    #[test]
    fn create_and_fetch_round_trip() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.create_account(account("Alice")).unwrap();
        let fetched = repo.get_account(&Identity::from_display("alice")).unwrap().unwrap();
        assert_eq!(fetched.display_screen_name, "Alice");
        assert_eq!(fetched.password_hash, vec![1, 2, 3]);
    }

    #[test]
    fn feedbag_upsert_then_delete() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.create_account(account("alice")).unwrap();
        let id = Identity::from_display("alice");
        repo.upsert_feedbag_items(
            &id,
            vec![FeedbagItem {
                group_id: 1,
                item_id: 1,
                class: FeedbagItemClass::Buddy,
                name: "Bob".to_string(),
                data: vec![],
            }],
        )
        .unwrap();
        assert_eq!(repo.get_feedbag(&id).unwrap().len(), 1);
        repo.delete_feedbag_items(&id, &[(1, 1)]).unwrap();
        assert!(repo.get_feedbag(&id).unwrap().is_empty());
    }

    #[test]
    fn schema_version_persists_across_reopen() {
        let conn = Connection::open_in_memory().unwrap();
        configure(&conn).unwrap();
        migrate(&conn).unwrap();
        let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
