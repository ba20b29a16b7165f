//! Per-connection session state (`spec.md` §4.2).
//!
//! A `Session` is created by the registry on authenticated connect and is
//! jointly referenced by its read loop, its write loop, the registry, and
//! any recipient lists it appears on. Only the owning read loop mutates
//! "business" state; every other holder goes through the methods here,
//! which serialize access behind a per-session lock.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::Snac;
use aimsrv_wire::tlv::Tlv;
use tokio::sync::mpsc;

use crate::rate::{Evaluation, RateBuckets, RateClass};

/// Bound on a session's outbound SNAC queue (`spec.md` §4.2).
pub const OUTBOX_CAPACITY: usize = 256;

/// Warning level decays linearly at this rate (`SPEC_FULL.md` §4,
/// resolving the decay-formula Open Question from `spec.md` §9).
pub const WARNING_DECAY_SECONDS_PER_POINT: u64 = 90;

pub const MAX_WARNING_LEVEL: u16 = 1000;

/// User-info TLV tags used by [`Session::user_info_snapshot`].
pub mod info_tag {
    pub const SCREEN_NAME: u16 = 0x01;
    pub const WARNING_LEVEL: u16 = 0x02;
    pub const CLASS_FLAGS: u16 = 0x06;
    pub const SIGNON_TIME: u16 = 0x03;
    pub const IDLE_MINUTES: u16 = 0x04;
    pub const CAPABILITIES: u16 = 0x0D;
    pub const ICON_HASH: u16 = 0x1D;
}

/// Class flag bits used in the TLV 0x06 bitmask.
pub mod class_flag {
    pub const UNCONFIRMED: u16 = 0x0001;
    pub const AWAY: u16 = 0x0020;
    pub const ICQ: u16 = 0x0040;
    pub const INVISIBLE: u16 = 0x0100;
}

/// An item enqueued on a session's outbox. Almost always a SNAC; `Close`
/// lets the relay/registry ask the write loop to finish and the connection
/// to be torn down without fabricating a SNAC to carry that intent.
#[derive(Debug, Clone)]
pub enum Outbound {
    Snac(Snac),
    Close,
}

#[derive(Debug)]
struct SessionState {
    display_screen_name: String,
    uin: Option<u32>,
    warning_level: u16,
    warning_updated_at: u64,
    idle_since: Option<u64>,
    invisible: bool,
    sign_on_complete: bool,
    away_message: Option<String>,
    capabilities: Vec<[u8; 16]>,
    food_group_versions: std::collections::HashMap<u16, u16>,
    chat_room_cookie: Option<String>,
    subscribed_rate_classes: HashSet<u16>,
    icon_hash: Option<[u8; 16]>,
    /// Buddies added via the legacy (pre-feedbag) Buddy food-group during
    /// this session, not persisted (`spec.md` §4.5, §4.7).
    legacy_buddies: HashSet<Identity>,
}

static DEFAULT_RATE_CLASSES: std::sync::OnceLock<Vec<RateClass>> = std::sync::OnceLock::new();

fn default_rate_classes() -> &'static [RateClass] {
    DEFAULT_RATE_CLASSES.get_or_init(crate::rate::default_classes)
}

/// A live connection's volatile state plus its outbound message channel.
#[derive(Debug)]
pub struct Session {
    pub identity: Identity,
    pub remote_addr: SocketAddr,
    pub signon_time: u64,
    state: Mutex<SessionState>,
    sender: mpsc::Sender<Outbound>,
    receiver: Mutex<Option<mpsc::Receiver<Outbound>>>,
    closed: AtomicBool,
    rate: RateBuckets,
}

impl Session {
    /// Builds a session using the process-wide default rate-class table.
    /// Use [`Session::with_rate_classes`] when the engine's own leaked
    /// table should drive rate accounting instead.
    pub fn new(identity: Identity, display_screen_name: String, uin: Option<u32>, remote_addr: SocketAddr, now: u64) -> Self {
        Self::with_rate_classes(identity, display_screen_name, uin, remote_addr, now, default_rate_classes())
    }

    pub fn with_rate_classes(
        identity: Identity,
        display_screen_name: String,
        uin: Option<u32>,
        remote_addr: SocketAddr,
        now: u64,
        rate_classes: &'static [RateClass],
    ) -> Self {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        Self {
            identity,
            remote_addr,
            signon_time: now,
            state: Mutex::new(SessionState {
                display_screen_name,
                uin,
                warning_level: 0,
                warning_updated_at: now,
                idle_since: None,
                invisible: false,
                sign_on_complete: false,
                away_message: None,
                capabilities: Vec::new(),
                food_group_versions: std::collections::HashMap::new(),
                chat_room_cookie: None,
                subscribed_rate_classes: HashSet::new(),
                icon_hash: None,
                legacy_buddies: HashSet::new(),
            }),
            sender: tx,
            receiver: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
            rate: RateBuckets::new(rate_classes),
        }
    }

    /// Charges an incoming SNAC's class bucket (`spec.md` §4.11, C11).
    pub fn charge_rate(&self, class_id: u16, now_ms: u64) -> Option<Evaluation> {
        self.rate.charge(class_id, now_ms)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn display_screen_name(&self) -> String {
        self.lock().display_screen_name.clone()
    }

    pub fn set_display_screen_name(&self, name: String) {
        self.lock().display_screen_name = name;
    }

    pub fn uin(&self) -> Option<u32> {
        self.lock().uin
    }

    /// Current warning level after applying linear decay since it was last
    /// updated (`SPEC_FULL.md` §4).
    pub fn warning_level(&self, now: u64) -> u16 {
        let state = self.lock();
        decayed_warning(state.warning_level, state.warning_updated_at, now)
    }

    /// Applies a warning delta (from an `EvilRequest`), first decaying the
    /// existing level, then adding, clamped to [0, MAX_WARNING_LEVEL].
    pub fn add_warning(&self, delta: u16, now: u64) -> u16 {
        let mut state = self.lock();
        let decayed = decayed_warning(state.warning_level, state.warning_updated_at, now);
        let new_level = decayed.saturating_add(delta).min(MAX_WARNING_LEVEL);
        state.warning_level = new_level;
        state.warning_updated_at = now;
        new_level
    }

    pub fn set_idle(&self, idle_since: Option<u64>) {
        self.lock().idle_since = idle_since;
    }

    pub fn idle_since(&self) -> Option<u64> {
        self.lock().idle_since
    }

    pub fn set_invisible(&self, invisible: bool) {
        self.lock().invisible = invisible;
    }

    pub fn invisible(&self) -> bool {
        self.lock().invisible
    }

    pub fn set_away(&self, msg: Option<String>) {
        self.lock().away_message = msg;
    }

    pub fn away(&self) -> Option<String> {
        self.lock().away_message.clone()
    }

    pub fn set_capabilities(&self, caps: Vec<[u8; 16]>) {
        self.lock().capabilities = caps;
    }

    pub fn record_food_group_version(&self, food_group: u16, version: u16) {
        self.lock().food_group_versions.insert(food_group, version);
    }

    pub fn mark_sign_on_complete(&self) {
        self.lock().sign_on_complete = true;
    }

    pub fn sign_on_complete(&self) -> bool {
        self.lock().sign_on_complete
    }

    pub fn set_chat_room_cookie(&self, cookie: Option<String>) {
        self.lock().chat_room_cookie = cookie;
    }

    pub fn chat_room_cookie(&self) -> Option<String> {
        self.lock().chat_room_cookie.clone()
    }

    pub fn subscribe_rate_class(&self, class_id: u16) {
        self.lock().subscribed_rate_classes.insert(class_id);
    }

    pub fn is_subscribed_to(&self, class_id: u16) -> bool {
        self.lock().subscribed_rate_classes.contains(&class_id)
    }

    pub fn set_icon_hash(&self, hash: Option<[u8; 16]>) {
        self.lock().icon_hash = hash;
    }

    pub fn add_legacy_buddy(&self, identity: Identity) {
        self.lock().legacy_buddies.insert(identity);
    }

    pub fn remove_legacy_buddy(&self, identity: &Identity) {
        self.lock().legacy_buddies.remove(identity);
    }

    pub fn watches_legacy_buddy(&self, identity: &Identity) -> bool {
        self.lock().legacy_buddies.contains(identity)
    }

    /// Builds the TLV user-info block broadcast on arrival and returned by
    /// `UserInfoQuery` (`spec.md` §4.2, §4.5). `invisible`, read by callers
    /// deciding whether to suppress an arrival broadcast, is not itself
    /// part of the wire snapshot.
    pub fn user_info_snapshot(&self, now: u64) -> Vec<Tlv> {
        let state = self.lock();
        let mut flags = 0u16;
        if !state.sign_on_complete {
            flags |= class_flag::UNCONFIRMED;
        }
        if state.away_message.is_some() {
            flags |= class_flag::AWAY;
        }
        if state.uin.is_some() {
            flags |= class_flag::ICQ;
        }
        if state.invisible {
            flags |= class_flag::INVISIBLE;
        }

        let idle_minutes = state
            .idle_since
            .map(|since| ((now.saturating_sub(since)) / 60) as u16)
            .unwrap_or(0);

        let mut tlvs = vec![
            Tlv::string(info_tag::SCREEN_NAME, &state.display_screen_name),
            Tlv::u16(info_tag::WARNING_LEVEL, decayed_warning(state.warning_level, state.warning_updated_at, now)),
            Tlv::u32(info_tag::SIGNON_TIME, self.signon_time as u32),
            Tlv::u16(info_tag::CLASS_FLAGS, flags),
            Tlv::u16(info_tag::IDLE_MINUTES, idle_minutes),
        ];
        for cap in &state.capabilities {
            tlvs.push(Tlv::new(info_tag::CAPABILITIES, cap.to_vec()));
        }
        if let Some(hash) = state.icon_hash {
            tlvs.push(Tlv::new(info_tag::ICON_HASH, hash.to_vec()));
        }
        tlvs
    }

    /// A minimal user-info block carrying only the screen name, used for
    /// `Buddy-Departed` (`spec.md` §4.5: "no TLV block, to preserve client
    /// compatibility for ICQ").
    pub fn minimal_user_info(&self) -> Vec<Tlv> {
        vec![Tlv::string(info_tag::SCREEN_NAME, &self.lock().display_screen_name)]
    }

    /// Non-blocking enqueue onto the outbox. On overflow the session is
    /// closed (`spec.md` §4.2: "slow consumer" disconnect) and the error is
    /// swallowed by the caller, matching the relayer's "never blocks,
    /// enqueue failures are dropped after logging" contract (`spec.md`
    /// §4.4).
    pub fn enqueue(&self, item: Outbound) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match self.sender.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(identity = %self.identity, "slow consumer, closing session");
                self.close();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.closed.store(true, Ordering::Release);
            }
        }
    }

    /// Takes ownership of the receiving half for the write loop. Returns
    /// `None` if already taken (a session's write loop may only run once).
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Outbound>> {
        self.receiver.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Idempotent close: marks the session closed and drops the sender side
    /// so the write loop's next recv returns `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn decayed_warning(level: u16, updated_at: u64, now: u64) -> u16 {
    let elapsed = now.saturating_sub(updated_at);
    let decay = (elapsed / WARNING_DECAY_SECONDS_PER_POINT) as u16;
    level.saturating_sub(decay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aimsrv_wire::snac::SnacHeader;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5190)
    }

    fn session() -> Session {
        Session::new(Identity::from_display("alice"), "Alice".to_string(), None, addr(), 0)
    }

    #[test]
    fn warning_decays_linearly_over_time() {
        let s = session();
        s.add_warning(100, 0);
        assert_eq!(s.warning_level(0), 100);
        assert_eq!(s.warning_level(90), 99);
        assert_eq!(s.warning_level(90 * 100), 0);
    }

    #[test]
    fn warning_clamped_to_max() {
        let s = session();
        s.add_warning(2000, 0);
        assert_eq!(s.warning_level(0), MAX_WARNING_LEVEL);
    }

    #[tokio::test]
    async fn enqueue_then_drain_preserves_order() {
        let s = session();
        s.enqueue(Outbound::Snac(Snac::new(SnacHeader::new(4, 7, 1), vec![1])));
        s.enqueue(Outbound::Snac(Snac::new(SnacHeader::new(4, 7, 2), vec![2])));
        let mut rx = s.take_receiver().unwrap();
        match rx.recv().await.unwrap() {
            Outbound::Snac(snac) => assert_eq!(snac.header.request_id, 1),
            Outbound::Close => panic!("expected snac"),
        }
        match rx.recv().await.unwrap() {
            Outbound::Snac(snac) => assert_eq!(snac.header.request_id, 2),
            Outbound::Close => panic!("expected snac"),
        }
    }

    #[test]
    fn take_receiver_only_once() {
        let s = session();
        assert!(s.take_receiver().is_some());
        assert!(s.take_receiver().is_none());
    }

    #[test]
    fn overflow_closes_the_session() {
        let s = session();
        for i in 0..OUTBOX_CAPACITY + 10 {
            s.enqueue(Outbound::Snac(Snac::new(SnacHeader::new(4, 7, i as u32), vec![])));
        }
        assert!(s.is_closed());
    }

    #[test]
    fn user_info_snapshot_reflects_invisible_flag() {
        let s = session();
        s.set_invisible(true);
        let tlvs = s.user_info_snapshot(0);
        let flags = aimsrv_wire::tlv::find(&tlvs, info_tag::CLASS_FLAGS).unwrap().as_u16().unwrap();
        assert_ne!(flags & class_flag::INVISIBLE, 0);
    }
}
