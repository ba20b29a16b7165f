//! # aimsrv-core
//!
//! The session registry, presence fan-out, rate-limit governor, chat room
//! registry, service-dispatch cookies, and ICBM router (`spec.md` §2,
//! components C2-C5, C8-C11). The wire codec lives in `aimsrv-wire`,
//! persistence in `aimsrv-db`; this crate is where the two meet the
//! concurrency model described in `spec.md` §5.

pub mod buddy;
pub mod chatroom;
pub mod cookie;
pub mod error;
pub mod icbm;
pub mod rate;
pub mod registry;
pub mod relay;
pub mod session;

pub use error::{CoreError, Result};

use std::sync::Arc;

use aimsrv_db::Repository;

use buddy::BuddyBroadcaster;
use chatroom::ChatRoomRegistry;
use cookie::CookieSigner;
use icbm::IcbmRouter;
use rate::{default_classes, RateClass};
use registry::SessionRegistry;
use relay::Relayer;

/// Process-wide engine tying the registry, relayer, chat rooms, rate
/// classes, cookie signer, and ICBM router together. One instance is
/// constructed at boot and shared (via `Arc`) across every connection's
/// handler context (`spec.md` §8: "global state... initialized once").
pub struct Engine {
    pub registry: Arc<SessionRegistry>,
    pub relayer: Arc<Relayer>,
    pub buddies: Arc<BuddyBroadcaster>,
    pub chat_rooms: Arc<ChatRoomRegistry>,
    pub icbm: Arc<IcbmRouter>,
    pub cookies: Arc<CookieSigner>,
    /// Leaked once at boot: the table is immutable for the life of the
    /// process (`spec.md` §5), so a `'static` slice lets every session's
    /// [`rate::RateBuckets`] borrow it without an `Arc`.
    pub rate_classes: &'static [RateClass],
    pub repo: Arc<dyn Repository>,
    /// Whether the auth service may create an account on first login
    /// (`spec.md` §4.12, the `registration_open` server setting).
    pub registration_open: bool,
}

impl Engine {
    pub fn new(repo: Arc<dyn Repository>, cookie_key: [u8; 32], registration_open: bool) -> Result<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let relayer = Arc::new(Relayer::new(registry.clone()));
        let buddies = Arc::new(BuddyBroadcaster::new(registry.clone(), relayer.clone(), repo.clone()));
        let chat_rooms = Arc::new(ChatRoomRegistry::new(repo.clone())?);
        let icbm = Arc::new(IcbmRouter::new(registry.clone(), relayer.clone(), repo.clone()));
        let cookies = Arc::new(CookieSigner::new(cookie_key));
        let rate_classes: &'static [RateClass] = Box::leak(default_classes().into_boxed_slice());

        Ok(Self {
            registry,
            relayer,
            buddies,
            chat_rooms,
            icbm,
            cookies,
            rate_classes,
            repo,
            registration_open,
        })
    }
}
