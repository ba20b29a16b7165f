//! SNAC relaying (`spec.md` §4.4): a thin fan-out layer over the registry's
//! outboxes. Never blocks — a slow consumer is disconnected by the session
//! itself ([`crate::session::Session::enqueue`]), not by the relayer.

use std::sync::Arc;

use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::Snac;

use crate::registry::SessionRegistry;
use crate::session::{Outbound, Session};

pub struct Relayer {
    registry: Arc<SessionRegistry>,
}

impl Relayer {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Delivers to a single identity's BOS session, if one is live. Returns
    /// whether a live session was found (callers use this to decide whether
    /// to fall back to offline store-and-forward, e.g. ICBM).
    pub fn relay_to(&self, identity: &Identity, snac: Snac) -> bool {
        match self.registry.lookup(identity) {
            Some(session) => {
                session.enqueue(Outbound::Snac(snac));
                true
            }
            None => false,
        }
    }

    /// Delivers the same SNAC to every named identity that has a live
    /// session.
    pub fn relay_to_many(&self, identities: &[Identity], snac: &Snac) {
        for identity in identities {
            if let Some(session) = self.registry.lookup(identity) {
                session.enqueue(Outbound::Snac(snac.clone()));
            }
        }
    }

    /// Delivers to every occupant of a chat room.
    pub fn relay_to_room(&self, room_cookie: &str, snac: &Snac) {
        for session in self.registry.chat_occupants(room_cookie) {
            session.enqueue(Outbound::Snac(snac.clone()));
        }
    }

    /// Delivers to every occupant of a chat room except the one identity
    /// (used for chat-message fan-out, where the sender already saw its own
    /// message echoed via the reply, per `spec.md` §4.9 Open Question
    /// resolution on the reflection flag).
    pub fn relay_to_room_except(&self, room_cookie: &str, except: &Identity, snac: &Snac) {
        for session in self.registry.chat_occupants(room_cookie) {
            if &session.identity != except {
                session.enqueue(Outbound::Snac(snac.clone()));
            }
        }
    }

    pub fn close(&self, session: &Arc<Session>) {
        session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aimsrv_wire::snac::SnacHeader;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5190)
    }

    fn make(name: &str) -> Arc<Session> {
        Arc::new(Session::new(Identity::from_display(name), name.to_string(), None, addr(), 0))
    }

    #[test]
    fn relay_to_returns_false_when_offline() {
        let registry = Arc::new(SessionRegistry::new());
        let relayer = Relayer::new(registry);
        let found = relayer.relay_to(&Identity::from_display("ghost"), Snac::new(SnacHeader::new(4, 7, 0), vec![]));
        assert!(!found);
    }

    #[tokio::test]
    async fn relay_to_room_except_skips_the_sender() {
        let registry = Arc::new(SessionRegistry::new());
        let alice = make("alice");
        let bob = make("bob");
        registry.register_chat("room".into(), alice.clone());
        registry.register_chat("room".into(), bob.clone());
        let relayer = Relayer::new(registry);
        relayer.relay_to_room_except("room", &alice.identity, &Snac::new(SnacHeader::new(0x0E, 6, 0), vec![]));

        let mut alice_rx = alice.take_receiver().unwrap();
        let mut bob_rx = bob.take_receiver().unwrap();
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_ok());
    }
}
