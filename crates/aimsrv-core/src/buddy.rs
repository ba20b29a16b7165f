//! Buddy broadcaster (`spec.md` §4.5, C5): presence fan-out with
//! permit/deny visibility rules.

use std::sync::Arc;

use aimsrv_db::model::FeedbagItemClass;
use aimsrv_db::Repository;
use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::encode_rest;

use crate::registry::SessionRegistry;
use crate::relay::Relayer;
use crate::session::Session;

pub mod subgroup {
    pub const BUDDY_ARRIVED: u16 = 0x0003;
    pub const BUDDY_DEPARTED: u16 = 0x0004;
}

pub const FOOD_GROUP_BUDDY: u16 = 0x03;

pub struct BuddyBroadcaster {
    registry: Arc<SessionRegistry>,
    relayer: Arc<Relayer>,
    repo: Arc<dyn Repository>,
}

impl BuddyBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>, relayer: Arc<Relayer>, repo: Arc<dyn Repository>) -> Self {
        Self { registry, relayer, repo }
    }

    /// Everyone who is watching `subject`: identities whose server-side
    /// feedbag lists `subject` as a buddy, plus any live session that has
    /// added `subject` via the legacy Buddy food-group this session
    /// (`spec.md` §4.5).
    fn watchers_of(&self, subject: &Identity) -> Vec<Arc<Session>> {
        self.registry
            .all_bos()
            .into_iter()
            .filter(|observer| &observer.identity != subject)
            .filter(|observer| observer.watches_legacy_buddy(subject) || self.feedbag_contains_buddy(&observer.identity, subject))
            .collect()
    }

    fn feedbag_contains_buddy(&self, owner: &Identity, subject: &Identity) -> bool {
        let Ok(items) = self.repo.get_feedbag(owner) else {
            return false;
        };
        items
            .into_iter()
            .any(|item| matches!(item.class, FeedbagItemClass::Buddy) && Identity::from_display(&item.name) == *subject)
    }

    fn privacy_allows(&self, subject: &Identity, observer: &Identity) -> bool {
        let Ok(subject_items) = self.repo.get_feedbag(subject) else {
            return true;
        };
        let denies_all = subject_items.iter().any(|i| matches!(i.class, FeedbagItemClass::PermitDenySetting) && i.data.first() == Some(&2));
        let permit_only = subject_items.iter().any(|i| matches!(i.class, FeedbagItemClass::PermitDenySetting) && i.data.first() == Some(&3));
        if denies_all {
            return false;
        }
        if permit_only {
            return subject_items.iter().any(|i| matches!(i.class, FeedbagItemClass::Permit) && Identity::from_display(&i.name) == *observer);
        }

        let Ok(observer_items) = self.repo.get_feedbag(observer) else {
            return true;
        };
        !observer_items.iter().any(|i| matches!(i.class, FeedbagItemClass::Deny) && Identity::from_display(&i.name) == *subject)
    }

    /// Broadcasts a Buddy-Arrived to every watcher, or a Buddy-Departed to
    /// prior observers if `subject` is invisible (`spec.md` §4.5).
    pub fn broadcast_arrival(&self, subject: &Arc<Session>, now: u64) {
        if subject.invisible() {
            self.broadcast_departure(subject);
            return;
        }
        let tlvs = subject.user_info_snapshot(now);
        let body = encode_rest(&tlvs);
        let snac = Snac::new(SnacHeader::server_originated(FOOD_GROUP_BUDDY, subgroup::BUDDY_ARRIVED), body);
        for watcher in self.watchers_of(&subject.identity) {
            if self.privacy_allows(&subject.identity, &watcher.identity) {
                self.relayer.relay_to(&watcher.identity, snac.clone());
            }
        }
    }

    pub fn broadcast_departure(&self, subject: &Arc<Session>) {
        let tlvs = subject.minimal_user_info();
        let body = encode_rest(&tlvs);
        let snac = Snac::new(SnacHeader::server_originated(FOOD_GROUP_BUDDY, subgroup::BUDDY_DEPARTED), body);
        for watcher in self.watchers_of(&subject.identity) {
            self.relayer.relay_to(&watcher.identity, snac.clone());
        }
    }

    /// Sends a single targeted update, used to populate the arriving
    /// user's view of their own buddies at sign-on (`spec.md` §4.5).
    pub fn unicast_arrival(&self, from: &Arc<Session>, to: &Identity, now: u64) {
        if from.invisible() {
            return;
        }
        if !self.privacy_allows(&from.identity, to) {
            return;
        }
        let tlvs = from.user_info_snapshot(now);
        let body = encode_rest(&tlvs);
        let snac = Snac::new(SnacHeader::server_originated(FOOD_GROUP_BUDDY, subgroup::BUDDY_ARRIVED), body);
        self.relayer.relay_to(to, snac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aimsrv_db::memory::InMemoryRepository;
    use aimsrv_db::model::FeedbagItem;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5190)
    }

    fn make(name: &str) -> Arc<Session> {
        Arc::new(Session::new(Identity::from_display(name), name.to_string(), None, addr(), 0))
    }

    fn setup() -> (BuddyBroadcaster, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let relayer = Arc::new(Relayer::new(registry.clone()));
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        (BuddyBroadcaster::new(registry.clone(), relayer, repo), registry)
    }

    #[tokio::test]
    async fn arrival_reaches_legacy_watcher() {
        let (broadcaster, registry) = setup();
        let alice = make("alice");
        let bob = make("bob");
        bob.add_legacy_buddy(Identity::from_display("alice"));
        registry.register(alice.clone(), false).unwrap();
        registry.register(bob.clone(), false).unwrap();

        let mut bob_rx = bob.take_receiver().unwrap();
        broadcaster.broadcast_arrival(&alice, 0);
        assert!(bob_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn invisible_subject_suppresses_arrival() {
        let (broadcaster, registry) = setup();
        let alice = make("alice");
        alice.set_invisible(true);
        let bob = make("bob");
        bob.add_legacy_buddy(Identity::from_display("alice"));
        registry.register(alice.clone(), false).unwrap();
        registry.register(bob.clone(), false).unwrap();

        let mut bob_rx = bob.take_receiver().unwrap();
        broadcaster.broadcast_arrival(&alice, 0);
        let msg = bob_rx.try_recv().unwrap();
        match msg {
            crate::session::Outbound::Snac(snac) => assert_eq!(snac.header.subgroup, subgroup::BUDDY_DEPARTED),
            crate::session::Outbound::Close => panic!("expected snac"),
        }
    }

    #[tokio::test]
    async fn deny_list_suppresses_arrival() {
        let registry = Arc::new(SessionRegistry::new());
        let alice = make("alice");
        let bob = make("bob");
        bob.add_legacy_buddy(Identity::from_display("alice"));
        registry.register(alice.clone(), false).unwrap();
        registry.register(bob.clone(), false).unwrap();

        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        repo.upsert_feedbag_items(
            &Identity::from_display("bob"),
            vec![FeedbagItem {
                group_id: 0,
                item_id: 1,
                class: FeedbagItemClass::Deny,
                name: "alice".to_string(),
                data: vec![],
            }],
        )
        .unwrap();
        let relayer = Arc::new(Relayer::new(registry.clone()));
        let broadcaster = BuddyBroadcaster::new(registry.clone(), relayer, repo);

        let mut bob_rx = bob.take_receiver().unwrap();
        broadcaster.broadcast_arrival(&alice, 0);
        assert!(bob_rx.try_recv().is_err());
    }
}
