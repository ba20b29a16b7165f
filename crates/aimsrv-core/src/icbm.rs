//! ICBM router (`spec.md` §4.10, C10): online delivery with offline
//! store-and-forward for channels that support it.

use std::sync::Arc;

use aimsrv_db::model::{FeedbagItemClass, OfflineMessage};
use aimsrv_db::Repository;
use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::{Snac, SnacHeader};

use crate::registry::SessionRegistry;
use crate::relay::Relayer;
use crate::session::Session;

pub const FOOD_GROUP_ICBM: u16 = 0x04;

pub mod subgroup {
    pub const CHANNEL_MSG_TO_CLIENT: u16 = 0x0007;
    pub const HOST_ACK: u16 = 0x000C;
}

pub mod channel {
    pub const PLAIN_IM: u16 = 1;
    pub const RENDEZVOUS: u16 = 2;
    pub const ICQ: u16 = 4;
}

/// Offline messages stop queueing past this depth per recipient
/// (`spec.md` §4.10: "if full, drop the oldest or return recipient
/// offline depending on config" — this server drops the oldest, matching
/// a bounded outbox's own overflow policy).
pub const MAX_QUEUED_OFFLINE_MESSAGES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    DeliveredOnline,
    QueuedOffline,
    Dropped,
}

pub struct IcbmRouter {
    registry: Arc<SessionRegistry>,
    relayer: Arc<Relayer>,
    repo: Arc<dyn Repository>,
}

impl IcbmRouter {
    pub fn new(registry: Arc<SessionRegistry>, relayer: Arc<Relayer>, repo: Arc<dyn Repository>) -> Self {
        Self { registry, relayer, repo }
    }

    fn recipient_allows(&self, sender: &Identity, recipient: &Identity) -> bool {
        let Ok(recipient_items) = self.repo.get_feedbag(recipient) else {
            return true;
        };
        let permit_only = recipient_items.iter().any(|i| matches!(i.class, FeedbagItemClass::PermitDenySetting) && i.data.first() == Some(&3));
        if permit_only {
            return recipient_items.iter().any(|i| matches!(i.class, FeedbagItemClass::Permit) && Identity::from_display(&i.name) == *sender);
        }
        !recipient_items.iter().any(|i| matches!(i.class, FeedbagItemClass::Deny) && Identity::from_display(&i.name) == *sender)
    }

    fn channel_supports_offline(channel: u16) -> bool {
        matches!(channel, channel::PLAIN_IM | channel::ICQ)
    }

    /// Sends an IM on behalf of `sender` to `recipient` over `channel`. Does
    /// not itself reply to the sender with a `HostAck`; the handler does
    /// that based on the returned outcome plus the caller's ack request
    /// flag (`spec.md` §4.10 step 3).
    pub fn send(&self, sender: &Identity, recipient: &Identity, channel: u16, payload: Vec<u8>, now: u64) -> SendOutcome {
        if !self.recipient_allows(sender, recipient) {
            return SendOutcome::Dropped;
        }

        let body = encode_channel_msg(sender, channel, &payload);
        let snac = Snac::new(SnacHeader::server_originated(FOOD_GROUP_ICBM, subgroup::CHANNEL_MSG_TO_CLIENT), body);
        if self.relayer.relay_to(recipient, snac) {
            return SendOutcome::DeliveredOnline;
        }

        if !Self::channel_supports_offline(channel) {
            return SendOutcome::Dropped;
        }

        let queued = self.repo.offline_message_count(recipient).unwrap_or(0);
        if queued >= MAX_QUEUED_OFFLINE_MESSAGES {
            if let Ok(mut pending) = self.repo.drain_offline_messages(recipient) {
                pending.sort_by_key(|m| m.sent_at);
                if let Some(oldest) = pending.first() {
                    let _ = self.repo.delete_offline_message(oldest.id);
                }
                for msg in pending.into_iter().skip(1) {
                    let _ = self.repo.enqueue_offline_message(msg);
                }
            }
        }

        match self.repo.enqueue_offline_message(OfflineMessage {
            id: 0,
            sender: sender.clone(),
            recipient: recipient.clone(),
            payload,
            sent_at: now,
        }) {
            Ok(()) => SendOutcome::QueuedOffline,
            Err(_) => SendOutcome::Dropped,
        }
    }

    /// Drains and delivers stored offline messages to a newly arrived
    /// session in send-time order, deleting each once enqueued
    /// (`spec.md` §4.10: "drain... in send-time order, then delete them on
    /// acknowledgement" — this server treats successful local enqueue as
    /// the acknowledgement since delivery past that point is the outbox's
    /// concern, not the router's).
    pub fn deliver_offline_backlog(&self, session: &Arc<Session>) {
        let Ok(mut messages) = self.repo.drain_offline_messages(&session.identity) else {
            return;
        };
        messages.sort_by_key(|m| m.sent_at);
        for msg in messages {
            let body = encode_channel_msg(&msg.sender, channel::PLAIN_IM, &msg.payload);
            let snac = Snac::new(SnacHeader::server_originated(FOOD_GROUP_ICBM, subgroup::CHANNEL_MSG_TO_CLIENT), body);
            self.relayer.relay_to(&session.identity, snac);
            let _ = self.repo.delete_offline_message(msg.id);
        }
    }

    /// Applies a warning delta from an `EvilRequest` and returns the
    /// target's new level so the caller can trigger a re-arrival broadcast
    /// (`spec.md` §4.10 step 5).
    pub fn apply_warning(&self, target: &Identity, delta: u16, now: u64) -> Option<u16> {
        let session = self.registry.lookup(target)?;
        Some(session.add_warning(delta, now))
    }
}

fn encode_channel_msg(sender: &Identity, channel: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + sender.as_str().len() + payload.len());
    out.extend_from_slice(&channel.to_be_bytes());
    aimsrv_wire::tlv::write_prefixed_string_8(&mut out, sender.as_str());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use aimsrv_db::memory::InMemoryRepository;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5190)
    }

    fn router() -> (IcbmRouter, Arc<SessionRegistry>, Arc<dyn Repository>) {
        let registry = Arc::new(SessionRegistry::new());
        let relayer = Arc::new(Relayer::new(registry.clone()));
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        (IcbmRouter::new(registry.clone(), relayer, repo.clone()), registry, repo)
    }

    #[tokio::test]
    async fn online_recipient_gets_exactly_one_message() {
        let (router, registry, _repo) = router();
        let bob = Arc::new(Session::new(Identity::from_display("bob"), "bob".into(), None, addr(), 0));
        registry.register(bob.clone(), false).unwrap();
        let mut rx = bob.take_receiver().unwrap();

        let outcome = router.send(&Identity::from_display("alice"), &bob.identity, channel::PLAIN_IM, vec![1, 2, 3], 0);
        assert_eq!(outcome, SendOutcome::DeliveredOnline);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn offline_plain_im_is_queued_then_drained_in_order() {
        let (router, _registry, repo) = router();
        let bob = Identity::from_display("bob");
        router.send(&Identity::from_display("alice"), &bob, channel::PLAIN_IM, vec![1], 10);
        router.send(&Identity::from_display("alice"), &bob, channel::PLAIN_IM, vec![2], 20);
        assert_eq!(repo.offline_message_count(&bob).unwrap(), 2);
    }

    #[test]
    fn rendezvous_channel_does_not_queue_offline() {
        let (router, _registry, repo) = router();
        let bob = Identity::from_display("bob");
        let outcome = router.send(&Identity::from_display("alice"), &bob, channel::RENDEZVOUS, vec![1], 0);
        assert_eq!(outcome, SendOutcome::Dropped);
        assert_eq!(repo.offline_message_count(&bob).unwrap(), 0);
    }

    #[test]
    fn denied_sender_is_dropped_without_queueing() {
        use aimsrv_db::model::FeedbagItem;
        let (router, _registry, repo) = router();
        let bob = Identity::from_display("bob");
        repo.upsert_feedbag_items(
            &bob,
            vec![FeedbagItem {
                group_id: 0,
                item_id: 1,
                class: FeedbagItemClass::Deny,
                name: "alice".into(),
                data: vec![],
            }],
        )
        .unwrap();
        let outcome = router.send(&Identity::from_display("alice"), &bob, channel::PLAIN_IM, vec![1], 0);
        assert_eq!(outcome, SendOutcome::Dropped);
        assert_eq!(repo.offline_message_count(&bob).unwrap(), 0);
    }
}
