//! SNAC dispatcher (`spec.md` §4.6, C6): rate-limit then route.

use std::sync::Arc;

use aimsrv_core::rate::RateState;
use aimsrv_core::session::{Outbound, Session};
use aimsrv_wire::food_group::{group, oservice};
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::Tlv;

use crate::context::HandlerContext;
use crate::reply::error_reply;
use crate::{admin, alert, bart, buddy, chat, chat_nav, feedbag, icbm, icq, locate, odir, oservice as oservice_handlers, permit_deny, user_lookup};

/// What a food-group handler did with an inbound SNAC (`spec.md` §4.6
/// step 4).
pub enum HandlerOutcome {
    /// No reply; the handler's side effects (broadcasts, state changes)
    /// are already enqueued where they need to be.
    None,
    /// A single reply to send back on the originating session, echoing the
    /// request id.
    Reply(Snac),
    /// The connection should close after any reply is flushed (used for
    /// authorization violations, `spec.md` §7 class 4).
    CloseAfterReply(Snac),
    Close,
}

/// Maps an inbound (food-group, subgroup) to the rate class charged for it
/// (`spec.md` §4.6 step 2, §4.11: "a snac→class mapping is static"). Falls
/// back to class 1 (the general-traffic class) for anything unlisted.
pub fn rate_class_for(food_group: u16, subgroup: u16) -> u16 {
    match (food_group, subgroup) {
        (group::ICBM, _) => 2,
        (group::CHAT, _) => 3,
        (group::CHAT_NAV, _) => 3,
        (group::FEEDBAG, _) => 4,
        (group::BART, _) => 5,
        _ => 1,
    }
}

/// Runs the full per-SNAC pipeline for an already-decoded SNAC: charge the
/// rate bucket, react to a state transition, then route to the matching
/// handler (`spec.md` §4.6 steps 2-5).
pub fn dispatch(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64, now_ms: u64) -> HandlerOutcome {
    let class_id = rate_class_for(snac.header.food_group, snac.header.subgroup);
    if let Some(eval) = session.charge_rate(class_id, now_ms) {
        if eval.transitioned && session.is_subscribed_to(class_id) {
            session.enqueue(Outbound::Snac(rate_change_notification(class_id)));
        }
        if eval.state == RateState::Disconnected {
            return HandlerOutcome::CloseAfterReply(signoff_snac());
        }
        if eval.state == RateState::Limited {
            return HandlerOutcome::None;
        }
    }

    route(ctx, session, snac, now)
}

fn route(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    let fg = snac.header.food_group;
    let sg = snac.header.subgroup;
    match fg {
        group::OSERVICE => oservice_handlers::handle(ctx, session, snac, now),
        group::LOCATE => locate::handle(ctx, session, snac),
        group::BUDDY => buddy::handle(ctx, session, snac, now),
        group::ICBM => icbm::handle(ctx, session, snac, now),
        group::CHAT => chat::handle(ctx, session, snac, now),
        group::CHAT_NAV => chat_nav::handle(ctx, session, snac, now),
        group::FEEDBAG => feedbag::handle(ctx, session, snac, now),
        group::BART => bart::handle(ctx, session, snac, now),
        group::ADMIN => admin::handle(ctx, session, snac, now),
        group::ODIR => odir::handle(ctx, session, snac),
        group::ALERT => alert::handle(ctx, session, snac),
        group::ICQ => icq::handle(ctx, session, snac),
        group::PERMIT_DENY => permit_deny::handle(ctx, session, snac),
        group::USER_LOOKUP => user_lookup::handle(ctx, session, snac),
        _ => {
            tracing::debug!(fg, sg, "unsupported food group");
            HandlerOutcome::Reply(error_reply(fg, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST))
        }
    }
}

fn rate_change_notification(class_id: u16) -> Snac {
    let body = aimsrv_wire::tlv::encode_rest(&[Tlv::u16(0x01, class_id)]);
    Snac::new(SnacHeader::server_originated(group::OSERVICE, oservice::RATE_PARAM_CHANGE), body)
}

fn signoff_snac() -> Snac {
    Snac::new(SnacHeader::server_originated(group::OSERVICE, oservice::ERROR), vec![])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icbm_snacs_are_charged_to_class_two() {
        assert_eq!(rate_class_for(group::ICBM, aimsrv_wire::food_group::icbm::CHANNEL_MSG_TO_HOST), 2);
    }

    #[test]
    fn unmapped_snacs_fall_back_to_class_one() {
        assert_eq!(rate_class_for(group::LOCATE, 0x02), 1);
    }
}
