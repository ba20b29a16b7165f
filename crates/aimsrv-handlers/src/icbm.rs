//! ICBM food-group handler (`spec.md` §4.7, §4.10): routes messages
//! through [`aimsrv_core::icbm::IcbmRouter`] and handles evil/warn.

use std::sync::Arc;

use aimsrv_core::icbm::SendOutcome;
use aimsrv_core::session::Session;
use aimsrv_wire::food_group::{group, icbm};
use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{read_prefixed_string_8, write_prefixed_string_8};

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    match snac.header.subgroup {
        icbm::CHANNEL_MSG_TO_HOST => handle_send(ctx, session, &snac, now),
        icbm::EVIL_REQUEST => handle_evil(ctx, session, &snac, now),
        _ => business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Body layout: channel (2 bytes BE), recipient (1-byte-length-prefixed
/// string), ack-requested flag (1 byte), payload (rest) — a
/// machine-describable layout per `spec.md` §6.
fn handle_send(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    if snac.body.len() < 2 {
        return business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    }
    let channel = u16::from_be_bytes([snac.body[0], snac.body[1]]);
    let Ok((recipient_name, consumed)) = read_prefixed_string_8(&snac.body[2..]) else {
        return business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let rest = &snac.body[2 + consumed..];
    let Some(&ack_requested) = rest.first() else {
        return business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let payload = rest.get(1..).unwrap_or(&[]).to_vec();

    let recipient = Identity::from_display(&recipient_name);
    if ctx.engine.repo.get_account(&recipient).ok().flatten().is_none() {
        return business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::NO_SUCH_USER);
    }

    let outcome = ctx.engine.icbm.send(&session.identity, &recipient, channel, payload, now);
    if outcome == SendOutcome::Dropped {
        return business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    }

    if ack_requested != 0 {
        let mut body = Vec::new();
        write_prefixed_string_8(&mut body, &recipient_name);
        HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::ICBM, icbm::HOST_ACK, snac.header.request_id), body))
    } else {
        HandlerOutcome::None
    }
}

/// Body layout: target (1-byte-length-prefixed string), delta (2 bytes BE)
/// (`spec.md` §4.10 step 5).
fn handle_evil(ctx: &HandlerContext, _session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    let Ok((target_name, consumed)) = read_prefixed_string_8(&snac.body) else {
        return business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let Some(delta_bytes) = snac.body.get(consumed..consumed + 2) else {
        return business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let delta = u16::from_be_bytes([delta_bytes[0], delta_bytes[1]]);
    let target = Identity::from_display(&target_name);

    let Some(new_level) = ctx.engine.icbm.apply_warning(&target, delta, now) else {
        return business_error(group::ICBM, snac.header.request_id, aimsrv_wire::food_group::error_code::NO_SUCH_USER);
    };

    if let Some(target_session) = ctx.engine.registry.lookup(&target) {
        ctx.engine.buddies.broadcast_arrival(&target_session, now);
    }

    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::ICBM, icbm::EVIL_REPLY, snac.header.request_id), new_level.to_be_bytes().to_vec()))
}
