//! ICQ food-group (`spec.md` §4.7: "a thin request/response surface over
//! the repository"). ICQ metadata requests nest a little-endian payload
//! inside the big-endian SNAC body (`spec.md` §6, §9).

use std::sync::Arc;

use aimsrv_wire::food_group::{group, icq};
use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::le;

use aimsrv_core::session::Session;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub fn handle(ctx: &HandlerContext, _session: &Arc<Session>, snac: Snac) -> HandlerOutcome {
    match snac.header.subgroup {
        icq::META_REQUEST => handle_meta_request(ctx, &snac),
        _ => business_error(group::ICQ, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Body: uin (4 LE), then whatever sub-request the client packed; this
/// server only answers a basic "is this uin registered" offline-status
/// probe, matching the ICQ channel's thin surface (`spec.md` §4.7).
fn handle_meta_request(ctx: &HandlerContext, snac: &Snac) -> HandlerOutcome {
    let Some(uin) = le::read_u32(&snac.body) else {
        return business_error(group::ICQ, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };

    let online = ctx
        .engine
        .repo
        .get_account_by_uin(uin)
        .ok()
        .flatten()
        .map(|account| account.identity)
        .and_then(|identity: Identity| ctx.engine.registry.lookup(&identity))
        .is_some();

    let mut body = Vec::new();
    le::write_u32(&mut body, uin);
    body.push(u8::from(online));
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::ICQ, icq::META_REPLY, snac.header.request_id), body))
}
