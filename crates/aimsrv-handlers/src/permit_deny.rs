//! Permit/Deny food-group (`spec.md` §4.7: "a thin request/response
//! surface over the repository"). Legacy permit/deny editing; the
//! feedbag food-group is the primary path clients use today, but this
//! surface still round-trips through the same `Permit`/`Deny` feedbag
//! item classes so the two stay consistent.

use std::sync::Arc;

use aimsrv_db::model::{FeedbagItem, FeedbagItemClass};
use aimsrv_wire::food_group::{group, permit_deny};
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::read_prefixed_string_8;

use aimsrv_core::session::Session;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac) -> HandlerOutcome {
    match snac.header.subgroup {
        permit_deny::RIGHTS_QUERY => HandlerOutcome::Reply(Snac::new(
            SnacHeader::new(group::PERMIT_DENY, permit_deny::RIGHTS_REPLY, snac.header.request_id),
            vec![],
        )),
        permit_deny::ADD_PERMIT => mutate(ctx, session, &snac, FeedbagItemClass::Permit, true),
        permit_deny::DEL_PERMIT => mutate(ctx, session, &snac, FeedbagItemClass::Permit, false),
        permit_deny::ADD_DENY => mutate(ctx, session, &snac, FeedbagItemClass::Deny, true),
        permit_deny::DEL_DENY => mutate(ctx, session, &snac, FeedbagItemClass::Deny, false),
        _ => business_error(group::PERMIT_DENY, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Body: a sequence of 1-byte-length-prefixed screen names (`spec.md`
/// §6). Each name becomes a `Permit`/`Deny` feedbag item, added or
/// removed by name since this legacy surface has no item ids of its own.
fn mutate(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, class: FeedbagItemClass, add: bool) -> HandlerOutcome {
    let mut names = Vec::new();
    let mut rest = snac.body.as_slice();
    while !rest.is_empty() {
        let Ok((name, consumed)) = read_prefixed_string_8(rest) else {
            return business_error(group::PERMIT_DENY, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
        };
        names.push(name);
        rest = &rest[consumed..];
    }

    let Ok(existing) = ctx.engine.repo.get_feedbag(&session.identity) else {
        return business_error(group::PERMIT_DENY, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    };
    let next_item_id = existing.iter().map(|i| i.item_id).max().unwrap_or(0).wrapping_add(1);

    if add {
        let items = names
            .into_iter()
            .enumerate()
            .map(|(offset, name)| FeedbagItem { group_id: 0, item_id: next_item_id.wrapping_add(offset as u16), class, name, data: vec![] })
            .collect();
        if ctx.engine.repo.upsert_feedbag_items(&session.identity, items).is_err() {
            return business_error(group::PERMIT_DENY, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
        }
    } else {
        let pairs: Vec<(u16, u16)> = existing.iter().filter(|i| i.class == class && names.contains(&i.name)).map(|i| (i.group_id, i.item_id)).collect();
        if ctx.engine.repo.delete_feedbag_items(&session.identity, &pairs).is_err() {
            return business_error(group::PERMIT_DENY, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
        }
    }

    HandlerOutcome::None
}
