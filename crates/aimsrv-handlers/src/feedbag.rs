//! Feedbag food-group (`spec.md` §4.7: "query/upsert/delete items with
//! per-user last-modified tracking"). The feedbag is the source of truth
//! for the server-side buddy list, privacy mode, icon reference, and
//! preauth state; mutations that affect visibility fire a buddy broadcast.

use std::sync::Arc;

use aimsrv_db::model::{FeedbagItem, FeedbagItemClass};
use aimsrv_wire::food_group::{feedbag, group};
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv;

use aimsrv_core::session::Session;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    match snac.header.subgroup {
        feedbag::RIGHTS_QUERY => HandlerOutcome::Reply(Snac::new(
            SnacHeader::new(group::FEEDBAG, feedbag::RIGHTS_REPLY, snac.header.request_id),
            vec![],
        )),
        feedbag::QUERY => handle_query(ctx, session, &snac),
        feedbag::INSERT_ITEM | feedbag::UPDATE_ITEM => handle_upsert(ctx, session, &snac, now),
        feedbag::DELETE_ITEM => handle_delete(ctx, session, &snac, now),
        _ => business_error(group::FEEDBAG, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Replies with the full feedbag plus its last-modified stamp
/// (`spec.md` §4.7, §6).
fn handle_query(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac) -> HandlerOutcome {
    let Ok(items) = ctx.engine.repo.get_feedbag(&session.identity) else {
        return business_error(group::FEEDBAG, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    };
    let last_modified = ctx.engine.repo.feedbag_last_modified(&session.identity).unwrap_or(0);

    let mut body = Vec::new();
    body.extend_from_slice(&(last_modified as u32).to_be_bytes());
    body.extend_from_slice(&(items.len() as u16).to_be_bytes());
    for item in &items {
        encode_item(&mut body, item);
    }
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::FEEDBAG, feedbag::REPLY, snac.header.request_id), body))
}

/// Body: a 2-byte count of items, each `group_id(2) item_id(2) class(2)
/// name(1-byte-prefixed) data(2-byte-prefixed)` (`spec.md` §6).
fn handle_upsert(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    let Some(items) = decode_items(&snac.body) else {
        return business_error(group::FEEDBAG, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let affects_visibility = items.iter().any(item_affects_visibility);

    if ctx.engine.repo.upsert_feedbag_items(&session.identity, items).is_err() {
        return business_error(group::FEEDBAG, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    }

    if affects_visibility && session.sign_on_complete() {
        ctx.engine.buddies.broadcast_arrival(session, now);
    }

    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::FEEDBAG, feedbag::STATUS, snac.header.request_id), vec![0, 0]))
}

/// Body: a 2-byte count of `(group_id, item_id)` pairs (`spec.md` §6).
fn handle_delete(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    let Some(count) = snac.body.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]]) as usize) else {
        return business_error(group::FEEDBAG, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let mut pairs = Vec::with_capacity(count);
    for chunk in snac.body.get(2..).unwrap_or(&[]).chunks_exact(4).take(count) {
        pairs.push((u16::from_be_bytes([chunk[0], chunk[1]]), u16::from_be_bytes([chunk[2], chunk[3]])));
    }
    if pairs.len() != count {
        return business_error(group::FEEDBAG, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    }

    if ctx.engine.repo.delete_feedbag_items(&session.identity, &pairs).is_err() {
        return business_error(group::FEEDBAG, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    }

    if session.sign_on_complete() {
        ctx.engine.buddies.broadcast_arrival(session, now);
    }

    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::FEEDBAG, feedbag::STATUS, snac.header.request_id), vec![0, 0]))
}

/// Buddy entries and privacy settings are the classes that change who can
/// see presence; groups and icon refs do not (`spec.md` §4.7).
fn item_affects_visibility(item: &FeedbagItem) -> bool {
    matches!(
        item.class,
        FeedbagItemClass::Buddy | FeedbagItemClass::PermitDenySetting | FeedbagItemClass::Permit | FeedbagItemClass::Deny
    )
}

fn encode_item(out: &mut Vec<u8>, item: &FeedbagItem) {
    tlv::write_prefixed_string_16(out, &item.name);
    out.extend_from_slice(&item.group_id.to_be_bytes());
    out.extend_from_slice(&item.item_id.to_be_bytes());
    out.extend_from_slice(&item.class.to_wire().to_be_bytes());
    out.extend_from_slice(&(item.data.len() as u16).to_be_bytes());
    out.extend_from_slice(&item.data);
}

fn decode_items(buf: &[u8]) -> Option<Vec<FeedbagItem>> {
    let count = buf.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)?;
    let mut rest = buf.get(2..)?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let (name, consumed) = tlv::read_prefixed_string_16(rest).ok()?;
        rest = rest.get(consumed..)?;
        if rest.len() < 6 {
            return None;
        }
        let group_id = u16::from_be_bytes([rest[0], rest[1]]);
        let item_id = u16::from_be_bytes([rest[2], rest[3]]);
        let class = FeedbagItemClass::from_wire(u16::from_be_bytes([rest[4], rest[5]]));
        rest = &rest[6..];
        let data_len = rest.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)?;
        rest = rest.get(2..)?;
        let data = rest.get(..data_len)?.to_vec();
        rest = &rest[data_len..];
        out.push(FeedbagItem { group_id, item_id, class, name, data });
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_round_trips_through_encode_decode() {
        let item = FeedbagItem {
            group_id: 1,
            item_id: 2,
            class: FeedbagItemClass::Buddy,
            name: "buddy1".to_string(),
            data: vec![1, 2, 3],
        };
        let mut body = (1u16).to_be_bytes().to_vec();
        encode_item(&mut body, &item);
        let decoded = decode_items(&body).unwrap();
        assert_eq!(decoded, vec![item]);
    }

    #[test]
    fn permit_deny_setting_affects_visibility_but_group_does_not() {
        let permit_item = FeedbagItem { group_id: 0, item_id: 0, class: FeedbagItemClass::PermitDenySetting, name: String::new(), data: vec![2] };
        let group_item = FeedbagItem { group_id: 0, item_id: 0, class: FeedbagItemClass::Group, name: "Buddies".to_string(), data: vec![] };
        assert!(item_affects_visibility(&permit_item));
        assert!(!item_affects_visibility(&group_item));
    }
}
