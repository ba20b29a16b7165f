//! ChatNav food-group (`spec.md` §4.7: "create room, list exchanges, query
//! room info").

use std::sync::Arc;

use aimsrv_core::chatroom::{PRIVATE_EXCHANGE, PUBLIC_EXCHANGE};
use aimsrv_core::session::Session;
use aimsrv_wire::food_group::{chat_nav, group};
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{self, Tlv};

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    match snac.header.subgroup {
        chat_nav::REQUEST_CHAT_RIGHTS => HandlerOutcome::Reply(Snac::new(
            SnacHeader::new(group::CHAT_NAV, chat_nav::NAV_REPLY, snac.header.request_id),
            vec![],
        )),
        chat_nav::REQUEST_EXCHANGE_INFO => handle_exchange_info(ctx, &snac),
        chat_nav::REQUEST_ROOM_INFO => handle_room_info(ctx, &snac),
        chat_nav::CREATE_ROOM => handle_create_room(ctx, session, &snac, now),
        _ => business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

fn handle_exchange_info(ctx: &HandlerContext, snac: &Snac) -> HandlerOutcome {
    let exchange = snac.body.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]])).unwrap_or(PUBLIC_EXCHANGE);
    let rooms = ctx.engine.chat_rooms.list_exchange(exchange);
    let mut body = Vec::new();
    body.extend_from_slice(&exchange.to_be_bytes());
    body.extend_from_slice(&(rooms.len() as u16).to_be_bytes());
    for room in rooms {
        tlv::write_prefixed_string_16(&mut body, &room.cookie);
    }
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::CHAT_NAV, chat_nav::NAV_REPLY, snac.header.request_id), body))
}

fn handle_room_info(ctx: &HandlerContext, snac: &Snac) -> HandlerOutcome {
    let Ok((cookie, _)) = tlv::read_prefixed_string_16(&snac.body) else {
        return business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let Some(room) = ctx.engine.chat_rooms.lookup(&cookie) else {
        return business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_FOUND);
    };
    let tlvs = vec![
        Tlv::string(0x01, &room.cookie),
        Tlv::string(0x02, &room.display_name),
        Tlv::u16(0x03, room.exchange),
        Tlv::u16(0x04, room.instance),
    ];
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::CHAT_NAV, chat_nav::NAV_REPLY, snac.header.request_id), tlv::encode_rest(&tlvs)))
}

/// Body: exchange (2 BE), instance (2 BE), display name (2-byte-prefixed
/// string), detail level (1 byte) (`spec.md` §4.7, §4.8: cookie is
/// `"{exchange}-{instance}-{name}"`).
fn handle_create_room(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    if snac.body.len() < 4 {
        return business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    }
    let exchange = u16::from_be_bytes([snac.body[0], snac.body[1]]);
    let instance = u16::from_be_bytes([snac.body[2], snac.body[3]]);
    let Ok((display_name, consumed)) = tlv::read_prefixed_string_16(&snac.body[4..]) else {
        return business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let detail_level = snac.body.get(4 + consumed).copied().unwrap_or(0);

    if exchange != PUBLIC_EXCHANGE && exchange != PRIVATE_EXCHANGE {
        return business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    }

    match ctx.engine.chat_rooms.create(exchange, instance, session.identity.clone(), display_name, detail_level, now) {
        Ok(room) => {
            let tlvs = vec![Tlv::string(0x01, &room.cookie), Tlv::u16(0x03, room.exchange)];
            HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::CHAT_NAV, chat_nav::NAV_REPLY, snac.header.request_id), tlv::encode_rest(&tlvs)))
        }
        Err(_) => business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE),
    }
}
