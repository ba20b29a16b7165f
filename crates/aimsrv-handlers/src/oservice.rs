//! OService handlers (`spec.md` §4.7): ubiquitous bookkeeping present on
//! every logical service.

use std::sync::Arc;

use aimsrv_core::session::Session;
use aimsrv_wire::food_group::{group, oservice};
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{self, Tlv};

use crate::context::{HandlerContext, ServiceKind};
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub mod info_tag {
    pub const SCREEN_NAME: u16 = 0x01;
    pub const RECONNECT_HOST: u16 = 0x05;
    pub const COOKIE: u16 = 0x06;
}

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    match snac.header.subgroup {
        oservice::CLIENT_VERSIONS => handle_client_versions(session, &snac),
        oservice::RATE_PARAMS_QUERY => handle_rate_params_query(ctx, &snac),
        oservice::RATE_PARAMS_SUB_ADD => handle_rate_params_sub_add(session, &snac),
        oservice::USER_INFO_QUERY => handle_user_info_query(session, &snac, now),
        oservice::SET_USER_INFO_FIELDS => handle_set_user_info_fields(ctx, session, &snac, now),
        oservice::IDLE_NOTIFICATION => handle_idle_notification(ctx, session, &snac, now),
        oservice::SERVICE_REQUEST => handle_service_request(ctx, session, &snac, now),
        oservice::CLIENT_ONLINE => handle_client_online(ctx, session, &snac, now),
        _ => business_error(group::OSERVICE, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Records the advertised (food-group, version) pairs on the session and
/// echoes them back verbatim (`spec.md` §4.7: "the server does not
/// negotiate but records them on the session").
fn handle_client_versions(session: &Arc<Session>, snac: &Snac) -> HandlerOutcome {
    for pair in snac.body.chunks_exact(4) {
        let fg = u16::from_be_bytes([pair[0], pair[1]]);
        let version = u16::from_be_bytes([pair[2], pair[3]]);
        session.record_food_group_version(fg, version);
    }
    HandlerOutcome::Reply(Snac::new(
        SnacHeader::new(group::OSERVICE, oservice::HOST_VERSIONS, snac.header.request_id),
        snac.body.clone(),
    ))
}

/// Responds with the full rate-class table (`spec.md` §4.7: "the table
/// must be complete").
fn handle_rate_params_query(ctx: &HandlerContext, snac: &Snac) -> HandlerOutcome {
    let mut body = Vec::new();
    body.extend_from_slice(&(ctx.engine.rate_classes.len() as u16).to_be_bytes());
    for class in ctx.engine.rate_classes {
        body.extend_from_slice(&class.id.to_be_bytes());
        body.extend_from_slice(&class.window_size_ms.to_be_bytes());
        body.extend_from_slice(&class.clear_level.to_be_bytes());
        body.extend_from_slice(&class.alert_level.to_be_bytes());
        body.extend_from_slice(&class.limit_level.to_be_bytes());
        body.extend_from_slice(&class.disconnect_level.to_be_bytes());
        body.extend_from_slice(&class.max_level.to_be_bytes());
    }
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::OSERVICE, oservice::RATE_PARAMS_REPLY, snac.header.request_id), body))
}

fn handle_rate_params_sub_add(session: &Arc<Session>, snac: &Snac) -> HandlerOutcome {
    for pair in snac.body.chunks_exact(2) {
        session.subscribe_rate_class(u16::from_be_bytes([pair[0], pair[1]]));
    }
    HandlerOutcome::None
}

fn handle_user_info_query(session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    let tlvs = session.user_info_snapshot(now);
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::OSERVICE, oservice::USER_INFO_UPDATE, snac.header.request_id), tlv::encode_rest(&tlvs)))
}

/// Flips the invisible bit and fires the matching broadcast (`spec.md`
/// §4.7: "transition invisible<->visible triggers departure or arrival
/// broadcast respectively").
fn handle_set_user_info_fields(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    let Ok(tlvs) = tlv::decode_rest(&snac.body) else {
        return business_error(group::OSERVICE, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    if let Some(privacy) = tlv::find(&tlvs, 0x06).and_then(Tlv::as_u16) {
        let was_invisible = session.invisible();
        let now_invisible = privacy & aimsrv_core::session::class_flag::INVISIBLE != 0;
        if was_invisible != now_invisible {
            session.set_invisible(now_invisible);
            if now_invisible {
                ctx.engine.buddies.broadcast_departure(session);
            } else {
                ctx.engine.buddies.broadcast_arrival(session, now);
            }
        }
    }
    HandlerOutcome::None
}

/// `idle-time=0` clears idle and re-arrives; positive sets idle-since
/// (`spec.md` §4.7).
fn handle_idle_notification(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    let idle_seconds = snac.body.get(0..4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]])).unwrap_or(0);
    if idle_seconds == 0 {
        session.set_idle(None);
    } else {
        session.set_idle(Some(now.saturating_sub(idle_seconds as u64)));
    }
    ctx.engine.buddies.broadcast_arrival(session, now);
    HandlerOutcome::None
}

/// Issues a signed cookie for cross-service handoff (`spec.md` §4.7, C8).
/// BOS-only; Chat requires an existing room cookie in TLV(0x01).
fn handle_service_request(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    if ctx.service != ServiceKind::Bos {
        return business_error(group::OSERVICE, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST);
    }
    let Some(requested_fg) = snac.body.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]])) else {
        return business_error(group::OSERVICE, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let Ok(tlvs) = tlv::decode_rest(snac.body.get(2..).unwrap_or(&[])) else {
        return business_error(group::OSERVICE, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };

    let room_cookie = if requested_fg == group::CHAT {
        let Some(cookie) = tlv::find(&tlvs, 0x01).and_then(Tlv::as_str) else {
            return business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_FOUND);
        };
        if ctx.engine.chat_rooms.lookup(cookie).is_none() {
            return business_error(group::CHAT_NAV, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_FOUND);
        }
        Some(cookie.to_string())
    } else {
        None
    };

    let cookie = ctx.engine.cookies.issue(requested_fg, &session.display_screen_name(), None, room_cookie.as_deref(), false, now);

    let reconnect_host = ctx.service_addrs.for_food_group(requested_fg);
    let reply_tlvs = vec![Tlv::string(info_tag::RECONNECT_HOST, reconnect_host), Tlv::new(info_tag::COOKIE, cookie.into_bytes())];
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::OSERVICE, oservice::SERVICE_RESPONSE, snac.header.request_id), tlv::encode_rest(&reply_tlvs)))
}

/// Marks sign-on complete, then broadcasts visibility (`spec.md` §4.7,
/// "ClientOnline (BOS)"). On Chat, instead follows the exact order
/// "send participant list to joining user, send room-info to joining
/// user, broadcast arrival to other participants" — reordering this
/// breaks certain clients.
fn handle_client_online(ctx: &HandlerContext, session: &Arc<Session>, _snac: &Snac, now: u64) -> HandlerOutcome {
    session.mark_sign_on_complete();
    match ctx.service {
        ServiceKind::Bos => {
            ctx.engine.buddies.broadcast_arrival(session, now);
            ctx.engine.icbm.deliver_offline_backlog(session);
        }
        ServiceKind::Chat => {
            if let Some(cookie) = session.chat_room_cookie() {
                crate::chat::announce_join(ctx, session, &cookie, now);
            }
        }
        _ => {}
    }
    HandlerOutcome::None
}

/// Server-originated on connect: enumerates which food groups this
/// service handles (`spec.md` §4.7, "HostOnline").
pub fn host_online(food_groups: &[u16]) -> Snac {
    let mut body = Vec::with_capacity(food_groups.len() * 2);
    for fg in food_groups {
        body.extend_from_slice(&fg.to_be_bytes());
    }
    Snac::new(SnacHeader::server_originated(group::OSERVICE, oservice::HOST_ONLINE), body)
}
