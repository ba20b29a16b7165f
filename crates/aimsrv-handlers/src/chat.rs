//! Chat food-group (`spec.md` §4.7, §4.9): room-scoped message relay and
//! join/leave announcements.

use std::sync::Arc;

use rand::Rng;

use aimsrv_core::session::Session;
use aimsrv_wire::food_group::{chat, group};
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{self, Tlv};

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

/// Tags on the inbound `ChannelMsgToHost` body.
pub mod info_tag {
    pub const MESSAGE: u16 = 0x01;
    pub const WHISPER: u16 = 0x02;
    pub const REFLECT: u16 = 0x03;
}

/// Tags on the outbound `ChannelMsgToClient` body, emitted in the canonical
/// order (sender-info, public-whisper flag, message-info) AIM 2.x expects
/// (`spec.md` §4.7).
mod out_tag {
    pub const SENDER_INFO: u16 = 0x01;
    pub const PUBLIC_WHISPER: u16 = 0x02;
    pub const MESSAGE_INFO: u16 = 0x03;
}

/// The well-known sender identity synthetic server messages (`//roll`) are
/// attributed to (`spec.md` §4.7).
const ONLINE_HOST: &str = "OnlineHost";

const DEFAULT_DICE: u32 = 2;
const DEFAULT_SIDES: u32 = 6;
const MAX_DICE: u32 = 15;
const MAX_SIDES: u32 = 999;

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    match snac.header.subgroup {
        chat::CHANNEL_MSG_TO_HOST => handle_message(ctx, session, &snac, now),
        _ => business_error(group::CHAT, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Body is a rest-block of TLVs (`spec.md` §6). The reflection flag
/// (TLV 0x03) with no accompanying message TLV is a protocol error
/// (`SPEC_FULL.md` §4, resolving the matching Open Question): the server
/// neither relays nor reflects in that case.
fn handle_message(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    let Some(cookie) = session.chat_room_cookie() else {
        return business_error(group::CHAT, snac.header.request_id, aimsrv_wire::food_group::error_code::INSUFFICIENT_RIGHTS);
    };
    let Ok(tlvs) = tlv::decode_rest(&snac.body) else {
        return business_error(group::CHAT, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let reflect_requested = tlv::find(&tlvs, info_tag::REFLECT).is_some();
    let whisper = tlv::find(&tlvs, info_tag::WHISPER).is_some();
    let Some(message) = tlv::find(&tlvs, info_tag::MESSAGE) else {
        if reflect_requested {
            return business_error(group::CHAT, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
        }
        return HandlerOutcome::None;
    };

    if let Some((dice, sides)) = parse_roll(&String::from_utf8_lossy(&message.value)) {
        let results = roll(dice, sides);
        let text = format_roll(&session.display_screen_name(), dice, sides, &results);
        let outbound = message_snac(ONLINE_HOST, false, &text);
        ctx.engine.relayer.relay_to_room(&cookie, &outbound);
        return HandlerOutcome::None;
    }

    let outbound = message_snac(&session.display_screen_name(), whisper, &String::from_utf8_lossy(&message.value));
    if reflect_requested {
        ctx.engine.relayer.relay_to_room(&cookie, &outbound);
    } else {
        ctx.engine.relayer.relay_to_room_except(&cookie, &session.identity, &outbound);
    }
    HandlerOutcome::None
}

fn message_snac(sender: &str, whisper: bool, text: &str) -> Snac {
    let body = tlv::encode_rest(&[Tlv::string(out_tag::SENDER_INFO, sender), Tlv::u8(out_tag::PUBLIC_WHISPER, u8::from(whisper)), Tlv::string(out_tag::MESSAGE_INFO, text)]);
    Snac::new(SnacHeader::server_originated(group::CHAT, chat::CHANNEL_MSG_TO_CLIENT), body)
}

/// Parses a `//roll[-sides<N>][-dice<N>]` command (`spec.md` §4.7). Returns
/// `None` for anything else, including a malformed `//roll` that should
/// just be relayed as ordinary text.
fn parse_roll(text: &str) -> Option<(u32, u32)> {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();
    let mut rest = lower.strip_prefix("//roll")?;

    let mut dice = DEFAULT_DICE;
    let mut sides = DEFAULT_SIDES;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("-sides") {
            let (n, tail) = take_digits(tail)?;
            sides = n.clamp(1, MAX_SIDES);
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("-dice") {
            let (n, tail) = take_digits(tail)?;
            dice = n.clamp(1, MAX_DICE);
            rest = tail;
        } else {
            return None;
        }
    }
    Some((dice, sides))
}

fn take_digits(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse::<u32>().ok().map(|n| (n, &s[end..]))
}

fn roll(dice: u32, sides: u32) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..dice).map(|_| rng.gen_range(1..=sides)).collect()
}

fn format_roll(roller: &str, dice: u32, sides: u32, results: &[u32]) -> String {
    let total: u32 = results.iter().sum();
    let rolls = results.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
    format!("{roller} rolled {dice} {sides}-sided dice: {rolls}. Total: {total}.")
}

#[cfg(test)]
mod roll_tests {
    use super::*;

    #[test]
    fn bare_roll_uses_default_dice_and_sides() {
        assert_eq!(parse_roll("//roll"), Some((DEFAULT_DICE, DEFAULT_SIDES)));
    }

    #[test]
    fn roll_with_explicit_dice_and_sides_is_parsed() {
        assert_eq!(parse_roll("//roll-dice3-sides20"), Some((3, 20)));
    }

    #[test]
    fn roll_caps_are_enforced() {
        assert_eq!(parse_roll("//roll-dice99-sides5000"), Some((MAX_DICE, MAX_SIDES)));
    }

    #[test]
    fn non_roll_text_is_not_intercepted() {
        assert_eq!(parse_roll("hello there"), None);
    }

    #[test]
    fn malformed_roll_suffix_is_not_intercepted() {
        assert_eq!(parse_roll("//roll-banana"), None);
    }
}

/// Chat's `ClientOnline` order (`spec.md` §4.7): participant list, then
/// room info, then arrival broadcast to the rest of the room.
pub fn announce_join(ctx: &HandlerContext, session: &Arc<Session>, cookie: &str, now: u64) {
    ctx.engine.chat_rooms.note_join(cookie);
    ctx.engine.registry.register_chat(cookie.to_string(), session.clone());

    let occupants = ctx.engine.registry.chat_occupants(cookie);
    let mut participants_body = Vec::new();
    participants_body.extend_from_slice(&(occupants.len() as u16).to_be_bytes());
    for occupant in &occupants {
        participants_body.extend_from_slice(&tlv::encode_rest(&occupant.user_info_snapshot(now)));
    }
    session.enqueue(aimsrv_core::session::Outbound::Snac(Snac::new(
        SnacHeader::server_originated(group::CHAT, chat::USERS_JOINED),
        participants_body,
    )));

    if let Some(room) = ctx.engine.chat_rooms.lookup(cookie) {
        let info_tlvs = vec![Tlv::string(0x01, &room.cookie), Tlv::string(0x02, &room.display_name)];
        session.enqueue(aimsrv_core::session::Outbound::Snac(Snac::new(
            SnacHeader::server_originated(group::CHAT, chat::ROOM_INFO_UPDATE),
            tlv::encode_rest(&info_tlvs),
        )));
    }

    let arrival_body = tlv::encode_rest(&session.user_info_snapshot(now));
    let arrival = Snac::new(SnacHeader::server_originated(group::CHAT, chat::USERS_JOINED), arrival_body);
    ctx.engine.relayer.relay_to_room_except(cookie, &session.identity, &arrival);
}

/// Fired on connection close for a chat session (`spec.md` §4.9: "leave
/// likewise" — unregister membership, then announce departure).
pub fn announce_leave(ctx: &HandlerContext, session: &Arc<Session>, cookie: &str) {
    ctx.engine.registry.deregister_chat(cookie, &session.identity);
    ctx.engine.chat_rooms.note_leave(cookie);
    let departure = Snac::new(SnacHeader::server_originated(group::CHAT, chat::USERS_LEFT), tlv::encode_rest(&session.minimal_user_info()));
    ctx.engine.relayer.relay_to_room(cookie, &departure);
}
