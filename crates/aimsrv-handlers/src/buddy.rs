//! Buddy (legacy, pre-feedbag) food-group (`spec.md` §4.7: "RightsQuery:
//! static caps. AddBuddies/DelBuddies: mutate the session's client-side
//! buddy set; for adds after sign-on, send unicast arrival for any online
//! buddy").

use std::sync::Arc;

use aimsrv_core::session::Session;
use aimsrv_wire::food_group::group;
use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::read_prefixed_string_8;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub mod subgroup {
    pub const RIGHTS_QUERY: u16 = 0x02;
    pub const RIGHTS_REPLY: u16 = 0x03;
    pub const ADD_BUDDIES: u16 = 0x04;
    pub const DEL_BUDDIES: u16 = 0x05;
}

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    match snac.header.subgroup {
        subgroup::RIGHTS_QUERY => HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::BUDDY, subgroup::RIGHTS_REPLY, snac.header.request_id), vec![])),
        subgroup::ADD_BUDDIES => {
            for name in screen_names(&snac.body) {
                let identity = Identity::from_display(&name);
                session.add_legacy_buddy(identity.clone());
                if session.sign_on_complete() {
                    if let Some(buddy_session) = ctx.engine.registry.lookup(&identity) {
                        ctx.engine.buddies.unicast_arrival(&buddy_session, &session.identity, now);
                    }
                }
            }
            HandlerOutcome::None
        }
        subgroup::DEL_BUDDIES => {
            for name in screen_names(&snac.body) {
                session.remove_legacy_buddy(&Identity::from_display(&name));
            }
            HandlerOutcome::None
        }
        _ => business_error(group::BUDDY, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

fn screen_names(body: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = body;
    while let Ok((name, consumed)) = read_prefixed_string_8(rest) {
        if consumed == 0 {
            break;
        }
        names.push(name);
        rest = &rest[consumed..];
        if rest.is_empty() {
            break;
        }
    }
    names
}
