//! Locate food-group: user-info and directory-profile lookups
//! (`spec.md` §2, C7 contract list — minimal shape, not detailed by name).

use std::sync::Arc;

use aimsrv_core::session::Session;
use aimsrv_wire::food_group::group;
use aimsrv_wire::snac::Snac;

use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub mod subgroup {
    pub const RIGHTS_QUERY: u16 = 0x02;
    pub const RIGHTS_REPLY: u16 = 0x03;
    pub const SET_INFO: u16 = 0x04;
    pub const USER_INFO_QUERY: u16 = 0x05;
    pub const USER_INFO_REPLY: u16 = 0x06;
}

pub fn handle(_ctx: &crate::context::HandlerContext, session: &Arc<Session>, snac: Snac) -> HandlerOutcome {
    match snac.header.subgroup {
        subgroup::RIGHTS_QUERY => HandlerOutcome::Reply(Snac::new(
            aimsrv_wire::snac::SnacHeader::new(group::LOCATE, subgroup::RIGHTS_REPLY, snac.header.request_id),
            vec![],
        )),
        subgroup::SET_INFO => {
            if let Ok(text) = String::from_utf8(snac.body.clone()) {
                session.set_away(if text.is_empty() { None } else { Some(text) });
            }
            HandlerOutcome::None
        }
        subgroup::USER_INFO_QUERY => HandlerOutcome::Reply(Snac::new(
            aimsrv_wire::snac::SnacHeader::new(group::LOCATE, subgroup::USER_INFO_REPLY, snac.header.request_id),
            aimsrv_wire::tlv::encode_rest(&session.user_info_snapshot(0)),
        )),
        _ => business_error(group::LOCATE, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}
