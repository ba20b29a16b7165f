//! Alert food-group (`spec.md` §4.7: "a thin request/response surface
//! over the repository"). This server has no mail-checking backend to
//! notify about, so the only request it answers is the notify-settings
//! query, always with "nothing to report".

use std::sync::Arc;

use aimsrv_wire::food_group::{alert, group};
use aimsrv_wire::snac::{Snac, SnacHeader};

use aimsrv_core::session::Session;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub fn handle(_ctx: &HandlerContext, _session: &Arc<Session>, snac: Snac) -> HandlerOutcome {
    match snac.header.subgroup {
        alert::NOTIFY_REQUEST => {
            HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::ALERT, alert::NOTIFY_REQUEST, snac.header.request_id), vec![]))
        }
        _ => business_error(group::ALERT, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}
