//! User Lookup food-group (`spec.md` §4.7: "a thin request/response
//! surface over the repository"): find a screen name by its account
//! email.

use std::sync::Arc;

use aimsrv_wire::food_group::{group, user_lookup};
use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{read_prefixed_string_8, write_prefixed_string_8};

use aimsrv_core::session::Session;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

pub fn handle(ctx: &HandlerContext, _session: &Arc<Session>, snac: Snac) -> HandlerOutcome {
    match snac.header.subgroup {
        user_lookup::FIND_BY_EMAIL => handle_find_by_email(ctx, &snac),
        _ => business_error(group::USER_LOOKUP, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

fn handle_find_by_email(ctx: &HandlerContext, snac: &Snac) -> HandlerOutcome {
    let Ok((email, _)) = read_prefixed_string_8(&snac.body) else {
        return business_error(group::USER_LOOKUP, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };

    let query = aimsrv_db::model::DirectoryQuery::Email(email);
    let Ok(matches) = ctx.engine.repo.search_directory(&query) else {
        return business_error(group::USER_LOOKUP, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    };
    let Some(profile) = matches.into_iter().next() else {
        return business_error(group::USER_LOOKUP, snac.header.request_id, aimsrv_wire::food_group::error_code::NO_SUCH_USER);
    };

    let identity = Identity::from_display(&profile.identity);
    let display = ctx.engine.repo.get_account(&identity).ok().flatten().map(|a| a.display_screen_name).unwrap_or(profile.identity);

    let mut body = Vec::new();
    write_prefixed_string_8(&mut body, &display);
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::USER_LOOKUP, user_lookup::FIND_REPLY, snac.header.request_id), body))
}
