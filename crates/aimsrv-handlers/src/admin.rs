//! Admin food-group (`spec.md` §4.7: "screen-name reformat, email update,
//! registration-status update, account-confirmation request").

use std::sync::Arc;

use aimsrv_wire::food_group::{admin, group};
use aimsrv_wire::screen_name::ScreenName;
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{self, Tlv};

use aimsrv_core::session::Session;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

mod info_tag {
    pub const SCREEN_NAME: u16 = 0x01;
    pub const EMAIL: u16 = 0x11;
    pub const REGISTRATION_STATUS: u16 = 0x13;
}

const MAX_EMAIL_LEN: usize = 255;

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    match snac.header.subgroup {
        admin::INFO_CHANGE_REQUEST => handle_info_change(ctx, session, &snac, now),
        admin::CONFIRM_REQUEST => handle_confirm(ctx, session, &snac),
        _ => business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Body is a rest-block of TLVs, each field independently optional
/// (`spec.md` §6). Only the fields present are changed. A screen-name
/// change fires a buddy-arrival broadcast so observers' formatted names
/// refresh (`spec.md` scenario S5).
fn handle_info_change(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    let Ok(tlvs) = tlv::decode_rest(&snac.body) else {
        return business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };

    let mut reply_tlvs = Vec::new();

    if let Some(raw_name) = tlv::find(&tlvs, info_tag::SCREEN_NAME).and_then(Tlv::as_str) {
        match ScreenName::parse(raw_name) {
            Ok(screen_name) if screen_name.identity() == session.identity => {
                if ctx.engine.repo.update_display_screen_name(&session.identity, screen_name.as_str()).is_err() {
                    return business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
                }
                session.set_display_screen_name(screen_name.as_str().to_string());
                ctx.engine.buddies.broadcast_arrival(session, now);
                reply_tlvs.push(Tlv::string(info_tag::SCREEN_NAME, screen_name.as_str()));
            }
            Ok(_) => return business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC),
            Err(_) => return business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_NICKNAME_LENGTH),
        }
    }

    if let Some(email) = tlv::find(&tlvs, info_tag::EMAIL).and_then(Tlv::as_str) {
        if email.is_empty() || email.len() > MAX_EMAIL_LEN || !email.contains('@') {
            return business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
        }
        if ctx.engine.repo.update_email(&session.identity, email).is_err() {
            return business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
        }
        reply_tlvs.push(Tlv::string(info_tag::EMAIL, email));
    }

    if let Some(status) = tlv::find(&tlvs, info_tag::REGISTRATION_STATUS).and_then(Tlv::as_u16) {
        let open = status != 0;
        if ctx.engine.repo.set_registration_open(&session.identity, open).is_err() {
            return business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
        }
        reply_tlvs.push(Tlv::u16(info_tag::REGISTRATION_STATUS, status));
    }

    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::ADMIN, admin::INFO_CHANGE_REPLY, snac.header.request_id), tlv::encode_rest(&reply_tlvs)))
}

/// Marks the account unconfirmed-but-requested; actual confirmation
/// (e.g. emailing a link) is out of scope (`spec.md` §1: "credential
/// verification... out of scope").
fn handle_confirm(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac) -> HandlerOutcome {
    match ctx.engine.repo.get_account(&session.identity) {
        Ok(Some(account)) if account.confirmed => {
            business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC)
        }
        Ok(Some(_)) => HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::ADMIN, admin::CONFIRM_REPLY, snac.header.request_id), vec![0, 0])),
        Ok(None) => business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::NO_SUCH_USER),
        Err(_) => business_error(group::ADMIN, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE),
    }
}

#[cfg(test)]
mod tests {
    use super::info_tag;

    #[test]
    fn email_tag_is_distinct_from_screen_name_tag() {
        assert_ne!(info_tag::EMAIL, info_tag::SCREEN_NAME);
    }
}
