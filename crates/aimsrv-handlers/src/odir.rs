//! ODir food-group (`spec.md` §4.7: "directory search where exactly one
//! of {email, keyword, name-and-address} drives the query").

use std::sync::Arc;

use aimsrv_db::model::DirectoryQuery;
use aimsrv_wire::food_group::{group, odir};
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{self, Tlv};

use aimsrv_core::session::Session;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

mod info_tag {
    pub const FIRST_NAME: u16 = 0x01;
    pub const LAST_NAME: u16 = 0x02;
    pub const MIDDLE_NAME: u16 = 0x03;
    pub const MAIDEN_NAME: u16 = 0x04;
    pub const COUNTRY: u16 = 0x06;
    pub const STATE: u16 = 0x07;
    pub const CITY: u16 = 0x08;
    pub const NICKNAME: u16 = 0x0C;
    pub const ZIP: u16 = 0x0D;
    pub const ADDRESS: u16 = 0x21;
    pub const EMAIL: u16 = 0x0A;
    pub const KEYWORD: u16 = 0x0E;
}

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac) -> HandlerOutcome {
    match snac.header.subgroup {
        odir::INFO_QUERY => handle_info_query(ctx, session, &snac),
        odir::SEARCH_QUERY => handle_search(ctx, &snac),
        _ => business_error(group::ODIR, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Body is a rest-block of profile-field TLVs; stores them as the
/// caller's directory profile (`spec.md` §4.7, §6).
fn handle_info_query(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac) -> HandlerOutcome {
    let Ok(tlvs) = tlv::decode_rest(&snac.body) else {
        return business_error(group::ODIR, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };
    let profile = aimsrv_db::model::DirectoryProfile {
        identity: session.identity.as_str().to_string(),
        email: str_field(&tlvs, info_tag::EMAIL),
        first_name: str_field(&tlvs, info_tag::FIRST_NAME),
        last_name: str_field(&tlvs, info_tag::LAST_NAME),
        middle_name: str_field(&tlvs, info_tag::MIDDLE_NAME),
        maiden_name: str_field(&tlvs, info_tag::MAIDEN_NAME),
        country: str_field(&tlvs, info_tag::COUNTRY),
        state: str_field(&tlvs, info_tag::STATE),
        city: str_field(&tlvs, info_tag::CITY),
        nickname: str_field(&tlvs, info_tag::NICKNAME),
        zip: str_field(&tlvs, info_tag::ZIP),
        address: str_field(&tlvs, info_tag::ADDRESS),
        interests: Vec::new(),
    };
    if ctx.engine.repo.set_directory_profile(profile).is_err() {
        return business_error(group::ODIR, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    }
    HandlerOutcome::None
}

/// Exactly one of {email, keyword, name-and-address} must drive the
/// query (`spec.md` §4.7); anything else is a protocol error.
fn handle_search(ctx: &HandlerContext, snac: &Snac) -> HandlerOutcome {
    let Ok(tlvs) = tlv::decode_rest(&snac.body) else {
        return business_error(group::ODIR, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };

    let Some(query) = build_query(&tlvs) else {
        return business_error(group::ODIR, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    };

    let Ok(results) = ctx.engine.repo.search_directory(&query) else {
        return business_error(group::ODIR, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    };

    let mut body = Vec::new();
    body.extend_from_slice(&(results.len() as u16).to_be_bytes());
    for profile in &results {
        tlv::write_prefixed_string_16(&mut body, &profile.identity);
    }
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::ODIR, odir::SEARCH_REPLY, snac.header.request_id), body))
}

fn build_query(tlvs: &[Tlv]) -> Option<DirectoryQuery> {
    let email = tlv::find(tlvs, info_tag::EMAIL).and_then(Tlv::as_str);
    let keyword = tlv::find(tlvs, info_tag::KEYWORD).and_then(Tlv::as_str);
    let first_name = tlv::find(tlvs, info_tag::FIRST_NAME).and_then(Tlv::as_str);
    let last_name = tlv::find(tlvs, info_tag::LAST_NAME).and_then(Tlv::as_str);

    match (email, keyword, first_name.or(last_name)) {
        (Some(email), None, None) => Some(DirectoryQuery::Email(email.to_string())),
        (None, Some(keyword), None) => Some(DirectoryQuery::Keyword(keyword.to_string())),
        (None, None, Some(_)) => Some(DirectoryQuery::NameAndAddress {
            first_name: str_field(tlvs, info_tag::FIRST_NAME),
            last_name: str_field(tlvs, info_tag::LAST_NAME),
            city: str_field(tlvs, info_tag::CITY),
            state: str_field(tlvs, info_tag::STATE),
            country: str_field(tlvs, info_tag::COUNTRY),
        }),
        _ => None,
    }
}

fn str_field(tlvs: &[Tlv], tag: u16) -> String {
    tlv::find(tlvs, tag).and_then(Tlv::as_str).unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_and_keyword_together_is_rejected() {
        let tlvs = vec![Tlv::string(info_tag::EMAIL, "a@b.com"), Tlv::string(info_tag::KEYWORD, "chess")];
        assert!(build_query(&tlvs).is_none());
    }

    #[test]
    fn email_alone_builds_an_email_query() {
        let tlvs = vec![Tlv::string(info_tag::EMAIL, "a@b.com")];
        assert!(matches!(build_query(&tlvs), Some(DirectoryQuery::Email(e)) if e == "a@b.com"));
    }

    #[test]
    fn last_name_alone_builds_a_name_and_address_query() {
        let tlvs = vec![Tlv::string(info_tag::LAST_NAME, "Doe")];
        assert!(matches!(build_query(&tlvs), Some(DirectoryQuery::NameAndAddress { .. })));
    }
}
