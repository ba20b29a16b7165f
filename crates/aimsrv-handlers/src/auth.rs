//! BUCP (auth service) food-group (`spec.md` §4.7, §4.8). Credential
//! verification is explicitly out of scope (`spec.md` §1: "credential
//! verification (MD5/roasted-password schemes)"); the password-hash TLV is
//! stored but never checked. A login exchange is a single request/response
//! with no session state, so it runs outside [`crate::dispatch`] and the
//! session registry entirely — the server binary calls [`handle_login`]
//! directly off a short-lived auth connection.

use aimsrv_core::Engine;
use aimsrv_db::model::Account;
use aimsrv_wire::food_group::{bucp, error_code, group, service_code};
use aimsrv_wire::screen_name::{Identity, ScreenName};
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{self, Tlv};

pub mod info_tag {
    pub const SCREEN_NAME: u16 = 0x01;
    pub const PASSWORD_HASH: u16 = 0x02;
    pub const BOS_HOST: u16 = 0x05;
    pub const COOKIE: u16 = 0x06;
    pub const EMAIL: u16 = 0x11;
    pub const ERROR_CODE: u16 = 0x08;
}

/// Handles a `LoginRequest`: looks up (or, if registration is open,
/// creates) the account, then issues a cookie redirecting the client to the
/// BOS service at `advertised_bos`.
pub fn handle_login(engine: &Engine, snac: &Snac, advertised_bos: &str, now: u64) -> Snac {
    if snac.header.food_group != group::BUCP || snac.header.subgroup != bucp::LOGIN_REQUEST {
        return error(snac, error_code::NOT_SUPPORTED_BY_HOST);
    }

    let Ok(tlvs) = tlv::decode_rest(&snac.body) else {
        return error(snac, error_code::INVALID_SNAC);
    };
    let Some(raw_name) = tlv::find(&tlvs, info_tag::SCREEN_NAME).and_then(Tlv::as_str) else {
        return error(snac, error_code::INVALID_SNAC);
    };
    let Ok(screen_name) = ScreenName::parse(raw_name) else {
        return error(snac, error_code::INVALID_NICKNAME_LENGTH);
    };
    let password_hash = tlv::find(&tlvs, info_tag::PASSWORD_HASH).map(|t| t.value.clone()).unwrap_or_default();
    let identity: Identity = screen_name.identity();

    let account = match engine.repo.get_account(&identity) {
        Ok(Some(account)) => account,
        Ok(None) => match provision(engine, &screen_name, password_hash, now) {
            Some(account) => account,
            None => return error(snac, error_code::NO_SUCH_USER),
        },
        Err(_) => return error(snac, error_code::SERVICE_UNAVAILABLE),
    };

    let cookie = engine.cookies.issue(service_code::BOS, &account.display_screen_name, None, None, false, now);
    let reply_tlvs = vec![
        Tlv::string(info_tag::SCREEN_NAME, &account.display_screen_name),
        Tlv::string(info_tag::BOS_HOST, advertised_bos),
        Tlv::new(info_tag::COOKIE, cookie.into_bytes()),
        Tlv::string(info_tag::EMAIL, &account.email),
    ];
    Snac::new(SnacHeader::new(group::BUCP, bucp::LOGIN_RESPONSE, snac.header.request_id), tlv::encode_rest(&reply_tlvs))
}

fn provision(engine: &Engine, screen_name: &ScreenName, password_hash: Vec<u8>, now: u64) -> Option<Account> {
    if !engine.registration_open {
        return None;
    }
    let account = Account {
        identity: screen_name.identity(),
        display_screen_name: screen_name.as_str().to_string(),
        password_hash,
        email: String::new(),
        confirmed: false,
        uin: None,
        created_at: now,
        profile: String::new(),
        registration_open: true,
    };
    engine.repo.create_account(account.clone()).ok().map(|()| account)
}

fn error(snac: &Snac, code: u16) -> Snac {
    let body = tlv::encode_rest(&[Tlv::u16(info_tag::ERROR_CODE, code)]);
    Snac::new(SnacHeader::new(group::BUCP, aimsrv_wire::food_group::ERROR_SUBGROUP, snac.header.request_id), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_screen_name_is_rejected() {
        let body = tlv::encode_rest(&[Tlv::string(info_tag::SCREEN_NAME, "   ")]);
        let snac = Snac::new(SnacHeader::new(group::BUCP, bucp::LOGIN_REQUEST, 1), body);
        let reply = handle_login(&test_engine(), &snac, "127.0.0.1:5191", 0);
        assert_eq!(reply.header.subgroup, aimsrv_wire::food_group::ERROR_SUBGROUP);
    }

    fn test_engine() -> Engine {
        let repo: std::sync::Arc<dyn aimsrv_db::Repository> = std::sync::Arc::new(aimsrv_db::memory::InMemoryRepository::new());
        Engine::new(repo, [1u8; 32], true).unwrap()
    }
}
