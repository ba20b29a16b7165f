//! Service-dispatch cookies (`spec.md` §4.8, C8): signed opaque blobs that
//! hand a connection off from the BOS server to another logical service
//! (Chat, ChatNav, BART, Admin, Alert, ODir) without a second
//! authentication round-trip.

use aimsrv_wire::tlv::{read_prefixed_string_16, write_prefixed_string_16};

use crate::error::{CoreError, Result};

/// Cookies older than this are rejected by the receiving service (`spec.md`
/// §4.8: "the receiving service may enforce a maximum age").
pub const MAX_COOKIE_AGE_SECONDS: u64 = 300;

/// The parsed, verified payload of a cookie (`spec.md` §4.8 field list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePayload {
    pub service_code: u16,
    pub display_screen_name: String,
    pub client_id: Option<String>,
    pub chat_room_cookie: Option<String>,
    pub multi_conn: bool,
    pub issued_at: u64,
}

/// Process-wide signing authority for service-dispatch cookies. The key is
/// generated once at boot and never persisted (`spec.md` §8, "global
/// state... initialized once; no teardown short of process exit").
pub struct CookieSigner {
    key: [u8; 32],
}

impl CookieSigner {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn generate_key() -> [u8; 32] {
        rand::random()
    }

    /// Issues a signed cookie for the given payload fields at time `now`.
    pub fn issue(
        &self,
        service_code: u16,
        display_screen_name: &str,
        client_id: Option<&str>,
        chat_room_cookie: Option<&str>,
        multi_conn: bool,
        now: u64,
    ) -> String {
        let mut body = Vec::new();
        body.extend_from_slice(&service_code.to_be_bytes());
        write_prefixed_string_16(&mut body, display_screen_name);
        write_prefixed_string_16(&mut body, client_id.unwrap_or(""));
        write_prefixed_string_16(&mut body, chat_room_cookie.unwrap_or(""));
        body.push(u8::from(multi_conn));
        body.extend_from_slice(&now.to_be_bytes());

        let mac = self.mac(&body);
        let mut out = body;
        out.extend_from_slice(mac.as_bytes());
        hex::encode(out)
    }

    /// Verifies the MAC, checks `expected_service`, enforces the max-age
    /// window, and parses the payload fields (`spec.md` §4.8: "any replay
    /// across services is rejected because the service code must match").
    pub fn crack(&self, cookie: &str, expected_service: u16, now: u64) -> Result<CookiePayload> {
        let raw = hex::decode(cookie).map_err(|_| CoreError::InvalidCookie("not valid hex"))?;
        if raw.len() < 32 {
            return Err(CoreError::InvalidCookie("too short to contain a MAC"));
        }
        let (body, tag) = raw.split_at(raw.len() - 32);
        let expected_mac = self.mac(body);
        if expected_mac.as_bytes() != tag {
            return Err(CoreError::InvalidCookie("MAC verification failed"));
        }

        let mut rest = body;
        if rest.len() < 2 {
            return Err(CoreError::InvalidCookie("missing service code"));
        }
        let service_code = u16::from_be_bytes([rest[0], rest[1]]);
        rest = &rest[2..];

        let (display_screen_name, consumed) = read_prefixed_string_16(rest).map_err(|_| CoreError::InvalidCookie("malformed screen name field"))?;
        rest = &rest[consumed..];

        let (client_id_raw, consumed) = read_prefixed_string_16(rest).map_err(|_| CoreError::InvalidCookie("malformed client id field"))?;
        rest = &rest[consumed..];

        let (room_raw, consumed) = read_prefixed_string_16(rest).map_err(|_| CoreError::InvalidCookie("malformed room cookie field"))?;
        rest = &rest[consumed..];

        if rest.len() < 1 + 8 {
            return Err(CoreError::InvalidCookie("missing flag/timestamp trailer"));
        }
        let multi_conn = rest[0] != 0;
        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&rest[1..9]);
        let issued_at = u64::from_be_bytes(ts_bytes);

        if service_code != expected_service {
            return Err(CoreError::InvalidCookie("issued for a different service"));
        }
        if now.saturating_sub(issued_at) > MAX_COOKIE_AGE_SECONDS {
            return Err(CoreError::InvalidCookie("expired"));
        }

        Ok(CookiePayload {
            service_code,
            display_screen_name,
            client_id: if client_id_raw.is_empty() { None } else { Some(client_id_raw) },
            chat_room_cookie: if room_raw.is_empty() { None } else { Some(room_raw) },
            multi_conn,
            issued_at,
        })
    }

    fn mac(&self, body: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(&self.key, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_cookie_cracks_back_to_the_same_payload() {
        let signer = CookieSigner::new([7u8; 32]);
        let cookie = signer.issue(0x0E, "Alice", None, Some("4-1-room"), false, 1_000);
        let payload = signer.crack(&cookie, 0x0E, 1_010).unwrap();
        assert_eq!(payload.display_screen_name, "Alice");
        assert_eq!(payload.chat_room_cookie.as_deref(), Some("4-1-room"));
        assert!(!payload.multi_conn);
    }

    #[test]
    fn cookie_for_wrong_service_is_rejected() {
        let signer = CookieSigner::new([7u8; 32]);
        let cookie = signer.issue(0x0E, "Alice", None, None, false, 0);
        let err = signer.crack(&cookie, 0x10, 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCookie(_)));
    }

    #[test]
    fn expired_cookie_is_rejected() {
        let signer = CookieSigner::new([7u8; 32]);
        let cookie = signer.issue(0x0E, "Alice", None, None, false, 0);
        let err = signer.crack(&cookie, 0x0E, MAX_COOKIE_AGE_SECONDS + 1).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCookie(_)));
    }

    #[test]
    fn tampered_cookie_fails_mac_check() {
        let signer = CookieSigner::new([7u8; 32]);
        let cookie = signer.issue(0x0E, "Alice", None, None, false, 0);
        let mut raw = hex::decode(&cookie).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = hex::encode(raw);
        let err = signer.crack(&tampered, 0x0E, 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCookie(_)));
    }

    #[test]
    fn different_signing_keys_reject_each_others_cookies() {
        let a = CookieSigner::new([1u8; 32]);
        let b = CookieSigner::new([2u8; 32]);
        let cookie = a.issue(0x0E, "Alice", None, None, false, 0);
        assert!(b.crack(&cookie, 0x0E, 0).is_err());
    }
}
