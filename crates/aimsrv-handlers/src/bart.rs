//! BART food-group (`spec.md` §4.7: "icon/asset blobs, content-addressed
//! by MD5"). Upsert stores the blob and registers the (type, hash)
//! reference on the caller, firing a buddy broadcast since an icon-ref
//! change is visible in presence; retrieve returns the blob by hash, or
//! a blank GIF for the well-known clear-icon hash.

use std::sync::Arc;

use aimsrv_db::model::BartItem;
use aimsrv_wire::food_group::{bart, group};
use aimsrv_wire::snac::{Snac, SnacHeader};

use aimsrv_core::session::Session;

use crate::context::HandlerContext;
use crate::dispatcher::HandlerOutcome;
use crate::reply::business_error;

/// The all-zero MD5 clients send to mean "no icon" / "clear my icon" — a
/// RetrieveItem for this hash always gets the blank GIF back, never a
/// repository lookup (`spec.md` §4.7).
const CLEAR_ICON_MD5: [u8; 16] = [0u8; 16];

/// A minimal valid 1x1 transparent GIF, returned for `CLEAR_ICON_MD5`.
const BLANK_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00,
    0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub fn handle(ctx: &HandlerContext, session: &Arc<Session>, snac: Snac, now: u64) -> HandlerOutcome {
    match snac.header.subgroup {
        bart::UPSERT_ITEM => handle_upsert(ctx, session, &snac, now),
        bart::RETRIEVE_ITEM => handle_retrieve(ctx, &snac),
        _ => business_error(group::BART, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_SUPPORTED_BY_HOST),
    }
}

/// Body: item type (2 BE), blob (rest) (`spec.md` §6). The hash is
/// computed server-side rather than trusted from the wire.
fn handle_upsert(ctx: &HandlerContext, session: &Arc<Session>, snac: &Snac, now: u64) -> HandlerOutcome {
    if snac.body.len() < 2 {
        return business_error(group::BART, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    }
    let item_type = u16::from_be_bytes([snac.body[0], snac.body[1]]);
    let blob = snac.body[2..].to_vec();
    let md5 = md5_of(&blob);

    if ctx.engine.repo.put_bart_item(BartItem { item_type, md5, blob }).is_err() {
        return business_error(group::BART, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    }
    if ctx.engine.repo.set_bart_ref(&session.identity, item_type, md5).is_err() {
        return business_error(group::BART, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE);
    }
    session.set_icon_hash(Some(md5));
    ctx.engine.buddies.broadcast_arrival(session, now);

    let mut body = Vec::new();
    body.extend_from_slice(&item_type.to_be_bytes());
    body.extend_from_slice(&md5);
    HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::BART, bart::UPSERT_REPLY, snac.header.request_id), body))
}

/// Body: item type (2 BE), md5 (16 bytes) (`spec.md` §6). An unknown hash
/// is a SNAC-level "not found" error, not a placeholder blob (resolving
/// the matching Open Question: `SPEC_FULL.md` §4) — except for the
/// well-known "clear icon" hash (`CLEAR_ICON_MD5`), which always returns
/// the blank GIF regardless of what's stored (`spec.md` §4.7).
fn handle_retrieve(ctx: &HandlerContext, snac: &Snac) -> HandlerOutcome {
    if snac.body.len() < 18 {
        return business_error(group::BART, snac.header.request_id, aimsrv_wire::food_group::error_code::INVALID_SNAC);
    }
    let item_type = u16::from_be_bytes([snac.body[0], snac.body[1]]);
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&snac.body[2..18]);

    if md5 == CLEAR_ICON_MD5 {
        let mut body = Vec::new();
        body.extend_from_slice(&item_type.to_be_bytes());
        body.extend_from_slice(&CLEAR_ICON_MD5);
        body.extend_from_slice(BLANK_GIF);
        return HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::BART, bart::RETRIEVE_REPLY, snac.header.request_id), body));
    }

    match ctx.engine.repo.get_bart_item(item_type, &md5) {
        Ok(Some(item)) => {
            let mut body = Vec::new();
            body.extend_from_slice(&item.item_type.to_be_bytes());
            body.extend_from_slice(&item.md5);
            body.extend_from_slice(&item.blob);
            HandlerOutcome::Reply(Snac::new(SnacHeader::new(group::BART, bart::RETRIEVE_REPLY, snac.header.request_id), body))
        }
        Ok(None) => business_error(group::BART, snac.header.request_id, aimsrv_wire::food_group::error_code::NOT_FOUND),
        Err(_) => business_error(group::BART, snac.header.request_id, aimsrv_wire::food_group::error_code::SERVICE_UNAVAILABLE),
    }
}

fn md5_of(blob: &[u8]) -> [u8; 16] {
    let digest = md5::compute(blob);
    digest.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_blobs_hash_identically() {
        assert_eq!(md5_of(b"hello"), md5_of(b"hello"));
        assert_ne!(md5_of(b"hello"), md5_of(b"world"));
    }

    #[test]
    fn clear_icon_hash_never_collides_with_a_real_upload() {
        assert_ne!(md5_of(b""), CLEAR_ICON_MD5);
        assert_ne!(md5_of(b"hello"), CLEAR_ICON_MD5);
    }

    #[test]
    fn blank_gif_has_a_gif_header() {
        assert_eq!(&BLANK_GIF[0..6], b"GIF89a");
    }
}
