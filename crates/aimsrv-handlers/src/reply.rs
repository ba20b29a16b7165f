//! SNAC-error reply construction (`spec.md` §4.6 step 4, §7).

use aimsrv_wire::snac::{Snac, SnacHeader};

use crate::dispatcher::HandlerOutcome;

/// Builds a SNAC-error body: a 2-byte big-endian error code, nothing else
/// (`spec.md` §6: "each SNAC body has a machine-describable layout").
pub fn error_reply(food_group: u16, request_id: u32, error_code: u16) -> Snac {
    let header = SnacHeader::new(food_group, aimsrv_wire::food_group::ERROR_SUBGROUP, request_id);
    Snac::new(header, error_code.to_be_bytes().to_vec())
}

/// Convenience constructor for handlers that just want to fail a request
/// with a business-level SNAC error (`spec.md` §4.6 step 4: "errors that
/// are business... are converted to SNAC-error responses").
pub fn business_error(food_group: u16, request_id: u32, error_code: u16) -> HandlerOutcome {
    HandlerOutcome::Reply(error_reply(food_group, request_id, error_code))
}
