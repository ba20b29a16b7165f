//! # aimsrv-wire
//!
//! Framing and low-level codec primitives for the OSCAR protocol.
//!
//! This crate owns exactly the parts of the wire surface that are mechanical
//! and protocol-wide: FLAP framing, the SNAC header, TLV records, and screen
//! name normalization. It does not attempt to catalogue every historical
//! SNAC body — callers decode/encode bodies themselves using the TLV and
//! integer helpers exposed here.
//!
//! ## Layering
//!
//! ```text
//! TCP stream
//!     |
//!     v
//! FlapFrame (flap.rs)     -- 1-byte sync, channel, seq, length, payload
//!     |
//!     v
//! SnacHeader (snac.rs)    -- food-group, subgroup, flags, request id
//!     |
//!     v
//! Tlv / TlvBlock (tlv.rs) -- tag-length-value records inside the body
//! ```

pub mod flap;
pub mod food_group;
pub mod screen_name;
pub mod snac;
pub mod tlv;

/// Error types for wire-level framing and decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The FLAP sync byte was not 0x2A.
    #[error("bad FLAP sync byte: {0:#04x}")]
    BadSync(u8),

    /// The frame or a nested TLV claimed a length that does not fit the
    /// surrounding buffer.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A TLV or SNAC body was shorter than the minimum required header size.
    #[error("impossible layout: {0}")]
    ImpossibleLayout(&'static str),

    /// The underlying connection was closed or failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A screen name failed validation (too long, empty after trimming).
    #[error("invalid screen name: {0}")]
    InvalidScreenName(&'static str),
}

pub type Result<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_error_display() {
        let e = WireError::BadSync(0x00);
        assert_eq!(e.to_string(), "bad FLAP sync byte: 0x00");
    }
}
