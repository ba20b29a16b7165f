//! SNAC header encoding (`spec.md` §4.1).
//!
//! A SNAC occupies the payload of a FLAP channel-2 frame: a 10-byte header
//! followed by the body. Flag bit `0x8000` indicates a length-prefixed
//! extension TLV block precedes the body; the core passes that block through
//! untouched rather than interpreting it.

use crate::{Result, WireError};

/// Flag bit indicating an extension block precedes the SNAC body.
pub const FLAG_EXTENSION: u16 = 0x8000;

/// Sentinel high bit marking a request id as server-originated rather than
/// echoing a client request.
pub const SERVER_REQUEST_ID: u32 = 0x8000_0000;

/// A decoded SNAC header plus whatever bytes follow it in the frame.
#[derive(Debug, Clone)]
pub struct SnacHeader {
    pub food_group: u16,
    pub subgroup: u16,
    pub flags: u16,
    pub request_id: u32,
}

impl SnacHeader {
    pub fn new(food_group: u16, subgroup: u16, request_id: u32) -> Self {
        Self {
            food_group,
            subgroup,
            flags: 0,
            request_id,
        }
    }

    /// A header for a server-originated message that does not echo a
    /// client request id.
    pub fn server_originated(food_group: u16, subgroup: u16) -> Self {
        Self::new(food_group, subgroup, SERVER_REQUEST_ID)
    }

    pub fn is_server_originated(&self) -> bool {
        self.request_id & SERVER_REQUEST_ID != 0
    }

    fn encode(&self) -> [u8; 10] {
        let mut out = [0u8; 10];
        out[0..2].copy_from_slice(&self.food_group.to_be_bytes());
        out[2..4].copy_from_slice(&self.subgroup.to_be_bytes());
        out[4..6].copy_from_slice(&self.flags.to_be_bytes());
        out[6..10].copy_from_slice(&self.request_id.to_be_bytes());
        out
    }
}

/// A decoded SNAC message: header, passthrough extension block (if any), and
/// body bytes.
#[derive(Debug, Clone)]
pub struct Snac {
    pub header: SnacHeader,
    pub extension: Option<Vec<u8>>,
    pub body: Vec<u8>,
}

impl Snac {
    pub fn new(header: SnacHeader, body: Vec<u8>) -> Self {
        Self {
            header,
            extension: None,
            body,
        }
    }

    /// Parses a SNAC out of a FLAP channel-2 payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 10 {
            return Err(WireError::ImpossibleLayout("SNAC header shorter than 10 bytes"));
        }
        let food_group = u16::from_be_bytes([payload[0], payload[1]]);
        let subgroup = u16::from_be_bytes([payload[2], payload[3]]);
        let flags = u16::from_be_bytes([payload[4], payload[5]]);
        let request_id = u32::from_be_bytes([payload[6], payload[7], payload[8], payload[9]]);
        let mut rest = &payload[10..];

        let mut extension = None;
        if flags & FLAG_EXTENSION != 0 {
            if rest.len() < 2 {
                return Err(WireError::ImpossibleLayout("missing extension block length"));
            }
            let ext_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            rest = &rest[2..];
            if rest.len() < ext_len {
                return Err(WireError::Truncated {
                    expected: ext_len,
                    actual: rest.len(),
                });
            }
            extension = Some(rest[..ext_len].to_vec());
            rest = &rest[ext_len..];
        }

        Ok(Self {
            header: SnacHeader {
                food_group,
                subgroup,
                flags,
                request_id,
            },
            extension,
            body: rest.to_vec(),
        })
    }

    /// Serializes this SNAC back into FLAP channel-2 payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10 + self.body.len());
        out.extend_from_slice(&self.header.encode());
        if let Some(ext) = &self.extension {
            out.extend_from_slice(&(ext.len() as u16).to_be_bytes());
            out.extend_from_slice(ext);
        }
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_plain_snac() {
        let snac = Snac::new(SnacHeader::new(0x04, 0x06, 42), vec![1, 2, 3]);
        let bytes = snac.encode();
        let decoded = Snac::decode(&bytes).unwrap();
        assert_eq!(decoded.header.food_group, 0x04);
        assert_eq!(decoded.header.subgroup, 0x06);
        assert_eq!(decoded.header.request_id, 42);
        assert_eq!(decoded.body, vec![1, 2, 3]);
        assert!(decoded.extension.is_none());
    }

    #[test]
    fn round_trips_with_extension_block() {
        let mut snac = Snac::new(SnacHeader::new(0x13, 0x02, 1), vec![9, 9]);
        snac.header.flags |= FLAG_EXTENSION;
        snac.extension = Some(vec![0xAA, 0xBB]);
        let bytes = snac.encode();
        let decoded = Snac::decode(&bytes).unwrap();
        assert_eq!(decoded.extension, Some(vec![0xAA, 0xBB]));
        assert_eq!(decoded.body, vec![9, 9]);
    }

    #[test]
    fn server_originated_request_id_is_flagged() {
        let header = SnacHeader::server_originated(0x03, 0x0B);
        assert!(header.is_server_originated());
    }

    #[test]
    fn rejects_header_too_short() {
        let err = Snac::decode(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, WireError::ImpossibleLayout(_)));
    }
}
