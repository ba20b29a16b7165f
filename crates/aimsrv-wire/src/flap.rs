//! FLAP framing (`spec.md` §4.1).
//!
//! A FLAP frame is `[sync:1][channel:1][seq:2 BE][len:2 BE][payload:len]`.
//! Sequence numbers are per-direction and wrap modulo 2^16; a discontinuity
//! is logged but never treated as fatal, since interoperating clients are
//! known to restart their counters across reconnects.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Result, WireError};

/// The fixed FLAP sync byte.
pub const FLAP_SYNC: u8 = 0x2A;

/// FLAP channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlapChannel {
    /// Channel 1: signon / handshake.
    SignOn,
    /// Channel 2: SNAC data.
    Data,
    /// Channel 3: FLAP-level error.
    Error,
    /// Channel 4: signoff.
    SignOff,
    /// Channel 5: keepalive.
    KeepAlive,
    /// Any other value a client might send; preserved instead of rejected.
    Other(u8),
}

impl FlapChannel {
    fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::SignOn,
            2 => Self::Data,
            3 => Self::Error,
            4 => Self::SignOff,
            5 => Self::KeepAlive,
            other => Self::Other(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::SignOn => 1,
            Self::Data => 2,
            Self::Error => 3,
            Self::SignOff => 4,
            Self::KeepAlive => 5,
            Self::Other(b) => b,
        }
    }
}

/// A fully-decoded FLAP frame.
#[derive(Debug, Clone)]
pub struct FlapFrame {
    pub channel: FlapChannel,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

/// Maximum FLAP payload size accepted from a client. The real protocol caps
/// well below this; this bound exists only to stop a hostile peer from
/// forcing an unbounded allocation.
pub const MAX_FLAP_PAYLOAD: usize = 64 * 1024;

/// Per-direction FLAP sequence counter. The server keeps one for outbound
/// frames on each connection; inbound discontinuities are only observed,
/// never enforced.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: u16,
}

impl SequenceCounter {
    pub fn new(start: u16) -> Self {
        Self { next: start }
    }

    /// Returns the next sequence number and advances, wrapping at 2^16.
    pub fn advance(&mut self) -> u16 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }
}

/// Reads one full FLAP frame from `reader`. Blocks (asynchronously) until a
/// complete frame is available or the connection is closed, in which case
/// `Ok(None)` is returned.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<FlapFrame>> {
    let mut header = [0u8; 6];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(WireError::Io(e)),
    }

    if header[0] != FLAP_SYNC {
        return Err(WireError::BadSync(header[0]));
    }
    let channel = FlapChannel::from_byte(header[1]);
    let sequence = u16::from_be_bytes([header[2], header[3]]);
    let len = u16::from_be_bytes([header[4], header[5]]) as usize;

    if len > MAX_FLAP_PAYLOAD {
        return Err(WireError::Truncated {
            expected: len,
            actual: MAX_FLAP_PAYLOAD,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(FlapFrame {
        channel,
        sequence,
        payload,
    }))
}

/// Encodes a FLAP frame to bytes for writing.
pub fn encode_frame(channel: FlapChannel, sequence: u16, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > u16::MAX as usize {
        return Err(WireError::ImpossibleLayout("FLAP payload exceeds u16 length"));
    }
    let mut out = Vec::with_capacity(6 + payload.len());
    out.push(FLAP_SYNC);
    out.push(channel.to_byte());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Writes one FLAP frame to `writer`. Callers are responsible for
/// serializing concurrent writers on the same connection (`spec.md` §4.1
/// requires writes be atomic); this function itself issues a single
/// `write_all` so the bytes of one frame are never interleaved with another.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    channel: FlapChannel,
    sequence: u16,
    payload: &[u8],
) -> Result<()> {
    let bytes = encode_frame(channel, sequence, payload)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, FlapChannel::Data, 7, b"hello").await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let frame = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(frame.channel, FlapChannel::Data);
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.payload, b"hello");
    }

    #[tokio::test]
    async fn returns_none_on_clean_eof() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let frame = read_frame(&mut cursor).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn rejects_bad_sync_byte() {
        let mut cursor = std::io::Cursor::new(vec![0x00, 2, 0, 1, 0, 0]);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::BadSync(0x00)));
    }

    #[test]
    fn sequence_counter_wraps() {
        let mut seq = SequenceCounter::new(u16::MAX);
        assert_eq!(seq.advance(), u16::MAX);
        assert_eq!(seq.advance(), 0);
    }
}
