use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::{FrameError, Result};
use crate::ids::id_name;

/// Frame header: id (1) + signature (1) + payload size (2) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Signature byte carried by every valid header.
pub const SIGNATURE: u8 = 0xAA;

/// Default maximum payload size: the board's 1 KiB streaming buffer.
pub const DEFAULT_MAX_PAYLOAD: usize = 0x0400;

/// Default number of extra decode attempts a partially received payload may wait.
pub const DEFAULT_STALL_RETRIES: u8 = 2;

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message tag.
    pub id: u8,
    /// Validity marker; anything other than [`SIGNATURE`] is corrupt.
    pub signature: u8,
    /// Number of payload bytes following the header.
    pub payload_size: u16,
}

impl Header {
    /// Parse the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Returns `None` if fewer bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [id, signature, lo, hi, ..] => Some(Self {
                id: *id,
                signature: *signature,
                payload_size: u16::from_le_bytes([*lo, *hi]),
            }),
            _ => None,
        }
    }
}

/// One protocol message. Built fresh for every decoded frame and handed off by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message tag.
    pub id: u8,
    /// Message payload.
    pub payload: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Create a message without payload (read requests, markers).
    pub fn empty(id: u8) -> Self {
        Self::new(id, Bytes::new())
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into a standalone buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_message(self.id, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────┬───────────┬──────────────┬──────────────────┐
/// │ Id (1B) │ Sig (1B)  │ Size (2B LE) │ Payload          │
/// │         │ 0xAA      │              │ (Size bytes)     │
/// └─────────┴───────────┴──────────────┴──────────────────┘
/// ```
///
/// Payloads larger than [`DEFAULT_MAX_PAYLOAD`] are rejected: the board's
/// receive buffer cannot hold them.
pub fn encode_message(id: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > DEFAULT_MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: DEFAULT_MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(id);
    dst.put_u8(SIGNATURE);
    dst.put_u16_le(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Configuration for the frame decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 KiB.
    pub max_payload_size: usize,
    /// Decode attempts a header may wait for its payload before the frame is dropped.
    pub stall_retries: u8,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            stall_retries: DEFAULT_STALL_RETRIES,
        }
    }
}

/// Why a frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CorruptFrame {
    /// Header signature did not match [`SIGNATURE`].
    #[error("bad signature 0x{found:02X} on message 0x{id:02X}")]
    BadSignature { id: u8, found: u8 },

    /// Header claims more payload than the decoder accepts.
    #[error("message 0x{id:02X} claims {size} payload bytes (max {max})")]
    Oversized { id: u8, size: usize, max: usize },

    /// Payload did not arrive within the retry budget.
    #[error("message 0x{id:02X} stalled with {buffered} of {expected} payload bytes")]
    Stalled {
        id: u8,
        expected: usize,
        buffered: usize,
    },
}

/// Outcome of one [`FrameDecoder::try_extract`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    /// A full message was consumed from the buffer.
    Complete(Message),
    /// More bytes are needed.
    Incomplete,
    /// Framing was lost; the whole buffer has been discarded.
    Corrupt(CorruptFrame),
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    header: Header,
    retries: u8,
}

/// Incremental decoder that keeps the parse continuation between calls.
///
/// The caller owns the receive buffer and appends to it; the decoder only ever
/// removes bytes from the front, either as a complete message or by purging
/// everything once framing is lost.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    config: FrameConfig,
    pending: Option<Pending>,
}

impl FrameDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            pending: None,
        }
    }

    /// Try to take one message off the front of `buf`.
    pub fn try_extract(&mut self, buf: &mut BytesMut) -> Extract {
        if let Some(pending) = self.pending.as_mut() {
            let expected = pending.header.payload_size as usize;
            if buf.len() >= expected {
                let header = pending.header;
                self.pending = None;
                return Extract::Complete(take_payload(header, buf));
            }

            if pending.retries < self.config.stall_retries {
                pending.retries += 1;
                debug!(
                    id = id_name(pending.header.id),
                    buffered = buf.len(),
                    expected,
                    retries = pending.retries,
                    "payload still incomplete"
                );
                return Extract::Incomplete;
            }

            let corrupt = CorruptFrame::Stalled {
                id: pending.header.id,
                expected,
                buffered: buf.len(),
            };
            self.pending = None;
            return purge(buf, corrupt);
        }

        let Some(header) = Header::parse(buf) else {
            return Extract::Incomplete;
        };
        buf.advance(HEADER_SIZE);

        if header.signature != SIGNATURE {
            return purge(
                buf,
                CorruptFrame::BadSignature {
                    id: header.id,
                    found: header.signature,
                },
            );
        }

        let size = header.payload_size as usize;
        if size > self.config.max_payload_size {
            return purge(
                buf,
                CorruptFrame::Oversized {
                    id: header.id,
                    size,
                    max: self.config.max_payload_size,
                },
            );
        }

        if buf.len() >= size {
            return Extract::Complete(take_payload(header, buf));
        }

        debug!(
            id = id_name(header.id),
            buffered = buf.len(),
            expected = size,
            "header accepted, waiting for payload"
        );
        self.pending = Some(Pending { header, retries: 0 });
        Extract::Incomplete
    }

    /// True while a header has been accepted but its payload has not arrived.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any parse continuation.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn take_payload(header: Header, buf: &mut BytesMut) -> Message {
    let payload = buf.split_to(header.payload_size as usize).freeze();
    Message {
        id: header.id,
        payload,
    }
}

fn purge(buf: &mut BytesMut, corrupt: CorruptFrame) -> Extract {
    warn!(discarded = buf.len(), "{corrupt}; receive buffer purged");
    buf.clear();
    Extract::Corrupt(corrupt)
}
