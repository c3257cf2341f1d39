//! Telemetry frame codec and sample stream reduction.
//!
//! Every message on the board link is framed with a 4-byte header:
//! - a 1-byte message id (ASCII-style tag)
//! - a 1-byte signature (`0xAA`) marking the header as valid
//! - a 2-byte little-endian payload length, bounded by the maximum payload size
//!
//! [`FrameDecoder`] pulls complete messages out of a receive buffer that may hold
//! partial, garbled or interleaved bytes. [`StreamReducer`] averages the samples
//! carried by bulk sample messages down to fixed-size plot buffers.

pub mod codec;
pub mod error;
pub mod ids;
pub mod reducer;

pub use codec::{
    encode_message, CorruptFrame, Extract, FrameConfig, FrameDecoder, Header, Message,
    DEFAULT_MAX_PAYLOAD, DEFAULT_STALL_RETRIES, HEADER_SIZE, SIGNATURE,
};
pub use error::{FrameError, Result};
pub use ids::{classify, id_name, MessageKind};
pub use reducer::{ReducerConfig, StreamReducer};
