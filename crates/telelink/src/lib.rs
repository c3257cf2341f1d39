//! Telemetry link engine for motor-controller boards.
//!
//! telelink frames commands and telemetry over a byte stream, runs the link
//! on a dedicated worker thread, reduces bulk sample streams, and reports
//! everything to the caller as ordered events.
//!
//! # Crate Structure
//!
//! - [`transport`]: Duplex byte streams and connectors (Unix sockets, TCP)
//! - [`frame`]: Wire format, incremental decoder, message ids, sample reducer
//! - [`link`]: Link worker, outbound queue, events, commands and typed telemetry

/// Re-export transport types.
pub mod transport {
    pub use telelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use telelink_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use telelink_link::*;
}

pub use telelink_link::{Link, LinkConfig, LinkEvent, LinkState};
