//! Duplex byte-stream transports for the telelink board protocol.
//!
//! The controller board is reached through a byte stream that the link worker
//! reads and writes with short, bounded timeouts. This crate provides:
//! - [`LinkStream`], the stream contract the worker relies on
//! - [`Endpoint`], parsed from strings such as `unix:/tmp/board.sock` or `tcp:host:4001`
//! - [`Connector`] / [`EndpointConnector`] for opening a stream from a target string
//! - [`UnixDomainSocket`] for serial bridges and board simulators
//!
//! Port settings of a physical serial line (baud, parity) belong to whatever
//! bridge exposes it as a socket.

pub mod endpoint;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use traits::{Connector, EndpointConnector, LinkConnection, LinkStream};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
