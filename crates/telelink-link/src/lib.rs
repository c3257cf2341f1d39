//! Board link management.
//!
//! A [`Link`] owns one worker thread per connection. The worker writes queued
//! commands, reads and decodes telemetry frames, reduces bulk samples, and
//! reports everything to the consumer as [`LinkEvent`] values on an ordered
//! channel. The consumer side also gets typed command builders, typed
//! telemetry decoding, and echo suppression for device-driven updates.

pub mod command;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod link;
pub mod outbound;
pub mod telemetry;
pub mod worker;

pub use command::{AcquisitionMode, Actuator, StreamChannel};
pub use config::LinkConfig;
pub use control::{ControlState, EchoGuard, Field};
pub use dispatch::Dispatcher;
pub use error::{LinkError, Result};
pub use event::{EventSender, LinkEvent};
pub use link::Link;
pub use outbound::OutboundQueue;
pub use telemetry::{MotorFlags, Telemetry};
pub use worker::LinkState;
