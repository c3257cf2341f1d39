/// Errors reported synchronously to the link consumer.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] telelink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] telelink_frame::FrameError),

    /// A command was submitted while no link is running.
    #[error("not connected")]
    NotConnected,

    /// Link configuration is unusable.
    #[error("invalid link configuration: {0}")]
    InvalidConfig(String),

    /// The worker thread could not be started.
    #[error("failed to start link worker: {0}")]
    Spawn(std::io::Error),

    /// The worker did not stop within the shutdown bound.
    #[error("shutdown failed: {0}")]
    ShutdownFailed(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;
