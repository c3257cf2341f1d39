/// Errors that can occur while encoding frames or configuring reduction.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Reducer ratio and depth must both be at least one.
    #[error("invalid reducer configuration (ratio {ratio}, depth {depth})")]
    InvalidReducer { ratio: usize, depth: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
