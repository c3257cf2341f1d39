use std::time::Duration;

use telelink_frame::{FrameConfig, ReducerConfig, DEFAULT_MAX_PAYLOAD};

use crate::error::{LinkError, Result};

/// Timing and protocol parameters for one link.
///
/// All blocking bounds are small so a stop request is observed within roughly
/// `write_timeout + read_timeout + read_grace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Bound on opening the transport.
    pub open_timeout: Duration,
    /// Bound on a single write. Expiry is fatal for the connection.
    pub write_timeout: Duration,
    /// Bound on waiting for the first byte of a read.
    pub read_timeout: Duration,
    /// Window for coalescing further immediately-available bytes after a read.
    pub read_grace: Duration,
    /// Bound on waiting for the worker to stop.
    pub shutdown_timeout: Duration,
    /// Frame decoder parameters.
    pub frame: FrameConfig,
    /// Sample reduction parameters.
    pub reducer: ReducerConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(20),
            read_timeout: Duration::from_millis(20),
            read_grace: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(5),
            frame: FrameConfig::default(),
            reducer: ReducerConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("open_timeout", self.open_timeout),
            ("write_timeout", self.write_timeout),
            ("read_timeout", self.read_timeout),
            ("read_grace", self.read_grace),
            ("shutdown_timeout", self.shutdown_timeout),
        ] {
            if value.is_zero() {
                return Err(LinkError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        if self.frame.max_payload_size > DEFAULT_MAX_PAYLOAD {
            return Err(LinkError::InvalidConfig(format!(
                "max_payload_size {} exceeds the board limit of {DEFAULT_MAX_PAYLOAD}",
                self.frame.max_payload_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        LinkConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = LinkConfig {
            read_grace: Duration::ZERO,
            ..LinkConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, LinkError::InvalidConfig(msg) if msg.contains("read_grace")));
    }

    #[test]
    fn payload_limit_must_fit_board_buffer() {
        let config = LinkConfig {
            frame: FrameConfig {
                max_payload_size: DEFAULT_MAX_PAYLOAD + 1,
                ..FrameConfig::default()
            },
            ..LinkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LinkError::InvalidConfig(_))
        ));
    }
}
