use crate::{ConfigError, ENVELOPE_LEN};

/// Default maximum frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_PAYLOAD: u32 = 16 * 1024 * 1024;

/// Per-connection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnConfig {
    /// Largest payload a single frame may declare, in bytes. Must leave
    /// room past the 4-byte payload envelope.
    pub max_frame_payload: u32,
}

impl ConnConfig {
    pub fn ensure_sendable(&self) -> Result<(), ConfigError> {
        let min = ENVELOPE_LEN as u32 + 1;
        if self.max_frame_payload < min {
            return Err(ConfigError::MaxPayloadTooSmall {
                max: self.max_frame_payload,
                min,
            });
        }
        Ok(())
    }
}

impl Default for ConnConfig {
    fn default() -> Self {
        ConnConfig {
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
        }
    }
}
