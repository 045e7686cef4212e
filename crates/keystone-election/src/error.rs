//! Error types for the election subsystem.

use crate::Sid;

/// Errors that can occur while decoding notification frames or parsing
/// quorum configuration.
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// Frame is shorter than the 28-byte minimum any protocol
    /// generation has ever sent.
    #[error("short notification frame from sid {sid}: {len} bytes")]
    ShortFrame { sid: Sid, len: usize },

    /// Frame ended in the middle of a field.
    #[error("truncated notification frame: need {needed} more bytes")]
    Truncated { needed: usize },

    /// The config-length word is negative or larger than the frame itself.
    #[error("invalid config length in notification frame: len={len}, frame={frame}")]
    InvalidConfigLength { len: i32, frame: usize },

    /// Config trailer is not valid UTF-8.
    #[error("quorum config is not valid UTF-8")]
    ConfigNotUtf8,

    /// Quorum configuration string could not be parsed.
    #[error("invalid quorum configuration: {0}")]
    BadConfig(String),
}

impl ElectionError {
    /// Creates a parse error for a malformed quorum-config line.
    pub fn bad_config(msg: impl Into<String>) -> Self {
        ElectionError::BadConfig(msg.into())
    }
}
