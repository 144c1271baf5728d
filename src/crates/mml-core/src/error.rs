use thiserror::Error;

use crate::event::Tick;

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Fatal conversion failures. No partial output is produced when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("track {track}: note {key} started at tick {tick} is never released")]
    UnfinishedNote { track: usize, tick: Tick, key: u8 },

    #[error("time signature at tick {tick} is not located at a measure boundary")]
    MisalignedTimeSignature { tick: Tick },

    #[error("two or more time signatures are located at measure {measure}")]
    DuplicateTimeSignature { measure: u64 },

    #[error("first time signature is located at measure {measure}, not at the first measure")]
    LateFirstTimeSignature { measure: u64 },

    #[error("illegal time signature event at tick {tick}: {reason}")]
    MalformedTimeSignature { tick: Tick, reason: String },

    #[error("illegal tempo event at tick {tick}: {reason}")]
    MalformedTempo { tick: Tick, reason: String },

    #[error("volume multiplier {multiplier} is too high: macro {name} would need output volume {value}")]
    VolumeOverflow {
        multiplier: f64,
        name: String,
        value: i64,
    },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("invalid post-processing pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ConvertError {
    pub fn invalid_option(message: impl Into<String>) -> Self {
        ConvertError::InvalidOption(message.into())
    }
}
