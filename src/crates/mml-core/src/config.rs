//! Conversion options consumed by the engine.

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Maximum number of dots a single note token may carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DotLimit {
    #[default]
    Unbounded,
    Max(u32),
}

impl DotLimit {
    /// Build from the command line convention where `-1` means unbounded.
    pub fn from_count(count: i32) -> Result<Self> {
        match count {
            -1 => Ok(DotLimit::Unbounded),
            n if n >= 0 => Ok(DotLimit::Max(n as u32)),
            n => Err(ConvertError::invalid_option(format!(
                "maximum dot count must be a positive number or -1, got {}",
                n
            ))),
        }
    }

    pub fn allows(&self, dots: u32) -> bool {
        match self {
            DotLimit::Unbounded => true,
            DotLimit::Max(max) => dots <= *max,
        }
    }
}

/// Shortest note the quantizer may leave as the tail of a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// No minimum, keep lengths as precise as the timebase allows.
    Exact,
    /// A note value such as `32` for thirty-second notes. Power of two.
    Note(u32),
}

impl Granularity {
    /// Build from the command line convention where `0` means exact.
    pub fn from_note(note: u32) -> Result<Self> {
        match note {
            0 => Ok(Granularity::Exact),
            n if n.is_power_of_two() => Ok(Granularity::Note(n)),
            n => Err(ConvertError::invalid_option(format!(
                "quantize precision must be a power of 2, got {}",
                n
            ))),
        }
    }

    /// Length in ticks for a whole note of `whole` ticks. Integer division,
    /// so coarse timebases round the granularity down.
    pub fn ticks(&self, whole: u64) -> u64 {
        match self {
            Granularity::Exact => 0,
            Granularity::Note(n) => whole / u64::from(*n),
        }
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Note(32)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub max_dots: DotLimit,
    /// Adjust note lengths to simpler notation. Disabled means exact lengths.
    pub quantize: bool,
    /// Swap the octave up/down tokens.
    pub reverse_octave: bool,
    pub use_triplets: bool,
    /// Separate notes, octave changes and commands with spaces.
    pub put_spaces: bool,
    /// Ignore expression controllers (CC 11).
    pub ignore_expression: bool,
    pub volume_multiplier: f64,
    pub no_pan_correction: bool,
    /// Drop instrument, pan and volume macros entirely.
    pub no_control_changes: bool,
    pub quantize_precision: Granularity,
    /// Write every length as a raw tick count (`c=24`).
    pub use_ticks: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            max_dots: DotLimit::Unbounded,
            quantize: true,
            reverse_octave: false,
            use_triplets: false,
            put_spaces: false,
            ignore_expression: false,
            volume_multiplier: 1.0,
            no_pan_correction: false,
            no_control_changes: false,
            quantize_precision: Granularity::Note(32),
            use_ticks: false,
        }
    }
}

impl ConvertOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.volume_multiplier.is_finite() || self.volume_multiplier <= 0.0 {
            return Err(ConvertError::invalid_option(format!(
                "volume multiplier must be a positive number, got {}",
                self.volume_multiplier
            )));
        }
        if let Granularity::Note(n) = self.quantize_precision {
            if !n.is_power_of_two() {
                return Err(ConvertError::invalid_option(format!(
                    "quantize precision must be a power of 2, got {}",
                    n
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_limit_from_count() {
        assert_eq!(DotLimit::from_count(-1).unwrap(), DotLimit::Unbounded);
        assert_eq!(DotLimit::from_count(2).unwrap(), DotLimit::Max(2));
        assert!(DotLimit::from_count(-2).is_err());
        assert!(DotLimit::Max(1).allows(1));
        assert!(!DotLimit::Max(1).allows(2));
    }

    #[test]
    fn test_granularity() {
        assert_eq!(Granularity::from_note(0).unwrap(), Granularity::Exact);
        assert!(Granularity::from_note(24).is_err());
        assert_eq!(Granularity::Note(32).ticks(192), 6);
        assert_eq!(Granularity::Exact.ticks(192), 0);
    }

    #[test]
    fn test_validate_multiplier() {
        let mut options = ConvertOptions::default();
        assert!(options.validate().is_ok());
        options.volume_multiplier = 0.0;
        assert!(options.validate().is_err());
        options.volume_multiplier = f64::NAN;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ConvertOptions =
            serde_json::from_str(r#"{"use_triplets": true, "max_dots": {"max": 1}}"#).unwrap();
        assert!(options.use_triplets);
        assert_eq!(options.max_dots, DotLimit::Max(1));
        assert!(options.quantize);
        assert_eq!(options.quantize_precision, Granularity::Note(32));
    }
}
