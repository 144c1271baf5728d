//! MIDI to MML converter library
//!
//! Decodes Standard MIDI Files, normalizes them for the conversion engine in
//! `mml-core`, and formats the result.

pub mod midi;
pub mod output;
pub mod preprocess;

use std::path::Path;

use anyhow::Result;
use mml_core::{Conversion, Converter};

// Re-export main types for convenience
pub use midi::{load_file, parse_bytes};
pub use output::{OutputFormat, OutputFormatter};
pub use preprocess::{preprocess, DEFAULT_RESOLUTION, RESOLUTION_AS_IS};

/// Timebase handling applied to every input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    /// Resolution to assume for the input, `RESOLUTION_AS_IS` to trust the file.
    pub input: u32,
    /// Resolution to convert at, `RESOLUTION_AS_IS` to keep the input's.
    pub target: u32,
}

impl Default for Timebase {
    fn default() -> Self {
        Self {
            input: RESOLUTION_AS_IS,
            target: DEFAULT_RESOLUTION,
        }
    }
}

/// Decode, preprocess and convert one file.
pub fn convert_file(path: &Path, timebase: Timebase, converter: &Converter) -> Result<Conversion> {
    let sequence = load_file(path)?;
    convert_sequence(sequence, timebase, converter)
}

pub fn convert_sequence(
    sequence: mml_core::Sequence,
    timebase: Timebase,
    converter: &Converter,
) -> Result<Conversion> {
    let sequence = preprocess(sequence, timebase.input, timebase.target)?;
    Ok(converter.convert(&sequence)?)
}
