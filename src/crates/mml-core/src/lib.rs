//! Core conversion engine from tick-timed note events to MML
//!
//! This crate turns a fully loaded, multi-track event [`Sequence`] into
//! macro music language text for the Super Famicom sound driver family:
//! notes and rests with power-of-two, dotted or triplet lengths, octave
//! changes, tempo, and instrument/pan/volume macros.
//!
//! # Examples
//!
//! ```
//! use mml_core::{convert, ConvertOptions, Event, EventKind, Sequence};
//!
//! let on = |tick| Event::new(tick, EventKind::NoteOn { channel: 0, key: 60, velocity: 100 });
//! let off = |tick| Event::new(tick, EventKind::NoteOff { channel: 0, key: 60 });
//!
//! let sequence = Sequence::new(48).with_track(vec![on(0), off(48), on(48), off(96)]);
//! let mml = convert(&sequence, &ConvertOptions::default()).unwrap();
//! assert!(mml.ends_with("V64P40o3c4c4\n"));
//! ```
//!
//! # Main Components
//!
//! - **Converter**: walks all tracks tick by tick and drives the others
//! - **Quantizer**: picks a readable length for each note
//! - **LengthTable**: lengths a single note token can express
//! - **MacroRegistry**: deduplicated instrument, pan and volume macros
//! - **TrackState**: octave, sounding note and voice of one track
//! - **Meter**: measure boundaries from time signatures
//! - **Post-processing**: triplet groups and macro name cleanup

pub mod config;
pub mod converter;
pub mod error;
pub mod event;
pub mod meter;
pub mod notation;
pub mod postprocess;
pub mod quantizer;
pub mod registry;
pub mod symbol;
pub(crate) mod track;
pub mod triplet;


pub use config::{ConvertOptions, DotLimit, Granularity};
pub use converter::{Conversion, ConvertedTrack, Converter};
pub use error::{ConvertError, Result};
pub use event::{Event, EventKind, Note, Sequence, Tick};
pub use meter::Meter;
pub use notation::{LengthTable, MmlSymbols, NoteKey, NoteLength};
pub use quantizer::Quantizer;
pub use registry::{MacroDefinition, MacroKind, MacroRef, MacroRegistry, VoiceMacroKey};
pub use symbol::{Renderer, Symbol};

/// Convert a sequence to final MML text with the default notation symbols.
pub fn convert(sequence: &Sequence, options: &ConvertOptions) -> Result<String> {
    Converter::new(options.clone()).convert(sequence)?.to_mml()
}
