//! Sequence normalization run before conversion.
//!
//! The converter expects one channel per track and a timebase the notation
//! can divide evenly, so decoded files go through these passes first.

use std::collections::{HashMap, VecDeque};

use anyhow::{bail, Result};
use mml_core::{Event, Sequence, Tick};

/// Keep the sequence's timebase.
pub const RESOLUTION_AS_IS: u32 = 0;
pub const DEFAULT_RESOLUTION: u32 = 48;

/// Apply the input timebase override, channel separation and the timebase
/// change, in that order. [`RESOLUTION_AS_IS`] skips either timebase step.
pub fn preprocess(mut sequence: Sequence, input_timebase: u32, target_timebase: u32) -> Result<Sequence> {
    if target_timebase != RESOLUTION_AS_IS && target_timebase % 4 != 0 {
        bail!("Timebase must be a multiple of 4, got {}", target_timebase);
    }
    if input_timebase != RESOLUTION_AS_IS {
        assume_resolution(&mut sequence, input_timebase);
    }
    let mut sequence = separate_channels(sequence);
    if target_timebase != RESOLUTION_AS_IS {
        change_resolution(&mut sequence, target_timebase)?;
    }
    Ok(sequence)
}

/// Relabel the timebase without moving any event.
pub fn assume_resolution(sequence: &mut Sequence, resolution: u32) {
    tracing::debug!(from = sequence.resolution, to = resolution, "assuming input timebase");
    sequence.resolution = resolution;
}

/// Split every track that carries more than one channel into one track per
/// channel, in order of first appearance. Events without a channel stay on
/// the first of the split tracks.
pub fn separate_channels(sequence: Sequence) -> Sequence {
    let mut separated = Sequence::new(sequence.resolution);
    for (index, events) in sequence.tracks.into_iter().enumerate() {
        let mut channels: Vec<u8> = Vec::new();
        for channel in events.iter().filter_map(|e| e.kind.channel()) {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        if channels.len() <= 1 {
            separated.push_track(events);
            continue;
        }

        tracing::debug!(track = index, ?channels, "separating mixed channels");
        let mut split: Vec<Vec<Event>> = vec![Vec::new(); channels.len()];
        for event in events {
            let slot = event
                .kind
                .channel()
                .and_then(|channel| channels.iter().position(|&c| c == channel))
                .unwrap_or(0);
            split[slot].push(event);
        }
        for track in split {
            separated.push_track(track);
        }
    }
    separated
}

/// Rescale every tick to a new timebase, rounding half up.
///
/// A note off that would land on or before its note on is pushed one tick
/// after it so no note collapses to zero length.
pub fn change_resolution(sequence: &mut Sequence, resolution: u32) -> Result<()> {
    if resolution == 0 {
        bail!("Target timebase must be positive");
    }
    let source = sequence.resolution;
    if source == 0 {
        bail!("Input timebase is zero, use --input-timebase to set one");
    }
    if source == resolution {
        return Ok(());
    }
    tracing::debug!(from = source, to = resolution, "changing timebase");

    for track in &mut sequence.tracks {
        let mut open: HashMap<(Option<u8>, u8), VecDeque<Tick>> = HashMap::new();
        for event in track.iter_mut() {
            let mut tick = rescale(event.tick, source, resolution);
            if let Some(key) = event.kind.key() {
                let slot = (event.kind.channel(), key);
                if event.kind.is_note_on() {
                    open.entry(slot).or_default().push_back(tick);
                } else if let Some(start) = open.get_mut(&slot).and_then(|q| q.pop_front()) {
                    if tick <= start {
                        tick = start + 1;
                    }
                }
            }
            event.tick = tick;
        }
        track.sort_by_key(|e| e.tick);
    }
    sequence.resolution = resolution;
    Ok(())
}

fn rescale(tick: Tick, source: u32, target: u32) -> Tick {
    let source = u128::from(source);
    let scaled = (u128::from(tick) * u128::from(target) * 2 + source) / (source * 2);
    Tick::try_from(scaled).unwrap_or(Tick::MAX)
}
