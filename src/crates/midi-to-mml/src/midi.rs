//! Standard MIDI File decoding into the converter's event model.

use std::path::Path;

use anyhow::{bail, Context, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use mml_core::{Event, EventKind, Sequence, Tick};

/// Read and decode a MIDI file.
pub fn load_file(path: &Path) -> Result<Sequence> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read MIDI file: {}", path.display()))?;
    parse_bytes(&data).with_context(|| format!("Failed to decode {}", path.display()))
}

/// Decode SMF bytes. Delta times become absolute ticks, one event list per
/// track chunk.
pub fn parse_bytes(data: &[u8]) -> Result<Sequence> {
    let smf = Smf::parse(data).context("Failed to parse MIDI file")?;

    let resolution = match smf.header.timing {
        Timing::Metrical(tpb) => u32::from(tpb.as_int()),
        Timing::Timecode(fps, subframe) => bail!(
            "SMPTE timing is not supported ({} fps, {} subframes)",
            fps.as_f32(),
            subframe
        ),
    };

    let mut sequence = Sequence::new(resolution);
    for track in &smf.tracks {
        let mut tick: Tick = 0;
        let mut events = Vec::with_capacity(track.len());
        for event in track {
            tick += Tick::from(event.delta.as_int());
            events.push(Event::new(tick, convert_kind(event.kind)));
        }
        sequence.push_track(events);
    }

    tracing::debug!(
        format = ?smf.header.format,
        resolution,
        tracks = sequence.tracks.len(),
        "decoded MIDI file"
    );
    Ok(sequence)
}

fn convert_kind(kind: TrackEventKind) -> EventKind {
    match kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, .. } => EventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                },
                MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                    channel,
                    program: program.as_int(),
                },
                MidiMessage::Controller { controller, value } => EventKind::ControlChange {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::Aftertouch { .. }
                | MidiMessage::ChannelAftertouch { .. }
                | MidiMessage::PitchBend { .. } => EventKind::Other {
                    channel: Some(channel),
                },
            }
        }
        TrackEventKind::Meta(MetaMessage::Tempo(micros)) => {
            let [_, a, b, c] = micros.as_int().to_be_bytes();
            EventKind::Tempo(vec![a, b, c])
        }
        TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator, clocks, notes)) => {
            EventKind::TimeSignature(vec![numerator, denominator, clocks, notes])
        }
        TrackEventKind::Meta(_) | TrackEventKind::SysEx(_) | TrackEventKind::Escape(_) => {
            EventKind::Other { channel: None }
        }
    }
}
