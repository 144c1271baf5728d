//! Tick-timed input model handed to the converter.
//!
//! A [`Sequence`] is a fully materialized set of tracks sharing one
//! resolution. Every track is kept sorted by tick; events that share a tick
//! keep the order they were pushed in.

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Absolute time in ticks from the start of the sequence.
pub type Tick = u64;

pub const CC_VOLUME: u8 = 0x07;
pub const CC_PAN: u8 = 0x0A;
pub const CC_EXPRESSION: u8 = 0x0B;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8 },
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Raw tempo meta payload (microseconds per quarter note, big endian).
    Tempo(Vec<u8>),
    /// Raw time signature meta payload.
    TimeSignature(Vec<u8>),
    /// Anything the converter does not care about. Channel messages keep
    /// their channel so preprocessing can route them.
    Other { channel: Option<u8> },
}

impl EventKind {
    /// NOTE_OFF, or NOTE_ON with zero velocity.
    pub fn is_note_off(&self) -> bool {
        matches!(
            self,
            EventKind::NoteOff { .. } | EventKind::NoteOn { velocity: 0, .. }
        )
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, EventKind::NoteOn { velocity, .. } if *velocity > 0)
    }

    pub fn is_note(&self) -> bool {
        matches!(self, EventKind::NoteOn { .. } | EventKind::NoteOff { .. })
    }

    /// Key of a note on/off message.
    pub fn key(&self) -> Option<u8> {
        match self {
            EventKind::NoteOn { key, .. } | EventKind::NoteOff { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub fn channel(&self) -> Option<u8> {
        match self {
            EventKind::NoteOn { channel, .. }
            | EventKind::NoteOff { channel, .. }
            | EventKind::ProgramChange { channel, .. }
            | EventKind::ControlChange { channel, .. } => Some(*channel),
            EventKind::Other { channel } => *channel,
            EventKind::Tempo(_) | EventKind::TimeSignature(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub tick: Tick,
    pub kind: EventKind,
}

impl Event {
    pub fn new(tick: Tick, kind: EventKind) -> Self {
        Self { tick, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Ticks per quarter note.
    pub resolution: u32,
    pub tracks: Vec<Vec<Event>>,
}

impl Sequence {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution,
            tracks: Vec::new(),
        }
    }

    /// Append a track, sorting it by tick.
    pub fn push_track(&mut self, mut events: Vec<Event>) {
        events.sort_by_key(|e| e.tick);
        self.tracks.push(events);
    }

    pub fn with_track(mut self, events: Vec<Event>) -> Self {
        self.push_track(events);
        self
    }
}

/// A note with its resolved length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub channel: u8,
    pub tick: Tick,
    pub length: Tick,
    pub key: u8,
    pub velocity: u8,
}

/// Pair every note on with its note off.
///
/// A note off closes the oldest open note of the same key, so overlapping
/// notes of one key are released first-in first-out. Notes come back in
/// note-on order.
pub fn scan_notes(track: usize, events: &[Event]) -> Result<Vec<Note>> {
    struct Open {
        note: Note,
        released: bool,
    }

    let mut notes: Vec<Open> = Vec::new();
    for event in events {
        match event.kind {
            ref kind if kind.is_note_off() => {
                let key = kind.key().unwrap_or_default();
                if let Some(open) = notes
                    .iter_mut()
                    .find(|open| !open.released && open.note.key == key)
                {
                    open.note.length = event.tick - open.note.tick;
                    open.released = true;
                }
            }
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            } => notes.push(Open {
                note: Note {
                    channel,
                    tick: event.tick,
                    length: 0,
                    key,
                    velocity,
                },
                released: false,
            }),
            _ => {}
        }
    }

    notes
        .into_iter()
        .map(|open| {
            if open.released {
                Ok(open.note)
            } else {
                Err(ConvertError::UnfinishedNote {
                    track,
                    tick: open.note.tick,
                    key: open.note.key,
                })
            }
        })
        .collect()
}

/// Move channel events that share a tick with a note off to the next note on.
///
/// Notation reads "no time passed" as a continuation, so an instrument or
/// volume change sitting on a note off would otherwise tie the released note
/// into the next one. Only events that are neither note on nor note off and
/// carry a channel are moved; meta events stay put. Moved events land after
/// everything already at the destination tick.
pub fn relocate_note_off_events(events: &mut Vec<Event>) {
    let mut index = 0;
    while index < events.len() {
        if !events[index].kind.is_note_off() {
            index += 1;
            continue;
        }

        let off_tick = events[index].tick;
        let target = events[index + 1..]
            .iter()
            .find(|e| e.kind.is_note_on() && e.tick >= off_tick)
            .map(|e| e.tick);

        if let Some(target) = target.filter(|&t| t != off_tick) {
            let movable = |e: &Event| e.tick == off_tick && is_relocatable(&e.kind);
            let moved_before = events[..index].iter().filter(|e| movable(e)).count();
            let (moved, kept): (Vec<Event>, Vec<Event>) = events.drain(..).partition(movable);
            *events = kept;
            if !moved.is_empty() {
                let insert_at = events.partition_point(|e| e.tick <= target);
                tracing::trace!(
                    count = moved.len(),
                    from = off_tick,
                    to = target,
                    "relocated events off a note off"
                );
                events.splice(
                    insert_at..insert_at,
                    moved.into_iter().map(|e| Event::new(target, e.kind)),
                );
                // the note off shifted left by the events moved from before it
                index -= moved_before;
            }
        }
        index += 1;
    }
}

fn is_relocatable(kind: &EventKind) -> bool {
    !kind.is_note() && kind.channel().is_some()
}
