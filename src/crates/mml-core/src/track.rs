//! Per-track conversion state.

use crate::event::Tick;
use crate::meter::Meter;
use crate::notation::{LengthTable, NoteKey, NoteLength};
use crate::registry::VoiceMacroKey;
use crate::symbol::Symbol;

const DEFAULT_OCTAVE: i32 = 4;
const DEFAULT_VOLUME: u8 = 100;
const DEFAULT_EXPRESSION: u8 = 127;
const DEFAULT_PAN: u8 = 64;
/// Velocity assumed for voice macros emitted before the first note.
pub const FALLBACK_VELOCITY: u8 = 127;

/// What is sounding since the last emitted tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Active {
    Rest,
    /// `index` is the note's position in the track's note list.
    Note { key: u8, index: usize },
}

/// Timing context shared by every track of one conversion.
#[derive(Debug, Clone, Copy)]
pub struct Timeline<'a> {
    pub meter: &'a Meter,
    pub lengths: &'a LengthTable,
    /// Write each measure segment as one raw tick length.
    pub use_ticks: bool,
}

/// Octave a key is written in.
pub fn octave_of(key: u8) -> i32 {
    i32::from(key) / 12 - 2
}

#[derive(Debug, Clone)]
pub struct TrackState {
    tick: Tick,
    octave: i32,
    active: Active,
    first_note_pending: bool,
    symbols: Vec<Symbol>,
    volume: u8,
    velocity: Option<u8>,
    expression: u8,
    pan: u8,
    /// Note already written up to `tick` and still sounding.
    partial_note: Option<usize>,
    note_release_tick: Tick,
    cursor: usize,
    note_count: usize,
    finished: bool,
}

impl Default for TrackState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            octave: DEFAULT_OCTAVE,
            active: Active::Rest,
            first_note_pending: true,
            symbols: Vec::new(),
            volume: DEFAULT_VOLUME,
            velocity: None,
            expression: DEFAULT_EXPRESSION,
            pan: DEFAULT_PAN,
            partial_note: None,
            note_release_tick: 0,
            cursor: 0,
            note_count: 0,
            finished: false,
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn active(&self) -> Active {
        self.active
    }

    pub fn has_symbols(&self) -> bool {
        !self.symbols.is_empty()
    }

    pub fn into_symbols(self) -> Vec<Symbol> {
        self.symbols
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn advance_cursor(&mut self) {
        self.cursor += 1;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn extend(&mut self, symbols: impl IntoIterator<Item = Symbol>) {
        self.symbols.extend(symbols);
    }

    pub fn voice(&self) -> VoiceMacroKey {
        VoiceMacroKey {
            volume: self.volume,
            velocity: self.velocity.unwrap_or(FALLBACK_VELOCITY),
            expression: self.expression,
            pan: self.pan,
        }
    }

    /// Each voice setter reports whether the value changed.
    pub fn set_volume(&mut self, volume: u8) -> bool {
        replace_if_changed(&mut self.volume, volume)
    }

    pub fn set_velocity(&mut self, velocity: u8) -> bool {
        let changed = self.velocity != Some(velocity);
        self.velocity = Some(velocity);
        changed
    }

    pub fn set_expression(&mut self, expression: u8) -> bool {
        replace_if_changed(&mut self.expression, expression)
    }

    pub fn set_pan(&mut self, pan: u8) -> bool {
        replace_if_changed(&mut self.pan, pan)
    }

    /// Returns true exactly once, for the first note of the track.
    pub fn take_first_note(&mut self) -> bool {
        std::mem::replace(&mut self.first_note_pending, false)
    }

    pub fn set_octave(&mut self, octave: i32) {
        self.octave = octave;
    }

    pub fn begin_note(&mut self, key: u8, release_tick: Tick) {
        self.active = Active::Note {
            key,
            index: self.note_count,
        };
        self.note_release_tick = release_tick;
        self.note_count += 1;
    }

    pub fn release(&mut self) {
        self.active = Active::Rest;
    }

    /// Move the track forward without writing anything yet.
    ///
    /// The caller writes the skipped span with [`TrackState::flush`].
    pub fn move_to(&mut self, tick: Tick) {
        self.tick = tick;
    }

    /// Write `[from, tick)` as the note or rest that was sounding.
    pub fn flush(&mut self, from: Tick, sounding: Active, timeline: &Timeline) {
        if self.tick <= from {
            return;
        }
        match sounding {
            Active::Rest => self.flush_rest(from, timeline),
            Active::Note { key, index } => {
                self.flush_note(from, key, index, timeline);
                self.partial_note = match self.active {
                    Active::Note { index: current, .. } if current == index => Some(index),
                    _ => None,
                };
            }
        }
    }

    fn flush_rest(&mut self, from: Tick, timeline: &Timeline) {
        for (start, end, on_boundary) in segments(from, self.tick, timeline.meter) {
            self.push_lengths(NoteKey::Rest, NoteKey::Rest, end - start, false, timeline);
            if on_boundary {
                self.symbols.push(Symbol::LineBreak);
            }
        }
    }

    fn flush_note(&mut self, from: Tick, key: u8, index: usize, timeline: &Timeline) {
        let target = octave_of(key);
        while self.octave < target {
            self.symbols.push(Symbol::OctaveUp);
            self.octave += 1;
        }
        while self.octave > target {
            self.symbols.push(Symbol::OctaveDown);
            self.octave -= 1;
        }

        let continues = self.partial_note == Some(index) && from <= self.note_release_tick;
        let mut head = if continues {
            NoteKey::Tie
        } else {
            NoteKey::Pitch(key)
        };
        for (start, end, on_boundary) in segments(from, self.tick, timeline.meter) {
            self.push_lengths(head, NoteKey::Tie, end - start, true, timeline);
            head = NoteKey::Tie;
            if on_boundary {
                self.symbols.push(Symbol::LineBreak);
            }
        }
    }

    fn push_lengths(
        &mut self,
        head: NoteKey,
        tail: NoteKey,
        ticks: Tick,
        dotted: bool,
        timeline: &Timeline,
    ) {
        if timeline.use_ticks {
            self.symbols.push(Symbol::note(head, NoteLength::Ticks(ticks)));
            return;
        }
        for (i, part) in timeline.lengths.decompose(ticks, dotted).into_iter().enumerate() {
            let key = if i == 0 { head } else { tail };
            self.symbols
                .push(Symbol::note(key, timeline.lengths.length_of(part)));
        }
    }
}

fn replace_if_changed(slot: &mut u8, value: u8) -> bool {
    let changed = *slot != value;
    *slot = value;
    changed
}

/// Split `[from, to)` at measure boundaries. The flag marks segments that
/// end exactly on a boundary.
fn segments(from: Tick, to: Tick, meter: &Meter) -> Vec<(Tick, Tick, bool)> {
    let mut out = Vec::new();
    let mut start = from;
    while start < to {
        let boundary = meter.next_boundary(start);
        let end = boundary.min(to);
        out.push((start, end, end == boundary));
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DotLimit;

    fn standard(denominator: u64, dots: u32) -> NoteLength {
        NoteLength::Standard { denominator, dots }
    }

    fn with_timeline<T>(f: impl FnOnce(&Timeline) -> T) -> T {
        let meter = Meter::common_time(48);
        let lengths = LengthTable::new(48, DotLimit::Unbounded);
        let timeline = Timeline {
            meter: &meter,
            lengths: &lengths,
            use_ticks: false,
        };
        f(&timeline)
    }

    #[test]
    fn test_rest_split_at_barline() {
        with_timeline(|timeline| {
            let mut state = TrackState::new();
            state.move_to(96);
            state.flush(0, Active::Rest, timeline);
            state.move_to(288);
            state.flush(96, Active::Rest, timeline);
            assert_eq!(
                state.symbols,
                &[
                    Symbol::note(NoteKey::Rest, standard(2, 0)),
                    Symbol::note(NoteKey::Rest, standard(2, 0)),
                    Symbol::LineBreak,
                    Symbol::note(NoteKey::Rest, standard(2, 0)),
                ]
            );
        });
    }

    #[test]
    fn test_note_moves_octave_and_ties_across_barline() {
        with_timeline(|timeline| {
            let mut state = TrackState::new();
            state.begin_note(72, 240);
            let sounding = state.active();
            state.move_to(144);
            state.flush(0, sounding, timeline);
            state.release();
            state.move_to(240);
            state.flush(144, sounding, timeline);
            assert_eq!(
                state.symbols,
                &[
                    Symbol::note(NoteKey::Pitch(72), standard(2, 1)),
                    Symbol::note(NoteKey::Tie, standard(4, 0)),
                    Symbol::LineBreak,
                    Symbol::note(NoteKey::Tie, standard(4, 0)),
                ]
            );
        });
    }

    #[test]
    fn test_released_note_is_not_continued() {
        with_timeline(|timeline| {
            let mut state = TrackState::new();
            state.set_octave(3);
            state.begin_note(60, 48);
            let first = state.active();
            state.move_to(48);
            state.flush(0, first, timeline);
            state.release();
            state.begin_note(60, 96);
            let second = state.active();
            state.move_to(96);
            state.flush(48, second, timeline);
            let text: Vec<&Symbol> = state.symbols.iter().collect();
            assert_eq!(text.len(), 2);
            assert_eq!(
                text[1],
                &Symbol::note(NoteKey::Pitch(60), standard(4, 0))
            );
        });
    }

    #[test]
    fn test_octave_down_and_ticks_mode() {
        let meter = Meter::common_time(48);
        let lengths = LengthTable::new(48, DotLimit::Unbounded);
        let timeline = Timeline {
            meter: &meter,
            lengths: &lengths,
            use_ticks: true,
        };
        let mut state = TrackState::new();
        state.begin_note(36, 50);
        let sounding = state.active();
        state.move_to(50);
        state.flush(0, sounding, &timeline);
        assert_eq!(
            state.symbols,
            &[
                Symbol::OctaveDown,
                Symbol::OctaveDown,
                Symbol::OctaveDown,
                Symbol::note(NoteKey::Pitch(36), NoteLength::Ticks(50)),
            ]
        );
    }

    #[test]
    fn test_voice_setters() {
        let mut state = TrackState::new();
        assert_eq!(state.voice().velocity, FALLBACK_VELOCITY);
        assert!(state.set_velocity(100));
        assert!(!state.set_velocity(100));
        assert!(!state.set_volume(DEFAULT_VOLUME));
        assert!(state.set_pan(0));
        assert!(state.take_first_note());
        assert!(!state.take_first_note());
    }
}
