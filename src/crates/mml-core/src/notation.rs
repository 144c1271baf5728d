//! Notation strings and expressible note lengths.

use serde::{Deserialize, Serialize};

use crate::config::DotLimit;
use crate::event::Tick;

/// Text for every token the converter can write.
///
/// The default matches the usual Super Famicom MML dialect. Field letters
/// inside volume macro names (`Q`, `E`, `P`) are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmlSymbols {
    pub notes: [String; 12],
    pub rest: String,
    pub tie: String,
    pub octave: String,
    pub tempo: String,
    pub instrument: String,
    pub pan: String,
    pub volume: String,
    pub octave_up: String,
    pub octave_down: String,
    pub triplet_start: String,
    pub triplet_end: String,
    /// Write `{c8c8c8}` rather than `{ccc}8`-style implicit lengths.
    pub triplet_lengths_in_bracket: bool,
    pub instrument_macro: String,
    pub volume_macro: String,
    pub pan_macro: String,
    /// Prefix for raw tick lengths, `c=24`.
    pub ticks: String,
    /// Track separator prefix, `#1`.
    pub channel: String,
}

impl Default for MmlSymbols {
    fn default() -> Self {
        let notes = ["c", "c+", "d", "d+", "e", "f", "f+", "g", "g+", "a", "a+", "b"];
        Self {
            notes: notes.map(String::from),
            rest: "r".into(),
            tie: "^".into(),
            octave: "o".into(),
            tempo: "t".into(),
            instrument: "@".into(),
            pan: "y".into(),
            volume: "v".into(),
            octave_up: ">".into(),
            octave_down: "<".into(),
            triplet_start: "{".into(),
            triplet_end: "}".into(),
            triplet_lengths_in_bracket: true,
            instrument_macro: "I".into(),
            volume_macro: "V".into(),
            pan_macro: "Y".into(),
            ticks: "=".into(),
            channel: "#".into(),
        }
    }
}

impl MmlSymbols {
    pub fn note_name(&self, key: u8) -> &str {
        &self.notes[usize::from(key % 12)]
    }

    pub fn key(&self, key: &NoteKey) -> &str {
        match key {
            NoteKey::Pitch(n) => self.note_name(*n),
            NoteKey::Rest => &self.rest,
            NoteKey::Tie => &self.tie,
        }
    }
}

/// What a note token sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKey {
    Pitch(u8),
    Rest,
    /// Continue the previous note.
    Tie,
}

/// Length suffix of a note token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteLength {
    /// `denominator` is the fraction of a whole note, `12` for a triplet eighth.
    Standard { denominator: u64, dots: u32 },
    Ticks(Tick),
    /// No suffix. Used inside triplet groups that carry the length outside.
    Implicit,
}

impl NoteLength {
    pub fn render(&self, symbols: &MmlSymbols) -> String {
        match self {
            NoteLength::Standard { denominator, dots } => {
                format!("{}{}", denominator, ".".repeat(*dots as usize))
            }
            NoteLength::Ticks(ticks) => format!("{}{}", symbols.ticks, ticks),
            NoteLength::Implicit => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    ticks: Tick,
    denominator: u64,
    dots: u32,
}

/// Every length a single note token can express at one resolution.
///
/// Undotted lengths are the exact divisors of a whole note. Dotted lengths
/// extend a divisor while the halved part stays integral and the result is
/// not already expressible without dots.
#[derive(Debug, Clone)]
pub struct LengthTable {
    whole: Tick,
    entries: Vec<Entry>,
}

impl LengthTable {
    pub fn new(resolution: u32, max_dots: DotLimit) -> Self {
        let whole = Tick::from(resolution.max(1)) * 4;
        let mut entries: Vec<Entry> = (1..=whole)
            .filter(|ticks| whole % ticks == 0)
            .map(|ticks| Entry {
                ticks,
                denominator: whole / ticks,
                dots: 0,
            })
            .collect();

        let bases: Vec<Entry> = entries.clone();
        for base in bases {
            let mut total = base.ticks;
            let mut dot = 1u32;
            while dot < 64 && max_dots.allows(dot) && base.ticks % (1 << dot) == 0 {
                total += base.ticks >> dot;
                if total >= whole || entries.iter().any(|e| e.ticks == total) {
                    break;
                }
                entries.push(Entry {
                    ticks: total,
                    denominator: base.denominator,
                    dots: dot,
                });
                dot += 1;
            }
        }

        entries.sort_by(|a, b| b.ticks.cmp(&a.ticks));
        Self { whole, entries }
    }

    pub fn whole(&self) -> Tick {
        self.whole
    }

    /// Split `ticks` into expressible lengths, longest first.
    ///
    /// Whole notes come first, then the longest entry that still fits, with
    /// dotted entries considered only when `dotted` is set. While the
    /// remainder is a multiple of the shortest power-of-two length, only
    /// power-of-two based entries are used, so a dotted quarter never turns
    /// into a half triplet plus change. The parts always sum to `ticks`.
    pub fn decompose(&self, ticks: Tick, dotted: bool) -> Vec<Tick> {
        let binary_unit = self.whole >> self.whole.trailing_zeros();
        let mut parts = Vec::new();
        let mut rest = ticks;
        while rest >= self.whole {
            parts.push(self.whole);
            rest -= self.whole;
        }
        while rest > 0 {
            let binary_only = rest % binary_unit == 0;
            let part = self
                .entries
                .iter()
                .find(|e| {
                    e.ticks <= rest
                        && (dotted || e.dots == 0)
                        && (!binary_only || e.denominator.is_power_of_two())
                })
                .map_or(rest, |e| e.ticks);
            parts.push(part);
            rest -= part;
        }
        parts
    }

    /// Notation for a length produced by [`LengthTable::decompose`].
    pub fn length_of(&self, ticks: Tick) -> NoteLength {
        if ticks == self.whole {
            return NoteLength::Standard {
                denominator: 1,
                dots: 0,
            };
        }
        self.entries
            .iter()
            .find(|e| e.ticks == ticks)
            .map_or(NoteLength::Ticks(ticks), |e| NoteLength::Standard {
                denominator: e.denominator,
                dots: e.dots,
            })
    }
}
