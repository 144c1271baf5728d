//! Folding triplet-length notes into bracketed groups.
//!
//! A unit is any number of octave shifts followed by one undotted note, rest
//! or tie whose length is `3 * 2^k`. Three units of one length, or two units
//! whose lengths differ by a factor of two, become one [`Symbol::Triplet`].

use crate::notation::{NoteKey, NoteLength};
use crate::symbol::Symbol;

const MAX_SCALE: u32 = 8;

/// Position and scale of one unit.
#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    /// Index of the note symbol, after any octave shifts.
    note: usize,
    scale: u32,
}

impl Unit {
    fn end(&self) -> usize {
        self.note + 1
    }
}

fn unit_at(symbols: &[Symbol], start: usize) -> Option<Unit> {
    let note = start + symbols[start..].iter().take_while(|s| s.is_octave_shift()).count();
    match symbols.get(note)? {
        Symbol::Note {
            length: NoteLength::Standard {
                denominator,
                dots: 0,
            },
            ..
        } if denominator % 3 == 0 && (denominator / 3).is_power_of_two() => {
            let scale = (denominator / 3).trailing_zeros();
            (scale < MAX_SCALE).then_some(Unit { start, note, scale })
        }
        _ => None,
    }
}

/// Copy a unit with its note length replaced.
fn copy_unit(symbols: &[Symbol], unit: Unit, length: NoteLength, out: &mut Vec<Symbol>) {
    out.extend_from_slice(&symbols[unit.start..unit.note]);
    if let Symbol::Note { key, .. } = symbols[unit.note] {
        out.push(Symbol::note(key, length));
    }
}

fn scaled(scale: u32, in_bracket: bool) -> NoteLength {
    if in_bracket {
        NoteLength::Standard {
            denominator: 1 << scale,
            dots: 0,
        }
    } else {
        NoteLength::Implicit
    }
}

/// Rewrite one track body. Symbols that do not form a group pass through.
///
/// Without in-bracket lengths a 2:1 pair is written with a tie, `{c^c}`,
/// and a 1:2 pair as `{cc^}`.
pub fn rewrite_triplets(symbols: Vec<Symbol>, in_bracket: bool) -> Vec<Symbol> {
    let mut out = Vec::with_capacity(symbols.len());
    let mut i = 0;
    while i < symbols.len() {
        let Some(first) = unit_at(&symbols, i) else {
            out.push(symbols[i].clone());
            i += 1;
            continue;
        };
        let second = unit_at(&symbols, first.end());

        let triple = second.and_then(|second| {
            let third = unit_at(&symbols, second.end())?;
            (first.scale == second.scale && second.scale == third.scale)
                .then_some([first, second, third])
        });
        if let Some(units) = triple {
            let mut group = Vec::new();
            for unit in units {
                copy_unit(&symbols, unit, scaled(unit.scale, in_bracket), &mut group);
            }
            out.push(Symbol::Triplet(group));
            i = units[2].end();
            continue;
        }

        let pair = second.filter(|second| first.scale.abs_diff(second.scale) == 1);
        if let Some(second) = pair {
            let mut group = Vec::new();
            copy_unit(&symbols, first, scaled(first.scale, in_bracket), &mut group);
            if !in_bracket && first.scale < second.scale {
                group.push(Symbol::note(NoteKey::Tie, NoteLength::Implicit));
            }
            copy_unit(&symbols, second, scaled(second.scale, in_bracket), &mut group);
            if !in_bracket && first.scale > second.scale {
                group.push(Symbol::note(NoteKey::Tie, NoteLength::Implicit));
            }
            out.push(Symbol::Triplet(group));
            i = second.end();
            continue;
        }

        out.push(symbols[i].clone());
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(key: u8, denominator: u64) -> Symbol {
        Symbol::note(
            NoteKey::Pitch(key),
            NoteLength::Standard {
                denominator,
                dots: 0,
            },
        )
    }

    fn implicit(key: NoteKey) -> Symbol {
        Symbol::note(key, NoteLength::Implicit)
    }

    #[test]
    fn test_three_equal_units() {
        let track = vec![note(60, 12), note(62, 12), note(64, 12), note(65, 4)];
        let rewritten = rewrite_triplets(track, true);
        assert_eq!(
            rewritten,
            vec![
                Symbol::Triplet(vec![note(60, 4), note(62, 4), note(64, 4)]),
                note(65, 4),
            ]
        );
    }

    #[test]
    fn test_octave_shifts_stay_inside_group() {
        let track = vec![note(60, 24), Symbol::OctaveUp, note(72, 24), note(74, 24)];
        let rewritten = rewrite_triplets(track, false);
        assert_eq!(
            rewritten,
            vec![Symbol::Triplet(vec![
                implicit(NoteKey::Pitch(60)),
                Symbol::OctaveUp,
                implicit(NoteKey::Pitch(72)),
                implicit(NoteKey::Pitch(74)),
            ])]
        );
    }

    #[test]
    fn test_pairs() {
        let long_short = vec![note(60, 6), note(62, 12)];
        assert_eq!(
            rewrite_triplets(long_short.clone(), true),
            vec![Symbol::Triplet(vec![note(60, 2), note(62, 4)])]
        );
        assert_eq!(
            rewrite_triplets(long_short, false),
            vec![Symbol::Triplet(vec![
                implicit(NoteKey::Pitch(60)),
                implicit(NoteKey::Tie),
                implicit(NoteKey::Pitch(62)),
            ])]
        );

        let short_long = vec![note(60, 12), note(62, 6)];
        assert_eq!(
            rewrite_triplets(short_long, false),
            vec![Symbol::Triplet(vec![
                implicit(NoteKey::Pitch(60)),
                implicit(NoteKey::Pitch(62)),
                implicit(NoteKey::Tie),
            ])]
        );
    }

    #[test]
    fn test_untouched() {
        let track = vec![
            note(60, 4),
            note(60, 12),
            Symbol::LineBreak,
            note(60, 12),
            note(60, 3),
            Symbol::note(
                NoteKey::Rest,
                NoteLength::Standard {
                    denominator: 12,
                    dots: 1,
                },
            ),
        ];
        assert_eq!(rewrite_triplets(track.clone(), true), track);
    }
}
