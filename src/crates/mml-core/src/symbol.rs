//! Emitted MML tokens and their text form.

use serde::{Deserialize, Serialize};

use crate::config::ConvertOptions;
use crate::notation::{MmlSymbols, NoteKey, NoteLength};
use crate::registry::MacroRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Symbol {
    Note { key: NoteKey, length: NoteLength },
    SetOctave(i32),
    OctaveUp,
    OctaveDown,
    Tempo(u32),
    Macro(MacroRef),
    LineBreak,
    Triplet(Vec<Symbol>),
}

impl Symbol {
    pub fn note(key: NoteKey, length: NoteLength) -> Self {
        Symbol::Note { key, length }
    }

    pub fn is_octave_shift(&self) -> bool {
        matches!(self, Symbol::OctaveUp | Symbol::OctaveDown)
    }
}

/// Turns symbols into MML text.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    symbols: &'a MmlSymbols,
    reverse_octave: bool,
    pan_correction: bool,
    put_spaces: bool,
}

impl<'a> Renderer<'a> {
    pub fn new(symbols: &'a MmlSymbols, options: &ConvertOptions) -> Self {
        Self {
            symbols,
            reverse_octave: options.reverse_octave,
            pan_correction: !options.no_pan_correction,
            put_spaces: options.put_spaces,
        }
    }

    pub fn symbol(&self, symbol: &Symbol) -> String {
        let s = self.symbols;
        match symbol {
            Symbol::Note { key, length } => format!("{}{}", s.key(key), length.render(s)),
            Symbol::SetOctave(octave) => format!("{}{}", s.octave, octave),
            Symbol::OctaveUp if self.reverse_octave => s.octave_down.clone(),
            Symbol::OctaveUp => s.octave_up.clone(),
            Symbol::OctaveDown if self.reverse_octave => s.octave_up.clone(),
            Symbol::OctaveDown => s.octave_down.clone(),
            Symbol::Tempo(tempo) => format!("{}{}", s.tempo, tempo),
            Symbol::Macro(reference) => reference.name(s, self.pan_correction),
            Symbol::LineBreak => "\n".to_string(),
            Symbol::Triplet(inner) => {
                let body: String = inner.iter().map(|symbol| self.symbol(symbol)).collect();
                format!("{}{}{}", s.triplet_start, body, s.triplet_end)
            }
        }
    }

    /// Render one track body. Spaces, when enabled, go between tokens but
    /// never between consecutive octave shifts or around line breaks.
    pub fn track(&self, symbols: &[Symbol]) -> String {
        let mut out = String::new();
        for (index, symbol) in symbols.iter().enumerate() {
            out.push_str(&self.symbol(symbol));
            if !self.put_spaces || matches!(symbol, Symbol::LineBreak) {
                continue;
            }
            match symbols.get(index + 1) {
                None | Some(Symbol::LineBreak) => {}
                Some(next) if symbol.is_octave_shift() && next.is_octave_shift() => {}
                Some(_) => out.push(' '),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter(key: u8) -> Symbol {
        Symbol::note(
            NoteKey::Pitch(key),
            NoteLength::Standard {
                denominator: 4,
                dots: 0,
            },
        )
    }

    #[test]
    fn test_render_tokens() {
        let symbols = MmlSymbols::default();
        let options = ConvertOptions::default();
        let renderer = Renderer::new(&symbols, &options);
        let track = vec![
            Symbol::Tempo(49),
            Symbol::SetOctave(3),
            quarter(60),
            Symbol::OctaveUp,
            quarter(73),
            Symbol::LineBreak,
            Symbol::note(NoteKey::Rest, NoteLength::Ticks(5)),
        ];
        assert_eq!(renderer.track(&track), "t49o3c4>c+4\nr=5");
    }

    #[test]
    fn test_reverse_octave() {
        let symbols = MmlSymbols::default();
        let options = ConvertOptions {
            reverse_octave: true,
            ..ConvertOptions::default()
        };
        let renderer = Renderer::new(&symbols, &options);
        assert_eq!(renderer.symbol(&Symbol::OctaveUp), "<");
        assert_eq!(renderer.symbol(&Symbol::OctaveDown), ">");
    }

    #[test]
    fn test_spaces() {
        let symbols = MmlSymbols::default();
        let options = ConvertOptions {
            put_spaces: true,
            ..ConvertOptions::default()
        };
        let renderer = Renderer::new(&symbols, &options);
        let track = vec![
            Symbol::SetOctave(3),
            quarter(60),
            Symbol::OctaveUp,
            Symbol::OctaveUp,
            quarter(84),
            Symbol::LineBreak,
            Symbol::Triplet(vec![quarter(60), quarter(62), quarter(64)]),
        ];
        assert_eq!(renderer.track(&track), "o3 c4 >> c4\n{c4d4e4}");
    }
}
