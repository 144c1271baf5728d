//! Instrument, pan and volume macros.
//!
//! Every combination the converter emits is registered once, in the order it
//! was first seen, and written out as a quoted `"NAME = value"` definition
//! ahead of the track bodies.

use serde::{Deserialize, Serialize};

use crate::config::ConvertOptions;
use crate::error::{ConvertError, Result};
use crate::notation::MmlSymbols;

/// Platform pan levels indexed by `y` value, `y0` is fully right.
const PAN_VALUES: [u8; 21] = [
    0x00, 0x01, 0x03, 0x07, 0x0D, 0x15, 0x1E, 0x29, 0x34, 0x42, 0x51, 0x5E, 0x67, 0x6E, 0x73,
    0x77, 0x7A, 0x7C, 0x7D, 0x7E, 0x7F,
];

const PAN_CENTER: usize = 10;

/// The four controllers folded into one volume macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceMacroKey {
    pub volume: u8,
    pub velocity: u8,
    pub expression: u8,
    pub pan: u8,
}

/// A macro invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MacroRef {
    Instrument(u8),
    Pan(u8),
    Voice(VoiceMacroKey),
}

impl MacroRef {
    /// Name used both in the definition and at the call site.
    pub fn name(&self, symbols: &MmlSymbols, pan_correction: bool) -> String {
        match self {
            MacroRef::Instrument(program) => format!("{}{:02X}", symbols.instrument_macro, program),
            MacroRef::Pan(pan) => format!("{}{:02X}", symbols.pan_macro, pan),
            MacroRef::Voice(key) => {
                let mut name = format!(
                    "{}{:02X}Q{:02X}E{:02X}",
                    symbols.volume_macro, key.volume, key.velocity, key.expression
                );
                if pan_correction {
                    name.push_str(&format!("P{:02X}", key.pan));
                }
                name
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroKind {
    Instrument,
    Pan,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub kind: MacroKind,
    pub name: String,
    pub value: String,
}

impl MacroDefinition {
    pub fn render(&self) -> String {
        format!("\"{} = {}\"", self.name, self.value)
    }
}

/// Macros observed during one conversion.
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    instruments: Vec<u8>,
    pans: Vec<u8>,
    voices: Vec<VoiceMacroKey>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro and return its ordinal within its kind. Observing
    /// the same macro again returns the same ordinal.
    pub fn observe(&mut self, reference: MacroRef) -> usize {
        match reference {
            MacroRef::Instrument(program) => observe_in(&mut self.instruments, program),
            MacroRef::Pan(pan) => observe_in(&mut self.pans, pan),
            MacroRef::Voice(key) => observe_in(&mut self.voices, key),
        }
    }

    /// Definitions in block order: instruments, pans, then volumes.
    ///
    /// Fails when the volume multiplier pushes a volume past 255.
    pub fn definitions(
        &self,
        symbols: &MmlSymbols,
        options: &ConvertOptions,
    ) -> Result<Vec<MacroDefinition>> {
        let pan_correction = !options.no_pan_correction;
        let mut definitions = Vec::with_capacity(
            self.instruments.len() + self.pans.len() + self.voices.len(),
        );

        for (ordinal, program) in self.instruments.iter().enumerate() {
            definitions.push(MacroDefinition {
                kind: MacroKind::Instrument,
                name: MacroRef::Instrument(*program).name(symbols, pan_correction),
                value: format!("{}{}", symbols.instrument, 30 + ordinal),
            });
        }

        for pan in &self.pans {
            definitions.push(MacroDefinition {
                kind: MacroKind::Pan,
                name: MacroRef::Pan(*pan).name(symbols, pan_correction),
                value: format!("{}{}", symbols.pan, find_pan_index(*pan)),
            });
        }

        for key in &self.voices {
            let name = MacroRef::Voice(*key).name(symbols, pan_correction);
            let value = voice_volume(key, options);
            if value > 255 {
                return Err(ConvertError::VolumeOverflow {
                    multiplier: options.volume_multiplier,
                    name,
                    value,
                });
            }
            definitions.push(MacroDefinition {
                kind: MacroKind::Voice,
                name,
                value: format!("{}{}", symbols.volume, value),
            });
        }

        Ok(definitions)
    }
}

fn observe_in<T: PartialEq>(seen: &mut Vec<T>, value: T) -> usize {
    match seen.iter().position(|v| *v == value) {
        Some(index) => index,
        None => {
            seen.push(value);
            seen.len() - 1
        }
    }
}

/// Write the three macro blocks, each closed by a blank line.
pub fn render_definitions(definitions: &[MacroDefinition]) -> String {
    let mut out = String::new();
    let blocks = [
        (MacroKind::Instrument, "; Instrument macros"),
        (MacroKind::Pan, "; Pan macros"),
        (MacroKind::Voice, "; Volume macros"),
    ];
    for (kind, title) in blocks {
        out.push_str(title);
        out.push('\n');
        for definition in definitions.iter().filter(|d| d.kind == kind) {
            out.push_str(&definition.render());
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Platform pan index whose left/right balance is closest to a MIDI pan.
pub fn find_pan_index(pan: u8) -> usize {
    match pan {
        0 => return 20,
        64 => return PAN_CENTER,
        127 => return 0,
        _ => {}
    }

    let pan_factor = f64::from(pan) / f64::from(128 - u16::from(pan));
    let mut previous = f64::INFINITY;
    for index in 0..PAN_VALUES.len() {
        let current = if PAN_VALUES[index] == 0 {
            f64::INFINITY
        } else {
            f64::from(PAN_VALUES[20 - index]) / f64::from(PAN_VALUES[index])
        };
        let diff = current - pan_factor;
        if index != 0 && diff * previous <= 0.0 {
            return if diff.abs() <= previous.abs() {
                index
            } else {
                index - 1
            };
        }
        previous = diff;
    }
    0
}

/// Output volume for a voice macro, before range checking.
///
/// Off-center pans play louder on the platform, so the volume is scaled down
/// by the square root of the level ratio unless pan correction is disabled.
fn voice_volume(key: &VoiceMacroKey, options: &ConvertOptions) -> i64 {
    let mut factor = f64::from(key.volume) / 127.0
        * (f64::from(key.velocity) / 127.0)
        * (f64::from(key.expression) / 127.0);

    let index = find_pan_index(key.pan);
    if !options.no_pan_correction && index != PAN_CENTER {
        let side = if index > PAN_CENTER { index } else { 20 - index };
        let correction = f64::from(PAN_VALUES[PAN_CENTER]) / f64::from(PAN_VALUES[side]);
        factor *= correction.sqrt();
    }

    (255.0 * factor * options.volume_multiplier.sqrt()).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(volume: u8, velocity: u8, expression: u8, pan: u8) -> MacroRef {
        MacroRef::Voice(VoiceMacroKey {
            volume,
            velocity,
            expression,
            pan,
        })
    }

    #[test]
    fn test_observe_is_idempotent() {
        let mut registry = MacroRegistry::new();
        assert_eq!(registry.observe(MacroRef::Instrument(5)), 0);
        assert_eq!(registry.observe(MacroRef::Instrument(2)), 1);
        assert_eq!(registry.observe(MacroRef::Instrument(5)), 0);
        assert_eq!(registry.observe(voice(100, 100, 127, 64)), 0);
        assert_eq!(registry.observe(voice(100, 100, 127, 64)), 0);
        assert_eq!(registry.observe(voice(100, 90, 127, 64)), 1);
        assert_eq!(registry.observe(MacroRef::Pan(64)), 0);
    }

    #[test]
    fn test_pan_index() {
        assert_eq!(find_pan_index(0), 20);
        assert_eq!(find_pan_index(64), 10);
        assert_eq!(find_pan_index(127), 0);
        assert_eq!(find_pan_index(32), 13);
        assert_eq!(find_pan_index(65), 10);
    }

    #[test]
    fn test_names() {
        let symbols = MmlSymbols::default();
        assert_eq!(MacroRef::Instrument(10).name(&symbols, true), "I0A");
        assert_eq!(MacroRef::Pan(64).name(&symbols, true), "Y40");
        assert_eq!(voice(100, 100, 127, 64).name(&symbols, true), "V64Q64E7FP40");
        assert_eq!(voice(100, 100, 127, 64).name(&symbols, false), "V64Q64E7F");
    }

    #[test]
    fn test_definitions() {
        let mut registry = MacroRegistry::new();
        registry.observe(MacroRef::Instrument(7));
        registry.observe(MacroRef::Instrument(0));
        registry.observe(MacroRef::Pan(0));
        registry.observe(voice(100, 100, 127, 64));
        registry.observe(voice(127, 127, 127, 0));

        let definitions = registry
            .definitions(&MmlSymbols::default(), &ConvertOptions::default())
            .unwrap();
        let rendered: Vec<String> = definitions.iter().map(|d| d.render()).collect();
        assert_eq!(
            rendered,
            vec![
                "\"I07 = @30\"",
                "\"I00 = @31\"",
                "\"Y00 = y20\"",
                "\"V64Q64E7FP40 = v158\"",
                "\"V7FQ7FE7FP00 = v204\"",
            ]
        );
    }

    #[test]
    fn test_without_pan_correction() {
        let mut registry = MacroRegistry::new();
        registry.observe(voice(127, 127, 127, 0));
        let options = ConvertOptions {
            no_pan_correction: true,
            ..ConvertOptions::default()
        };
        let definitions = registry
            .definitions(&MmlSymbols::default(), &options)
            .unwrap();
        assert_eq!(definitions[0].render(), "\"V7FQ7FE7F = v255\"");
    }

    #[test]
    fn test_volume_overflow() {
        let mut registry = MacroRegistry::new();
        registry.observe(voice(127, 127, 127, 64));
        let options = ConvertOptions {
            volume_multiplier: 4.0,
            ..ConvertOptions::default()
        };
        match registry.definitions(&MmlSymbols::default(), &options) {
            Err(ConvertError::VolumeOverflow { value, name, .. }) => {
                assert_eq!(value, 510);
                assert_eq!(name, "V7FQ7FE7FP40");
            }
            other => panic!("expected overflow, got {:?}", other),
        }
    }

    #[test]
    fn test_render_blocks() {
        let definitions = vec![MacroDefinition {
            kind: MacroKind::Voice,
            name: "V64P40".into(),
            value: "v158".into(),
        }];
        assert_eq!(
            render_definitions(&definitions),
            "; Instrument macros\n\n; Pan macros\n\n; Volume macros\n\"V64P40 = v158\"\n\n"
        );
    }
}
