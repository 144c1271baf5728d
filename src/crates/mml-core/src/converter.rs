//! The tick-synchronized conversion pass.
//!
//! All tracks are walked together, one tick at a time, jumping straight to
//! the next tick that carries an event. Each event updates its track's
//! [`TrackState`]; whenever the track's tick moves, the span it skipped is
//! written as the note or rest that was sounding before the event.

use serde::Serialize;

use crate::config::ConvertOptions;
use crate::error::{ConvertError, Result};
use crate::event::{
    relocate_note_off_events, scan_notes, Event, EventKind, Note, Sequence, Tick, CC_EXPRESSION,
    CC_PAN, CC_VOLUME,
};
use crate::meter::Meter;
use crate::notation::MmlSymbols;
use crate::postprocess::post_process;
use crate::quantizer::Quantizer;
use crate::registry::{render_definitions, MacroDefinition, MacroRef, MacroRegistry};
use crate::symbol::{Renderer, Symbol};
use crate::track::{octave_of, Active, Timeline, TrackState};
use crate::triplet::rewrite_triplets;

/// Tempo unit of the target platform relative to beats per minute.
const TEMPO_FACTOR: f64 = 0.4096;

/// Reusable converter. Every call to [`Converter::convert`] starts from a
/// fresh macro registry and fresh track states.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConvertOptions,
    symbols: MmlSymbols,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self {
            options,
            symbols: MmlSymbols::default(),
        }
    }

    pub fn with_symbols(mut self, symbols: MmlSymbols) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn convert(&self, sequence: &Sequence) -> Result<Conversion> {
        self.options.validate()?;
        if sequence.resolution == 0 {
            return Err(ConvertError::invalid_option("resolution must be positive"));
        }

        let meter = Meter::from_sequence(sequence)?;

        let mut tracks = sequence.tracks.clone();
        for events in &mut tracks {
            relocate_note_off_events(events);
        }
        let notes = tracks
            .iter()
            .enumerate()
            .map(|(index, events)| scan_notes(index, events))
            .collect::<Result<Vec<_>>>()?;
        let inputs: Vec<TrackInput> = tracks
            .iter()
            .zip(&notes)
            .map(|(events, notes)| TrackInput {
                events,
                notes,
                end_tick: events.last().map_or(0, |e| e.tick),
            })
            .collect();

        let quantizer = Quantizer::new(sequence.resolution, &self.options);
        let mut pass = Pass {
            options: &self.options,
            quantizer: &quantizer,
            timeline: Timeline {
                meter: &meter,
                lengths: quantizer.table(),
                use_ticks: self.options.use_ticks,
            },
            registry: MacroRegistry::new(),
        };

        let mut states = vec![TrackState::new(); inputs.len()];
        while let Some(now) = next_tick(&inputs, &states) {
            for (index, (input, state)) in inputs.iter().zip(states.iter_mut()).enumerate() {
                while let Some(event) = input.events.get(state.cursor()).filter(|e| e.tick == now) {
                    state.advance_cursor();
                    tracing::trace!(track = index, tick = now, kind = ?event.kind, "event");
                    pass.process(input, state, event, now)?;
                }
                if state.cursor() >= input.events.len() && !state.is_finished() {
                    state.finish();
                }
            }
        }

        let macros = if self.options.no_control_changes {
            Vec::new()
        } else {
            pass.registry.definitions(&self.symbols, &self.options)?
        };

        let tracks: Vec<ConvertedTrack> = states
            .into_iter()
            .enumerate()
            .filter(|(_, state)| state.has_symbols())
            .map(|(source, state)| {
                let symbols = state.into_symbols();
                let symbols = if self.options.use_triplets {
                    rewrite_triplets(symbols, self.symbols.triplet_lengths_in_bracket)
                } else {
                    symbols
                };
                ConvertedTrack { source, symbols }
            })
            .collect();

        tracing::debug!(
            tracks = tracks.len(),
            macros = macros.len(),
            measures = meter.measure_at(inputs.iter().map(|i| i.end_tick).max().unwrap_or(0)) + 1,
            "conversion finished"
        );

        Ok(Conversion {
            resolution: sequence.resolution,
            macros,
            tracks,
            symbols: self.symbols.clone(),
            options: self.options.clone(),
        })
    }
}

struct TrackInput<'a> {
    events: &'a [Event],
    notes: &'a [Note],
    /// Tick of the track's last event.
    end_tick: Tick,
}

/// Smallest pending event tick among unfinished tracks.
fn next_tick(inputs: &[TrackInput], states: &[TrackState]) -> Option<Tick> {
    inputs
        .iter()
        .zip(states)
        .filter_map(|(input, state)| input.events.get(state.cursor()).map(|e| e.tick))
        .min()
}

/// Mutable context of one conversion.
struct Pass<'a> {
    options: &'a ConvertOptions,
    quantizer: &'a Quantizer,
    timeline: Timeline<'a>,
    registry: MacroRegistry,
}

impl Pass<'_> {
    fn process(
        &mut self,
        input: &TrackInput,
        state: &mut TrackState,
        event: &Event,
        now: Tick,
    ) -> Result<()> {
        let last_tick = state.tick();
        let sounding = state.active();

        let pending = match &event.kind {
            kind if kind.is_note_off() => {
                self.note_off(input, state, kind.key(), now);
                Vec::new()
            }
            EventKind::NoteOn { key, velocity, .. } => {
                self.note_on(input, state, *key, *velocity, now)
            }
            kind => self.control(state, kind, event.tick, now)?,
        };

        // trailing rest up to the last event of the track
        if state.cursor() == input.events.len() && state.has_symbols() && state.tick() < now {
            state.move_to(now);
        }

        if state.tick() > last_tick {
            state.flush(last_tick, sounding, &self.timeline);
        }
        state.extend(pending);
        Ok(())
    }

    fn note_off(&mut self, input: &TrackInput, state: &mut TrackState, key: Option<u8>, now: Tick) {
        let Active::Note { key: active, index } = state.active() else {
            return;
        };
        let last_tick = state.tick();
        if key != Some(active) || now <= last_tick {
            return;
        }

        let min = now - last_tick;
        let next_start = input
            .notes
            .get(index + 1)
            .map_or(input.end_tick, |note| note.tick);
        let max = next_start.saturating_sub(last_tick).max(min);
        let length = self.quantizer.quantize(min, max);
        tracing::debug!(key = active, min, max, length, "note released");

        state.move_to(last_tick + length);
        state.release();
    }

    fn note_on(
        &mut self,
        input: &TrackInput,
        state: &mut TrackState,
        key: u8,
        velocity: u8,
        now: Tick,
    ) -> Vec<Symbol> {
        let mut pending = Vec::new();
        if state.set_velocity(velocity) {
            let voice = MacroRef::Voice(state.voice());
            self.emit_macro(&mut pending, voice);
        }
        if state.take_first_note() {
            let octave = octave_of(key);
            pending.push(Symbol::SetOctave(octave));
            state.set_octave(octave);
        }

        if now >= state.tick() {
            state.move_to(now);
        }
        let release_tick = input.events[state.cursor()..]
            .iter()
            .find(|e| e.kind.is_note_off() && e.kind.key() == Some(key))
            .map_or(input.end_tick, |e| e.tick);
        state.begin_note(key, release_tick);
        pending
    }

    fn control(
        &mut self,
        state: &mut TrackState,
        kind: &EventKind,
        tick: Tick,
        now: Tick,
    ) -> Result<Vec<Symbol>> {
        let mut pending = Vec::new();
        match kind {
            EventKind::ProgramChange { program, .. } => {
                self.emit_macro(&mut pending, MacroRef::Instrument(*program));
            }
            EventKind::ControlChange {
                controller, value, ..
            } => match *controller {
                CC_VOLUME => {
                    if state.set_volume(*value) {
                        self.emit_macro(&mut pending, MacroRef::Voice(state.voice()));
                    }
                }
                CC_PAN => {
                    self.registry.observe(MacroRef::Pan(*value));
                    if state.set_pan(*value) {
                        self.emit_macro(&mut pending, MacroRef::Voice(state.voice()));
                        self.emit_macro(&mut pending, MacroRef::Pan(*value));
                    }
                }
                CC_EXPRESSION if !self.options.ignore_expression => {
                    if state.set_expression(*value) {
                        self.emit_macro(&mut pending, MacroRef::Voice(state.voice()));
                    }
                }
                _ => {}
            },
            EventKind::Tempo(data) => pending.push(Symbol::Tempo(tempo_value(tick, data)?)),
            _ => {}
        }

        if !pending.is_empty() && now >= state.tick() {
            state.move_to(now);
        }
        Ok(pending)
    }

    /// Register a macro and queue its invocation unless control changes are
    /// suppressed.
    fn emit_macro(&mut self, pending: &mut Vec<Symbol>, reference: MacroRef) {
        self.registry.observe(reference);
        if !self.options.no_control_changes {
            pending.push(Symbol::Macro(reference));
        }
    }
}

/// Platform tempo for a tempo meta payload (microseconds per quarter note).
fn tempo_value(tick: Tick, data: &[u8]) -> Result<u32> {
    let [a, b, c] = data else {
        return Err(ConvertError::MalformedTempo {
            tick,
            reason: format!("expected 3 bytes, got {}", data.len()),
        });
    };
    let micros = u32::from_be_bytes([0, *a, *b, *c]);
    if micros == 0 {
        return Err(ConvertError::MalformedTempo {
            tick,
            reason: "zero microseconds per quarter note".to_string(),
        });
    }
    Ok((60_000_000.0 / f64::from(micros) * TEMPO_FACTOR).round() as u32)
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertedTrack {
    /// Index of the input track this body came from.
    pub source: usize,
    pub symbols: Vec<Symbol>,
}

/// Result of one conversion, ready to be rendered.
#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub resolution: u32,
    pub macros: Vec<MacroDefinition>,
    /// Tracks that produced output, in input order.
    pub tracks: Vec<ConvertedTrack>,
    #[serde(skip)]
    symbols: MmlSymbols,
    #[serde(skip)]
    options: ConvertOptions,
}

impl Conversion {
    /// Macro blocks followed by the track bodies, before cleanup.
    pub fn render_raw(&self) -> String {
        let renderer = Renderer::new(&self.symbols, &self.options);
        let mut out = if self.options.no_control_changes {
            String::new()
        } else {
            render_definitions(&self.macros)
        };

        for (ordinal, track) in self.tracks.iter().enumerate() {
            if ordinal > 0 {
                out.push('\n');
                out.push_str(&self.symbols.channel);
                out.push_str(&ordinal.to_string());
                out.push('\n');
            }
            let body = renderer.track(&track.symbols);
            out.push_str(&body);
            if !body.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    /// Final MML text.
    pub fn to_mml(&self) -> Result<String> {
        post_process(&self.render_raw(), &self.symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_value() {
        // 120 bpm
        assert_eq!(tempo_value(0, &[0x07, 0xA1, 0x20]).unwrap(), 49);
        assert!(matches!(
            tempo_value(5, &[0x07, 0xA1]),
            Err(ConvertError::MalformedTempo { tick: 5, .. })
        ));
        assert!(matches!(
            tempo_value(0, &[0, 0, 0]),
            Err(ConvertError::MalformedTempo { .. })
        ));
    }

    #[test]
    fn test_empty_sequence() {
        let conversion = Converter::default()
            .convert(&Sequence::new(48).with_track(vec![]))
            .unwrap();
        assert!(conversion.tracks.is_empty());
        assert_eq!(
            conversion.to_mml().unwrap(),
            "; Instrument macros\n\n; Pan macros\n\n; Volume macros\n\n"
        );
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let result = Converter::default().convert(&Sequence::new(0));
        assert!(matches!(result, Err(ConvertError::InvalidOption(_))));
    }
}
