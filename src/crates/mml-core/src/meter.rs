//! Measure bookkeeping from time signature events.

use serde::Serialize;

use crate::error::{ConvertError, Result};
use crate::event::{EventKind, Sequence, Tick};

/// A stretch of the sequence that keeps one time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeterSegment {
    pub start_tick: Tick,
    pub start_measure: u64,
    pub numerator: u32,
    /// Power-of-two exponent, `2` means quarter notes.
    pub denominator: u32,
    pub measure_length: Tick,
}

impl MeterSegment {
    fn new(resolution: u32, numerator: u32, denominator: u32) -> Option<Self> {
        let measure_length = (u64::from(resolution) * 4 * u64::from(numerator))
            .checked_shr(denominator)
            .unwrap_or(0);
        (measure_length > 0).then_some(Self {
            start_tick: 0,
            start_measure: 0,
            numerator,
            denominator,
            measure_length,
        })
    }

    fn measure_at(&self, tick: Tick) -> u64 {
        self.start_measure + (tick - self.start_tick) / self.measure_length
    }
}

/// Ordered time signature segments for a whole sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meter {
    segments: Vec<MeterSegment>,
}

impl Meter {
    /// Plain 4/4 for the given resolution.
    pub fn common_time(resolution: u32) -> Self {
        Self {
            segments: MeterSegment::new(resolution.max(1), 4, 2).into_iter().collect(),
        }
    }

    /// Collect and validate the time signatures of every track.
    ///
    /// Signatures must sit exactly on a measure boundary of the previous
    /// signature, at most one per measure, and the first one must open the
    /// first measure. A sequence without any signature gets 4/4.
    pub fn from_sequence(sequence: &Sequence) -> Result<Self> {
        let mut events: Vec<(Tick, &[u8])> = sequence
            .tracks
            .iter()
            .flatten()
            .filter_map(|event| match &event.kind {
                EventKind::TimeSignature(data) => Some((event.tick, data.as_slice())),
                _ => None,
            })
            .collect();
        events.sort_by_key(|(tick, _)| *tick);

        if events.is_empty() {
            tracing::warn!("no time signature found, assuming 4/4");
            return Ok(Self::common_time(sequence.resolution));
        }

        let mut segments: Vec<MeterSegment> = Vec::with_capacity(events.len());
        for (tick, data) in events {
            if data.len() != 4 {
                return Err(ConvertError::MalformedTimeSignature {
                    tick,
                    reason: format!("expected 4 bytes, got {}", data.len()),
                });
            }
            let mut segment = MeterSegment::new(
                sequence.resolution,
                u32::from(data[0]),
                u32::from(data[1]),
            )
            .ok_or_else(|| ConvertError::MalformedTimeSignature {
                tick,
                reason: format!("{}/2^{} has no length", data[0], data[1]),
            })?;

            let measure = match segments.last() {
                Some(previous) => {
                    if (tick - previous.start_tick) % previous.measure_length != 0 {
                        return Err(ConvertError::MisalignedTimeSignature { tick });
                    }
                    let measure = previous.measure_at(tick);
                    if measure == previous.start_measure {
                        return Err(ConvertError::DuplicateTimeSignature { measure });
                    }
                    measure
                }
                None => {
                    if tick % segment.measure_length != 0 {
                        return Err(ConvertError::MisalignedTimeSignature { tick });
                    }
                    let measure = tick / segment.measure_length;
                    if measure != 0 {
                        return Err(ConvertError::LateFirstTimeSignature { measure });
                    }
                    measure
                }
            };

            segment.start_tick = tick;
            segment.start_measure = measure;
            tracing::debug!(
                tick,
                measure,
                numerator = segment.numerator,
                denominator = 1u64 << segment.denominator.min(63),
                "time signature"
            );
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[MeterSegment] {
        &self.segments
    }

    fn segment_at(&self, tick: Tick) -> Option<&MeterSegment> {
        let index = self.segments.partition_point(|s| s.start_tick <= tick);
        index.checked_sub(1).map(|i| &self.segments[i])
    }

    /// Zero-based measure number that contains `tick`.
    pub fn measure_at(&self, tick: Tick) -> u64 {
        self.segment_at(tick).map_or(0, |s| s.measure_at(tick))
    }

    /// First measure boundary strictly after `tick`.
    pub fn next_boundary(&self, tick: Tick) -> Tick {
        match self.segment_at(tick) {
            Some(s) => {
                let measures = (tick - s.start_tick) / s.measure_length + 1;
                s.start_tick + measures * s.measure_length
            }
            None => Tick::MAX,
        }
    }
}
