//! Note length quantization.
//!
//! A note sounds for at least `min` ticks (until its note off) and may be
//! stretched up to `max` ticks (until the next note starts). The quantizer
//! picks a length in that window that reads well: a plain, dotted or
//! triplet fraction of the nearest power-of-two note.

use crate::config::{ConvertOptions, DotLimit, Granularity};
use crate::event::Tick;
use crate::notation::LengthTable;

#[derive(Debug, Clone)]
pub struct Quantizer {
    enabled: bool,
    max_dots: DotLimit,
    precision: Granularity,
    table: LengthTable,
}

impl Quantizer {
    pub fn new(resolution: u32, options: &ConvertOptions) -> Self {
        Self {
            enabled: options.quantize,
            max_dots: options.max_dots,
            precision: options.quantize_precision,
            table: LengthTable::new(resolution, options.max_dots),
        }
    }

    pub fn table(&self) -> &LengthTable {
        &self.table
    }

    /// Choose a length in `min..=max`, or `min` when quantization is off.
    ///
    /// The result never exceeds `max` and is at least one tick.
    pub fn quantize(&self, min: Tick, max: Tick) -> Tick {
        if !self.enabled || min == 0 {
            return min;
        }
        let max = max.max(min);
        let whole = self.table.whole();

        let whole_notes = (min - 1) / whole;
        let min_rest = min - whole * whole_notes;
        let max_rest = max - whole * whole_notes;

        let mut near = whole;
        while near / 2 >= min_rest {
            near /= 2;
        }

        let rates = self.rate_candidates(near);
        let rate_lower = min_rest as f64 / near as f64;
        let rate_upper = max_rest as f64 / near as f64;
        let min_component = self.precision.ticks(whole);

        let mut nearest = 0.0f64;
        let mut best = f64::MAX;
        for candidate in rates {
            let rate = candidate.min(rate_upper);
            let distance = (rate_lower - rate).abs();
            if distance <= best {
                let accepted = if near >= min_component && rate < rate_upper {
                    let length = (near as f64 * rate).round() as Tick;
                    self.table
                        .decompose(length, true)
                        .last()
                        .map_or(true, |&tail| tail >= min_component)
                } else {
                    true
                };
                if accepted {
                    nearest = rate;
                    best = distance;
                }
            }
            if rate >= rate_upper {
                break;
            }
        }

        let mut length = ((near as f64 * nearest).round() as Tick).min(max_rest);

        if length < min_rest {
            for part in self.table.decompose(max_rest - length, false) {
                if length + part <= min_rest {
                    length += part;
                } else {
                    let undershoot = min_rest - length;
                    let overshoot = length + part - min_rest;
                    if overshoot <= undershoot {
                        length += part;
                    }
                    break;
                }
            }
        }

        let quantized = length.max(1) + whole * whole_notes;
        tracing::trace!(min, max, near, rate = nearest, quantized, "quantize");
        quantized
    }

    /// Fractions of `near` worth trying, ascending.
    fn rate_candidates(&self, near: Tick) -> Vec<f64> {
        let mut rates = vec![0.5, 1.0];
        let mut dotted = 0.5;
        let mut dot = 1u32;
        while dot < 63 && self.max_dots.allows(dot) && near % (1 << dot) == 0 {
            dotted += 0.5f64.powi(dot as i32 + 1);
            rates.push(dotted);
            dot += 1;
        }
        if near * 2 % 3 == 0 {
            rates.push(2.0 / 3.0);
        }
        rates.sort_by(|a, b| a.total_cmp(b));
        rates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn quantizer(resolution: u32) -> Quantizer {
        Quantizer::new(resolution, &ConvertOptions::default())
    }

    #[test]
    fn test_exact_lengths_survive() {
        let q = quantizer(48);
        assert_eq!(q.quantize(48, 48), 48);
        assert_eq!(q.quantize(48, 96), 48);
        assert_eq!(q.quantize(72, 96), 72);
        assert_eq!(q.quantize(16, 16), 16);
        assert_eq!(q.quantize(192, 192), 192);
    }

    #[test]
    fn test_precision_drops_short_tails() {
        // 47 ticks would be 8... plus a 96th note
        assert_eq!(quantizer(48).quantize(47, 96), 48);

        let options = ConvertOptions {
            quantize_precision: Granularity::Exact,
            ..ConvertOptions::default()
        };
        assert_eq!(Quantizer::new(48, &options).quantize(47, 96), 47);
    }

    #[test]
    fn test_dotted_lengths() {
        let q = quantizer(48);
        assert_eq!(q.quantize(40, 48), 42);
        assert_eq!(q.quantize(45, 96), 45);
    }

    #[test]
    fn test_whole_notes_are_factored_out() {
        let q = quantizer(48);
        assert_eq!(q.quantize(192 + 48, 192 + 96), 240);
        assert_eq!(q.quantize(384, 400), 384);
    }

    #[test]
    fn test_tie_goes_to_later_candidate() {
        // 40/64 sits exactly between 0.5 and 0.75 of a quarter note
        let q = quantizer(64);
        assert_eq!(q.quantize(40, 256), 48);
    }

    #[test]
    fn test_result_clamped_to_max() {
        let q = quantizer(48);
        assert_eq!(q.quantize(50, 50), 50);
        assert!(q.quantize(13, 14) <= 14);
    }

    #[test]
    fn test_disabled_returns_min() {
        let options = ConvertOptions {
            quantize: false,
            ..ConvertOptions::default()
        };
        let q = Quantizer::new(48, &options);
        assert_eq!(q.quantize(47, 96), 47);
    }

    #[test]
    fn test_rate_candidates() {
        let q = quantizer(48);
        assert_eq!(q.rate_candidates(48), vec![0.5, 2.0 / 3.0, 0.75, 0.875, 0.9375, 0.96875, 1.0]);

        let options = ConvertOptions {
            max_dots: DotLimit::Max(1),
            ..ConvertOptions::default()
        };
        let q = Quantizer::new(48, &options);
        assert_eq!(q.rate_candidates(48), vec![0.5, 2.0 / 3.0, 0.75, 1.0]);
    }

    proptest! {
        #[test]
        fn quantized_length_stays_in_window(
            resolution in prop::sample::select(vec![24u32, 48, 96, 120, 480]),
            min in 1u64..2000,
            extra in 0u64..2000,
        ) {
            let q = quantizer(resolution);
            let length = q.quantize(min, min + extra);
            prop_assert!(length >= 1);
            prop_assert!(length <= min + extra);
        }

        #[test]
        fn disabled_quantizer_is_identity(min in 0u64..5000, max in 0u64..5000) {
            let options = ConvertOptions { quantize: false, ..ConvertOptions::default() };
            let q = Quantizer::new(48, &options);
            prop_assert_eq!(q.quantize(min, max), min);
        }
    }
}
