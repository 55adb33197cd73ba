//! FM demodulation by polar discrimination.
//!
//! The instantaneous frequency of a complex baseband signal is the rate of
//! change of its phase. The polar discriminator measures it directly as the
//! angle of `s[i+1] · conj(s[i])`, which is already confined to one turn and
//! never needs unwrapping.
//!
//! - [`demodulate`]: whole-sequence discriminator, `len - 1` outputs
//! - [`Discriminator`]: chunked version carrying the last sample across calls
//! - [`to_hz`]: radians per sample to Hz
//!
//! # Example
//!
//! ```
//! use iqfm::SampleSequence;
//! use iqfm::dsp::fm::demodulate;
//! use num_complex::Complex;
//!
//! let samples = vec![Complex::new(1.0, 0.0), Complex::new(0.0, 1.0)];
//! let input = SampleSequence::new(samples, 48_000.0).unwrap();
//! let out = demodulate(&input);
//! assert_eq!(out.len(), 1);
//! assert!((out[0] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
//! ```

use std::f64::consts::{PI, TAU};

use tracing::warn;

use crate::sequence::{Sample, SampleSequence};

/// Angle of `z` in `(-π, π]`.
///
/// `atan2` already returns `(-π, π]` for every finite input except a negative
/// zero imaginary part, which it maps to `-π`; that is folded back to `π`.
/// The angle of zero is taken to be zero.
pub fn angle(z: Sample) -> f64 {
    if z.re == 0.0 && z.im == 0.0 {
        return 0.0;
    }
    let a = z.im.atan2(z.re);
    if a == -PI { PI } else { a }
}

/// Polar discriminator over a whole sequence.
///
/// Returns `angle(s[i+1] · conj(s[i]))` for every adjacent pair, so the
/// output is one sample shorter than the input. Inputs shorter than two
/// samples give an empty output.
pub fn demodulate(input: &SampleSequence) -> Vec<f64> {
    demodulate_samples(input.samples())
}

pub fn demodulate_samples(samples: &[Sample]) -> Vec<f64> {
    if samples.len() < 2 {
        warn!(samples = samples.len(), "too few samples to demodulate");
        return Vec::new();
    }
    samples
        .windows(2)
        .map(|pair| angle(pair[1] * pair[0].conj()))
        .collect()
}

/// Convert discriminator output in radians per sample to Hz.
pub fn to_hz(radians: &[f64], sample_rate: f64) -> Vec<f64> {
    let scale = sample_rate / TAU;
    radians.iter().map(|r| r * scale).collect()
}

/// Chunked polar discriminator.
///
/// The first sample of a stream has no predecessor and produces nothing;
/// every later sample produces one output, so the concatenated outputs equal
/// [`demodulate`] over the concatenated input.
///
/// # Example
///
/// ```
/// use iqfm::dsp::fm::Discriminator;
/// use num_complex::Complex;
///
/// let mut disc = Discriminator::new();
/// assert!(disc.process(&[Complex::new(1.0, 0.0)]).is_empty());
/// assert_eq!(disc.process(&[Complex::new(0.0, 1.0), Complex::new(-1.0, 0.0)]).len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct Discriminator {
    /// Last sample seen, if any
    last: Option<Sample>,
}

impl Discriminator {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn process(&mut self, samples: &[Sample]) -> Vec<f64> {
        let mut phases = Vec::with_capacity(samples.len());
        for &sample in samples {
            if let Some(last) = self.last {
                phases.push(angle(sample * last.conj()));
            }
            self.last = Some(sample);
        }
        phases
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn seq(samples: Vec<Sample>) -> SampleSequence {
        SampleSequence::new(samples, 48_000.0).unwrap()
    }

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::from_polar(1.0, TAU * freq * i as f64 / fs))
            .collect()
    }

    #[test]
    fn test_output_length() {
        assert!(demodulate(&seq(vec![])).is_empty());
        assert!(demodulate(&seq(vec![Sample::new(1.0, 0.0)])).is_empty());
        for n in [2, 3, 100] {
            assert_eq!(demodulate(&seq(tone(1_000.0, 48_000.0, n))).len(), n - 1);
        }
    }

    #[test]
    fn test_quarter_turn() {
        let out = demodulate(&seq(vec![Sample::new(1.0, 0.0), Sample::new(0.0, 1.0)]));
        assert_abs_diff_eq!(out[0], FRAC_PI_2, epsilon = 1e-12);
        let out = demodulate(&seq(vec![Sample::new(0.0, 1.0), Sample::new(1.0, 0.0)]));
        assert_abs_diff_eq!(out[0], -FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_half_turn_is_plus_pi() {
        let out = demodulate(&seq(vec![Sample::new(1.0, 0.0), Sample::new(-1.0, 0.0)]));
        assert_eq!(out, vec![PI]);
        assert_eq!(angle(Sample::new(-1.0, -0.0)), PI);
    }

    #[test]
    fn test_zero_magnitude_gives_zero() {
        let out = demodulate(&seq(vec![
            Sample::new(1.0, 0.0),
            Sample::new(0.0, 0.0),
            Sample::new(0.0, 1.0),
        ]));
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn test_constant_rotation() {
        let fs = 240_000.0;
        let f = 19_000.0;
        let out = demodulate(&seq(tone(f, fs, 1_000)));
        let expected = TAU * f / fs;
        for p in &out {
            assert_abs_diff_eq!(*p, expected, epsilon = 1e-9);
        }
        for hz in to_hz(&out, fs) {
            assert_abs_diff_eq!(hz, f, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_output_in_half_open_range() {
        // fast rotation wraps every few samples
        let out = demodulate(&seq(tone(-21_000.0, 48_000.0, 500)));
        for p in out {
            assert!(p > -PI && p <= PI, "{p} outside (-π, π]");
        }
    }

    #[test]
    fn test_discriminator_chunks_match_batch() {
        let samples = tone(5_000.0, 48_000.0, 301);
        let batch = demodulate_samples(&samples);
        let mut disc = Discriminator::new();
        let streamed: Vec<f64> = samples
            .chunks(13)
            .flat_map(|chunk| disc.process(chunk))
            .collect();
        assert_eq!(streamed, batch);
    }

    #[test]
    fn test_discriminator_reset() {
        let mut disc = Discriminator::new();
        let _ = disc.process(&[Sample::new(0.5, 0.5); 5]);
        disc.reset();
        assert!(disc.last.is_none());
        assert!(disc.process(&[Sample::new(1.0, 0.0)]).is_empty());
    }
}
