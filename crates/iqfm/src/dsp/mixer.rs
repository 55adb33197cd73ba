//! Heterodyne mixing.
//!
//! Multiplying a signal by the unit phasor `exp(j·2π·f·n/fs)` translates its
//! spectrum by `f` Hz without touching magnitudes. A negative shift brings a
//! carrier sitting at `+f` down to baseband; mixing back by the opposite
//! shift restores the original samples.
//!
//! The phase of sample `n` is computed from `n` directly rather than by
//! repeated multiplication, so long captures do not accumulate drift and
//! chunked processing with [`Mixer`] matches [`mix`] sample for sample.
//!
//! # Example
//! ```
//! use iqfm::SampleSequence;
//! use iqfm::dsp::mixer::mix;
//! use num_complex::Complex;
//!
//! let input = SampleSequence::new(vec![Complex::new(1.0, 0.0); 4], 4.0).unwrap();
//! let shifted = mix(&input, 1.0).unwrap(); // a quarter turn per sample
//! assert!((shifted[1] - Complex::new(0.0, 1.0)).norm() < 1e-12);
//! ```

use std::f64::consts::TAU;

use rayon::prelude::*;
use tracing::debug;

use crate::dsp::{DspBlock, PARALLEL_THRESHOLD};
use crate::error::{Error, Result};
use crate::sequence::{Sample, SampleSequence, check_sample_rate};

/// Shift the spectrum of `input` by `shift_hz`.
pub fn mix(input: &SampleSequence, shift_hz: f64) -> Result<SampleSequence> {
    let shifted = mix_samples(input.samples(), shift_hz, input.sample_rate())?;
    debug!(
        shift_hz,
        samples = shifted.len(),
        sample_rate = input.sample_rate(),
        "mixed"
    );
    Ok(input.derive(shifted))
}

/// Shift raw samples taken at `sample_rate` by `shift_hz`.
pub fn mix_samples(samples: &[Sample], shift_hz: f64, sample_rate: f64) -> Result<Vec<Sample>> {
    check_shift("mix", shift_hz, sample_rate)?;
    let rotate = |(n, &s): (usize, &Sample)| s * phasor(shift_hz, sample_rate, n as u64);
    Ok(if samples.len() >= PARALLEL_THRESHOLD {
        samples.par_iter().enumerate().map(rotate).collect()
    } else {
        samples.iter().enumerate().map(rotate).collect()
    })
}

/// `exp(j·2π·shift·n/fs)`, with whole turns removed before the trig calls.
fn phasor(shift_hz: f64, sample_rate: f64, n: u64) -> Sample {
    let cycles = (shift_hz * n as f64 / sample_rate).fract();
    Sample::from_polar(1.0, TAU * cycles)
}

fn check_shift(stage: &'static str, shift_hz: f64, sample_rate: f64) -> Result<()> {
    check_sample_rate(stage, sample_rate)?;
    if !shift_hz.is_finite() {
        return Err(Error::invalid_argument(
            stage,
            format!("frequency shift must be finite, got {shift_hz}"),
        ));
    }
    Ok(())
}

/// Chunked mixer that keeps the phase continuous across calls.
pub struct Mixer {
    shift_hz: f64,
    sample_rate: f64,
    /// Index of the next sample in the stream
    position: u64,
}

impl Mixer {
    /// Create a mixer shifting by `shift_hz` at `sample_rate`.
    ///
    /// # Example
    /// ```
    /// use iqfm::dsp::mixer::Mixer;
    ///
    /// // Bring a station 200 kHz above the tuner frequency to baseband
    /// let mixer = Mixer::new(-200_000.0, 2_000_000.0).unwrap();
    /// assert!(Mixer::new(1.0, 0.0).is_err());
    /// ```
    pub fn new(shift_hz: f64, sample_rate: f64) -> Result<Self> {
        check_shift("mix", shift_hz, sample_rate)?;
        Ok(Self {
            shift_hz,
            sample_rate,
            position: 0,
        })
    }

    pub fn shift_hz(&self) -> f64 {
        self.shift_hz
    }
}

impl DspBlock for Mixer {
    fn process(&mut self, data: &[Sample]) -> Vec<Sample> {
        let start = self.position;
        self.position += data.len() as u64;
        data.iter()
            .enumerate()
            .map(|(i, &s)| s * phasor(self.shift_hz, self.sample_rate, start + i as u64))
            .collect()
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}
