//! Integer-factor sample rate reduction.
//!
//! Decimation assumes the signal has already been low-passed below the new
//! Nyquist frequency. The input is truncated to a whole number of groups of
//! `factor` samples, so the output always has `floor(len / factor)` samples
//! and a sample rate of `rate / factor`.
//!
//! # Example
//!
//! ```rust
//! use iqfm::SampleSequence;
//! use iqfm::dsp::decimator::{decimate, DecimationMode};
//! use num_complex::Complex;
//!
//! let input: Vec<Complex<f64>> = (0..1_000).map(|i| Complex::new(i as f64, 0.0)).collect();
//! let input = SampleSequence::new(input, 2_400_000.0).unwrap();
//!
//! let output = decimate(&input, 8, DecimationMode::Select).unwrap();
//! assert_eq!(output.len(), 125);
//! assert_eq!(output.sample_rate(), 300_000.0);
//! assert_eq!(output[1], Complex::new(8.0, 0.0));
//! ```
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DspBlock;
use crate::error::{Error, Result};
use crate::sequence::{Sample, SampleSequence};

/// How each group of `factor` samples becomes one output sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimationMode {
    /// Keep the first sample of every group
    #[default]
    Select,
    /// Mean of the group
    Average,
}

impl FromStr for DecimationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "select" => Ok(DecimationMode::Select),
            "average" | "mean" => Ok(DecimationMode::Average),
            other => Err(Error::invalid_argument(
                "decimate",
                format!("unknown decimation mode: {other}"),
            )),
        }
    }
}

/// Decimate `input` by `factor`.
///
/// # Errors
///
/// `InvalidArgument` when `factor` is 0.
pub fn decimate(input: &SampleSequence, factor: usize, mode: DecimationMode) -> Result<SampleSequence> {
    let out = decimate_samples(input.samples(), factor, mode)?;
    let rate = input.sample_rate() / factor as f64;
    debug!(
        factor,
        mode = ?mode,
        input = input.len(),
        output = out.len(),
        sample_rate = rate,
        "decimated"
    );
    Ok(input.derive_with_rate(out, rate))
}

/// Decimate raw samples by `factor`.
pub fn decimate_samples(samples: &[Sample], factor: usize, mode: DecimationMode) -> Result<Vec<Sample>> {
    check_factor(factor)?;
    Ok(samples
        .chunks_exact(factor)
        .map(|group| reduce(group, mode))
        .collect())
}

fn check_factor(factor: usize) -> Result<()> {
    if factor == 0 {
        return Err(Error::invalid_argument(
            "decimate",
            "decimation factor must be ≥ 1, got 0",
        ));
    }
    Ok(())
}

fn reduce(group: &[Sample], mode: DecimationMode) -> Sample {
    match mode {
        DecimationMode::Select => group[0],
        DecimationMode::Average => group.iter().sum::<Sample>() / group.len() as f64,
    }
}

/// A decimator that keeps partial groups between `process()` calls.
///
/// Only complete groups produce output; a trailing partial group at the end
/// of the stream is dropped, as in [`decimate`].
pub struct Decimator {
    factor: usize,
    mode: DecimationMode,
    buffer: Vec<Sample>,
}

impl Decimator {
    /// Creates a new decimator.
    ///
    /// # Example
    /// ```rust
    /// use iqfm::dsp::decimator::{Decimator, DecimationMode};
    ///
    /// let decimator = Decimator::new(4, DecimationMode::Average).unwrap();
    /// assert_eq!(decimator.factor(), 4);
    /// assert!(Decimator::new(0, DecimationMode::Select).is_err());
    /// ```
    pub fn new(factor: usize, mode: DecimationMode) -> Result<Self> {
        check_factor(factor)?;
        Ok(Self {
            factor,
            mode,
            buffer: Vec::with_capacity(factor),
        })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }
}

impl DspBlock for Decimator {
    fn process(&mut self, data: &[Sample]) -> Vec<Sample> {
        self.buffer.extend_from_slice(data);
        let whole = self.buffer.len() / self.factor * self.factor;
        let out = self.buffer[..whole]
            .chunks_exact(self.factor)
            .map(|group| reduce(group, self.mode))
            .collect();
        self.buffer.drain(..whole);
        out
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}
