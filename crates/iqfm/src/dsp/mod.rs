//! Digital Signal Processing (DSP) module.
//!
//! This module provides the numerical stages that turn raw I/Q captures into
//! a demodulated FM signal. Every stage exists in two shapes:
//!
//! - a pure function over a whole [`SampleSequence`](crate::SampleSequence)
//!   (`mix`, `convolve`, `decimate`, `demodulate`) returning a new sequence;
//! - a stateful block implementing [`DspBlock`] that processes consecutive
//!   chunks and produces exactly what the pure function would produce on the
//!   concatenated input.
//!
//! ## DSP Pipeline
//!
//! ```text
//! I/Q Samples → Mixer → FIR low-pass → Decimator → Discriminator → Audio
//!                  ↓          ↓             ↓              ↓
//!              Freq Shift  Anti-alias   Downsample     FM Demod
//! ```
//!
//! # Modules
//!
//! - [`mixer`]: Heterodyne mixing (frequency shifting)
//! - [`filters`]: Windowed-sinc low-pass FIR design
//! - [`convolve`]: Direct, parallel and FFT linear convolution
//! - [`decimator`]: Integer-factor sample rate reduction
//! - [`fm`]: Polar discriminator FM demodulation
//! - [`unwrap`]: Per-sample phase angles and phase unwrapping
//!
//! # Examples
//!
//! ```
//! use iqfm::SampleSequence;
//! use iqfm::dsp::{convolve, decimator, filters, fm, mixer};
//! use num_complex::Complex;
//!
//! let fs = 240_000.0;
//! let tone: Vec<Complex<f64>> = (0..4_000)
//!     .map(|i| Complex::from_polar(1.0, 2.0 * std::f64::consts::PI * 50_000.0 * i as f64 / fs))
//!     .collect();
//! let input = SampleSequence::new(tone, fs).unwrap();
//!
//! let shifted = mixer::mix(&input, -50_000.0).unwrap();
//! let kernel = filters::design_lowpass(20_000.0, fs, 64).unwrap();
//! let filtered = convolve::convolve(&shifted, &kernel).unwrap();
//! let decimated = decimator::decimate(&filtered, 4, decimator::DecimationMode::Select).unwrap();
//! let audio = fm::demodulate(&decimated);
//! assert_eq!(audio.len(), decimated.len() - 1);
//! ```
//!
//! # Thread Safety
//!
//! The pure functions share nothing and fan out over a rayon pool for large
//! inputs. The [`DspBlock`] implementations keep per-stream state; give each
//! stream its own instance.
use crate::sequence::Sample;

pub mod convolve;
pub mod decimator;
pub mod filters;
pub mod fm;
pub mod mixer;
pub mod unwrap;

/// Inputs at least this long are processed in parallel.
pub(crate) const PARALLEL_THRESHOLD: usize = 1 << 15;

/// Trait for DSP blocks that process complex-valued signals chunk by chunk.
///
/// Blocks keep whatever state is needed so that splitting a signal into
/// chunks does not change the result.
///
/// # Examples
///
/// ```
/// use iqfm::dsp::{DspBlock, mixer::Mixer};
/// use num_complex::Complex;
///
/// let mut mixer = Mixer::new(1_000.0, 48_000.0).unwrap();
/// let input = vec![Complex::new(1.0, 0.0); 10];
/// let output = mixer.process(&input);
/// assert_eq!(output.len(), 10);
/// ```
pub trait DspBlock {
    /// Process a block of complex samples.
    ///
    /// The output length may differ from the input length depending on the
    /// operation (e.g., decimation reduces the length).
    fn process(&mut self, data: &[Sample]) -> Vec<Sample>;

    /// Forget all state, as if no sample had been processed.
    fn reset(&mut self);
}
