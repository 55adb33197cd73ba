//! Low-pass FIR filter design.
//!
//! This module designs windowed-sinc low-pass filters:
//! - [`design_lowpass`]: Blackman-windowed sinc kernel for a cutoff in Hz
//! - [`taps_for_transition`]: tap count for a normalized transition width
//!
//! # Example
//!
//! ```
//! use iqfm::dsp::filters::{design_lowpass, taps_for_transition};
//!
//! // 4 / 0.02 = 200 taps
//! let taps = taps_for_transition(0.02).unwrap();
//! let kernel = design_lowpass(100_000.0, 2_400_000.0, taps).unwrap();
//! assert_eq!(kernel.len(), 200);
//! ```

use std::f64::consts::PI;

use num_complex::Complex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sequence::check_sample_rate;

/// Normalized transition width giving the default 200-tap filter.
pub const DEFAULT_TRANSITION_WIDTH: f64 = 0.02;

/// FIR filter taps.
///
/// The length is always even and the group delay is `(len - 1) / 2`
/// samples. Kernels built by [`design_lowpass`] have unity gain at DC.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterKernel {
    taps: Vec<f64>,
}

impl FilterKernel {
    /// Wrap hand-made coefficients, which must be non-empty, even in number
    /// and finite.
    pub fn from_coefficients(taps: Vec<f64>) -> Result<Self> {
        if taps.is_empty() || taps.len() % 2 != 0 {
            return Err(Error::invalid_argument(
                "filter",
                format!("kernel length must be even and positive, got {}", taps.len()),
            ));
        }
        if taps.iter().any(|t| !t.is_finite()) {
            return Err(Error::invalid_argument(
                "filter",
                "kernel coefficients must be finite",
            ));
        }
        Ok(Self { taps })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Group delay in samples, `(len - 1) / 2`.
    pub fn group_delay(&self) -> f64 {
        (self.taps.len() as f64 - 1.0) / 2.0
    }

    /// Whole samples trimmed from each end to compensate the group delay.
    pub fn delay_samples(&self) -> usize {
        (self.taps.len() - 1) / 2
    }

    /// Magnitude of the frequency response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let w = -2.0 * PI * freq_hz / sample_rate;
        self.taps
            .iter()
            .enumerate()
            .map(|(n, &h)| Complex::from_polar(h, w * n as f64))
            .sum::<Complex<f64>>()
            .norm()
    }
}

/// Tap count for a transition band `width` wide, as a fraction of the sample
/// rate: `ceil(4 / width)`, rounded up to even.
pub fn taps_for_transition(width: f64) -> Result<usize> {
    if !(width.is_finite() && width > 0.0 && width < 0.5) {
        return Err(Error::invalid_argument(
            "filter",
            format!("transition width must be in (0, 0.5), got {width}"),
        ));
    }
    Ok(round_up_even((4.0 / width).ceil() as usize))
}

/// Design a low-pass filter passing `cutoff_hz` at `sample_rate`.
///
/// The coefficients are a sinc of normalized cutoff `cutoff_hz / sample_rate`
/// centered at `(taps - 1) / 2`, multiplied by a Blackman window of the same
/// length, then scaled to unity DC gain. An odd `taps` is rounded up by one.
///
/// # Arguments
///
/// * `cutoff_hz` - Cutoff frequency in Hz, strictly between 0 and Nyquist
/// * `sample_rate` - Sample rate in Hz
/// * `taps` - Number of filter taps (must be > 0)
///
/// # Example
///
/// ```
/// use iqfm::dsp::filters::design_lowpass;
///
/// let kernel = design_lowpass(15_000.0, 240_000.0, 101).unwrap();
/// assert_eq!(kernel.len(), 102);
/// assert!(design_lowpass(120_000.0, 240_000.0, 64).is_err()); // at Nyquist
/// ```
pub fn design_lowpass(cutoff_hz: f64, sample_rate: f64, taps: usize) -> Result<FilterKernel> {
    check_sample_rate("filter", sample_rate)?;
    if taps == 0 {
        return Err(Error::invalid_argument(
            "filter",
            "number of taps must be ≥ 1, got 0",
        ));
    }
    let nyquist = sample_rate / 2.0;
    if !(cutoff_hz.is_finite() && cutoff_hz > 0.0 && cutoff_hz < nyquist) {
        return Err(Error::invalid_argument(
            "filter",
            format!("cutoff must be in (0, {nyquist}) Hz for a {sample_rate} Hz rate, got {cutoff_hz}"),
        ));
    }

    let taps = round_up_even(taps);
    let frac = cutoff_hz / sample_rate;
    let center = (taps as f64 - 1.0) / 2.0;
    let window = blackman(taps);

    let mut fir: Vec<f64> = (0..taps)
        .map(|n| sinc(2.0 * frac * (n as f64 - center)) * window[n])
        .collect();

    // Normalize to unity gain
    let norm: f64 = fir.iter().sum();
    if !(norm.is_finite() && norm > 0.0) {
        return Err(Error::invalid_argument(
            "filter",
            format!("a {taps}-tap Blackman window has no DC gain; use at least 3 taps"),
        ));
    }
    for v in fir.iter_mut() {
        *v /= norm;
    }

    debug!(cutoff_hz, sample_rate, taps, "designed low-pass kernel");
    Ok(FilterKernel { taps: fir })
}

/// Blackman window: `0.42 - 0.5·cos(2πn/(N-1)) + 0.08·cos(4πn/(N-1))`.
pub fn blackman(len: usize) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    let m = len as f64 - 1.0;
    (0..len)
        .map(|n| {
            let x = n as f64 / m;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Normalized sinc, `sin(πx) / (πx)` with `sinc(0) = 1`.
pub fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn round_up_even(taps: usize) -> usize {
    taps + taps % 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_default_transition_gives_200_taps() {
        assert_eq!(taps_for_transition(DEFAULT_TRANSITION_WIDTH).unwrap(), 200);
        // 4 / 0.03 = 133.3 -> 134
        assert_eq!(taps_for_transition(0.03).unwrap(), 134);
        // 4 / 0.08 = 50
        assert_eq!(taps_for_transition(0.08).unwrap(), 50);
        assert!(taps_for_transition(0.0).is_err());
        assert!(taps_for_transition(0.7).is_err());
    }

    #[test]
    fn test_odd_taps_rounded_up_by_one() {
        for taps in 3..40 {
            let kernel = design_lowpass(10_000.0, 96_000.0, taps).unwrap();
            assert_eq!(kernel.len() % 2, 0);
            let expected = if taps % 2 == 1 { taps + 1 } else { taps };
            assert_eq!(kernel.len(), expected);
        }
    }

    #[test]
    fn test_two_taps_is_degenerate() {
        // blackman(2) is all zeros
        assert!(design_lowpass(10_000.0, 96_000.0, 1).is_err());
        assert!(design_lowpass(10_000.0, 96_000.0, 2).is_err());
    }

    #[test]
    fn test_invalid_arguments() {
        let cases = [
            (0.0, 48_000.0, 64),
            (-1.0, 48_000.0, 64),
            (24_000.0, 48_000.0, 64),
            (30_000.0, 48_000.0, 64),
            (1_000.0, 0.0, 64),
            (1_000.0, 48_000.0, 0),
            (f64::NAN, 48_000.0, 64),
        ];
        for (cutoff, rate, taps) in cases {
            assert!(
                matches!(
                    design_lowpass(cutoff, rate, taps),
                    Err(Error::InvalidArgument { stage: "filter", .. })
                ),
                "cutoff={cutoff} rate={rate} taps={taps} should be rejected"
            );
        }
    }

    #[test]
    fn test_coefficients_normalized_and_symmetric() {
        let kernel = design_lowpass(15_000.0, 240_000.0, 256).unwrap();
        let taps = kernel.coefficients();
        let sum: f64 = taps.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        for i in 0..taps.len() / 2 {
            assert_abs_diff_eq!(taps[i], taps[taps.len() - 1 - i], epsilon = 1e-15);
        }
    }

    #[test]
    fn test_group_delay() {
        let kernel = design_lowpass(15_000.0, 240_000.0, 200).unwrap();
        assert_eq!(kernel.group_delay(), 99.5);
        assert_eq!(kernel.delay_samples(), 99);
    }

    #[test]
    fn test_passband_and_stopband() {
        let fs = 2_400_000.0;
        let kernel = design_lowpass(100_000.0, fs, 200).unwrap();
        assert_relative_eq!(kernel.magnitude_at(0.0, fs), 1.0, epsilon = 1e-12);
        assert!(kernel.magnitude_at(50_000.0, fs) > 0.99);
        // well past cutoff + transition width (0.02 * fs = 48 kHz)
        assert!(kernel.magnitude_at(200_000.0, fs) < 1e-3);
        assert!(kernel.magnitude_at(600_000.0, fs) < 1e-3);
    }

    #[test]
    fn test_blackman_window_shape() {
        let w = blackman(9);
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(w[8], 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(w[4], 1.0, epsilon = 1e-15);
        assert_eq!(blackman(1), vec![1.0]);
    }

    #[test]
    fn test_sinc() {
        assert_eq!(sinc(0.0), 1.0);
        assert_abs_diff_eq!(sinc(1.0), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(sinc(0.5), 2.0 / PI, epsilon = 1e-15);
    }

    #[test]
    fn test_from_coefficients() {
        assert!(FilterKernel::from_coefficients(vec![0.5, 0.5]).is_ok());
        assert!(FilterKernel::from_coefficients(vec![1.0]).is_err());
        assert!(FilterKernel::from_coefficients(vec![]).is_err());
        assert!(FilterKernel::from_coefficients(vec![f64::NAN, 1.0]).is_err());
    }
}
