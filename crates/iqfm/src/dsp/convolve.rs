//! FIR filtering by linear convolution.
//!
//! [`convolve`] returns the *full* convolution, `len(input) + len(kernel) - 1`
//! samples long. Cutting the filter's group delay back out is a separate,
//! explicit step ([`trim_group_delay`]).
//!
//! Two methods give the same values up to floating-point rounding:
//! - [`ConvolutionMethod::Direct`]: O(N·taps), fanned out over rayon for
//!   large inputs
//! - [`ConvolutionMethod::Fft`]: zero-padded FFT product via rustfft
//!
//! [`FirFilter`] is the chunked counterpart: it keeps the last `taps - 1`
//! input samples between calls and emits the convolution tail on
//! [`FirFilter::flush`].

use std::str::FromStr;

use rayon::prelude::*;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dsp::filters::FilterKernel;
use crate::dsp::{DspBlock, PARALLEL_THRESHOLD};
use crate::error::{Error, Result};
use crate::sequence::{Sample, SampleSequence};

/// Work size (samples × taps) above which `Auto` switches to the FFT.
const FFT_CROSSOVER: usize = 1 << 22;

/// How [`convolve_with`] computes the convolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvolutionMethod {
    /// Direct sum, parallel above a size threshold
    Direct,
    /// FFT multiplication
    Fft,
    /// Direct for small inputs, FFT for large ones
    #[default]
    Auto,
}

impl FromStr for ConvolutionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(ConvolutionMethod::Direct),
            "fft" => Ok(ConvolutionMethod::Fft),
            "auto" => Ok(ConvolutionMethod::Auto),
            other => Err(Error::invalid_argument(
                "convolve",
                format!("unknown convolution method: {other}"),
            )),
        }
    }
}

/// Full linear convolution of `input` with `kernel`.
///
/// An empty input gives an empty output.
pub fn convolve(input: &SampleSequence, kernel: &FilterKernel) -> Result<SampleSequence> {
    convolve_with(input, kernel, ConvolutionMethod::Auto)
}

/// Full linear convolution with an explicit method.
pub fn convolve_with(
    input: &SampleSequence,
    kernel: &FilterKernel,
    method: ConvolutionMethod,
) -> Result<SampleSequence> {
    let taps = kernel.coefficients();
    let n = input.len();
    let method = match method {
        ConvolutionMethod::Auto if n.saturating_mul(taps.len()) >= FFT_CROSSOVER => {
            ConvolutionMethod::Fft
        }
        ConvolutionMethod::Auto => ConvolutionMethod::Direct,
        m => m,
    };
    let out = match method {
        ConvolutionMethod::Fft => convolve_fft(input.samples(), taps),
        _ => convolve_direct(input.samples(), taps),
    };
    debug!(
        method = ?method,
        input = n,
        taps = taps.len(),
        output = out.len(),
        "convolved"
    );
    Ok(input.derive(out))
}

/// Direct-form full convolution.
pub fn convolve_direct(samples: &[Sample], taps: &[f64]) -> Vec<Sample> {
    if samples.is_empty() || taps.is_empty() {
        return Vec::new();
    }
    let len = samples.len() + taps.len() - 1;
    let at = |i: usize| fir_output(samples, taps, i);
    if samples.len() >= PARALLEL_THRESHOLD {
        (0..len).into_par_iter().map(at).collect()
    } else {
        (0..len).map(at).collect()
    }
}

/// Output `i` of the full convolution: `Σ_k taps[k] · samples[i - k]`.
fn fir_output(samples: &[Sample], taps: &[f64], i: usize) -> Sample {
    let k_min = (i + 1).saturating_sub(samples.len());
    let k_max = i.min(taps.len() - 1);
    let mut acc = Sample::new(0.0, 0.0);
    for k in k_min..=k_max {
        acc += samples[i - k] * taps[k];
    }
    acc
}

/// FFT-based full convolution.
pub fn convolve_fft(samples: &[Sample], taps: &[f64]) -> Vec<Sample> {
    if samples.is_empty() || taps.is_empty() {
        return Vec::new();
    }
    let len = samples.len() + taps.len() - 1;
    let size = len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut signal = vec![Sample::new(0.0, 0.0); size];
    signal[..samples.len()].copy_from_slice(samples);
    let mut response = vec![Sample::new(0.0, 0.0); size];
    for (r, &t) in response.iter_mut().zip(taps) {
        *r = Sample::new(t, 0.0);
    }

    forward.process(&mut signal);
    forward.process(&mut response);
    for (s, r) in signal.iter_mut().zip(&response) {
        *s *= r;
    }
    inverse.process(&mut signal);

    let scale = 1.0 / size as f64;
    signal.truncate(len);
    for s in signal.iter_mut() {
        *s *= scale;
    }
    signal
}

/// Drop `(taps - 1) / 2` samples from each end of a full convolution output,
/// aligning it with the unfiltered input.
pub fn trim_group_delay(filtered: &SampleSequence, kernel: &FilterKernel) -> SampleSequence {
    let d = kernel.delay_samples();
    let end = filtered.len().saturating_sub(d);
    filtered.slice(d.min(end)..end)
}

/// Chunked FIR filter producing the full convolution of everything fed in.
pub struct FirFilter {
    taps: Vec<f64>,
    /// Last `taps - 1` input samples, oldest first
    history: Vec<Sample>,
}

impl FirFilter {
    pub fn new(kernel: &FilterKernel) -> Self {
        let taps = kernel.coefficients().to_vec();
        let history = vec![Sample::new(0.0, 0.0); taps.len() - 1];
        Self { taps, history }
    }

    /// Emit the `taps - 1` trailing outputs of the convolution, as if the
    /// stream were followed by zeros, and reset the filter.
    pub fn flush(&mut self) -> Vec<Sample> {
        let zeros = vec![Sample::new(0.0, 0.0); self.taps.len() - 1];
        let tail = self.process(&zeros);
        self.reset();
        tail
    }
}

impl DspBlock for FirFilter {
    fn process(&mut self, data: &[Sample]) -> Vec<Sample> {
        let keep = self.history.len();
        let mut window = Vec::with_capacity(keep + data.len());
        window.extend_from_slice(&self.history);
        window.extend_from_slice(data);

        let out = (0..data.len())
            .map(|j| {
                // window[keep + j] is the newest sample for this output
                let mut acc = Sample::new(0.0, 0.0);
                for (k, &t) in self.taps.iter().enumerate() {
                    acc += window[keep + j - k] * t;
                }
                acc
            })
            .collect();

        self.history = window.split_off(window.len() - keep);
        out
    }

    fn reset(&mut self) {
        self.history.fill(Sample::new(0.0, 0.0));
    }
}
