//! End-to-end FM demodulation.
//!
//! [`Pipeline`] runs mix → low-pass → decimate → discriminate over a whole
//! [`SampleSequence`]. [`StreamingDemodulator`] runs the same stages block
//! by block over a [`SampleSource`] and produces the same output.
//!
//! # Example
//!
//! ```
//! use iqfm::{Pipeline, PipelineConfig, SampleSequence};
//! use num_complex::Complex;
//!
//! let fs = 2_400_000.0;
//! // unmodulated carrier 300 kHz above the tuner frequency
//! let carrier = (0..24_000)
//!     .map(|n| Complex::from_polar(1.0, 2.0 * std::f64::consts::PI * 300e3 * n as f64 / fs))
//!     .collect();
//! let capture = SampleSequence::new(carrier, fs).unwrap();
//!
//! let config = PipelineConfig { shift_hz: -300e3, ..Default::default() };
//! let pipeline = Pipeline::new(config, fs).unwrap();
//! let audio = pipeline.run(&capture).unwrap();
//! assert_eq!(audio.sample_rate, 240_000.0);
//! assert!(audio.samples[100..2_000].iter().all(|x| x.abs() < 1e-6));
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::dsp::DspBlock;
use crate::dsp::convolve::{ConvolutionMethod, FirFilter, convolve_with, trim_group_delay};
use crate::dsp::decimator::{DecimationMode, Decimator, decimate};
use crate::dsp::filters::{DEFAULT_TRANSITION_WIDTH, FilterKernel, design_lowpass, taps_for_transition};
use crate::dsp::fm::{Discriminator, demodulate, to_hz};
use crate::dsp::mixer::{Mixer, mix};
use crate::error::{Error, Result};
use crate::sequence::{Demodulated, Sample, SampleSequence, check_sample_rate};
use crate::source::SampleSource;

/// Demodulation settings.
///
/// Every field has a default, so a JSON or TOML document only needs the
/// fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frequency shift applied before filtering, in Hz. Use the negative of
    /// the station's offset from the capture center.
    pub shift_hz: f64,
    /// Low-pass cutoff in Hz
    pub cutoff_hz: f64,
    /// Transition width as a fraction of the sample rate, used when `taps`
    /// is not set
    pub transition_width: f64,
    /// Explicit tap count
    pub taps: Option<usize>,
    /// Decimation factor
    pub decimation: usize,
    pub mode: DecimationMode,
    /// Trim the filter's group delay from both ends of the filtered signal
    pub compensate_group_delay: bool,
    /// Scale the output to Hz instead of radians per sample
    pub output_hz: bool,
    pub convolution: ConvolutionMethod,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shift_hz: 0.0,
            cutoff_hz: 100_000.0,
            transition_width: DEFAULT_TRANSITION_WIDTH,
            taps: None,
            decimation: 10,
            mode: DecimationMode::Select,
            compensate_group_delay: false,
            output_hz: false,
            convolution: ConvolutionMethod::Auto,
        }
    }
}

impl PipelineConfig {
    /// Tap count: the explicit override, or the one implied by the
    /// transition width.
    pub fn taps(&self) -> Result<usize> {
        match self.taps {
            Some(0) => Err(Error::invalid_argument(
                "filter",
                "number of taps must be ≥ 1, got 0",
            )),
            Some(taps) => Ok(taps),
            None => taps_for_transition(self.transition_width),
        }
    }

    /// Check every setting against an input sample rate.
    pub fn validate(&self, sample_rate: f64) -> Result<()> {
        check_sample_rate("pipeline", sample_rate)?;
        if !self.shift_hz.is_finite() {
            return Err(Error::invalid_argument(
                "mix",
                format!("frequency shift must be finite, got {}", self.shift_hz),
            ));
        }
        let nyquist = sample_rate / 2.0;
        if !(self.cutoff_hz > 0.0 && self.cutoff_hz < nyquist) {
            return Err(Error::invalid_argument(
                "filter",
                format!("cutoff must be in (0, {nyquist}) Hz, got {}", self.cutoff_hz),
            ));
        }
        self.taps()?;
        if self.decimation == 0 {
            return Err(Error::invalid_argument(
                "decimate",
                "decimation factor must be ≥ 1, got 0",
            ));
        }
        if self.shift_hz.abs() >= nyquist {
            warn!(
                shift_hz = self.shift_hz,
                sample_rate, "shift beyond Nyquist aliases back into the band"
            );
        }
        let output_nyquist = sample_rate / self.decimation as f64 / 2.0;
        if self.cutoff_hz > output_nyquist {
            warn!(
                cutoff_hz = self.cutoff_hz,
                output_nyquist, "cutoff above the decimated Nyquist frequency, output will alias"
            );
        }
        Ok(())
    }
}

/// Batch demodulator for captures at one sample rate.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    sample_rate: f64,
    kernel: FilterKernel,
}

impl Pipeline {
    /// Validate `config` for `sample_rate` and design the filter once.
    pub fn new(config: PipelineConfig, sample_rate: f64) -> Result<Self> {
        config.validate(sample_rate)?;
        let kernel = design_lowpass(config.cutoff_hz, sample_rate, config.taps()?)?;
        info!(
            sample_rate,
            shift_hz = config.shift_hz,
            cutoff_hz = config.cutoff_hz,
            taps = kernel.len(),
            decimation = config.decimation,
            "pipeline ready"
        );
        Ok(Self {
            config,
            sample_rate,
            kernel,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn kernel(&self) -> &FilterKernel {
        &self.kernel
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Sample rate after decimation.
    pub fn output_rate(&self) -> f64 {
        self.sample_rate / self.config.decimation as f64
    }

    /// Shifted, filtered and decimated baseband, before demodulation.
    pub fn baseband(&self, input: &SampleSequence) -> Result<SampleSequence> {
        self.check_rate(input.sample_rate())?;
        if !input.is_finite() {
            warn!("input contains non-finite samples");
        }
        let shifted = mix(input, self.config.shift_hz)?;
        let mut filtered = convolve_with(&shifted, &self.kernel, self.config.convolution)?;
        if self.config.compensate_group_delay {
            filtered = trim_group_delay(&filtered, &self.kernel);
            debug!(
                delay = self.kernel.delay_samples(),
                remaining = filtered.len(),
                "trimmed group delay"
            );
        }
        decimate(&filtered, self.config.decimation, self.config.mode)
    }

    /// Demodulate a whole capture.
    pub fn run(&self, input: &SampleSequence) -> Result<Demodulated> {
        let baseband = self.baseband(input)?;
        let mut samples = demodulate(&baseband);
        if self.config.output_hz {
            samples = to_hz(&samples, baseband.sample_rate());
        }
        debug!(input = input.len(), output = samples.len(), "demodulated");
        Ok(Demodulated {
            samples,
            sample_rate: baseband.sample_rate(),
        })
    }

    /// A block-by-block demodulator with this pipeline's settings.
    pub fn streaming(&self) -> Result<StreamingDemodulator> {
        StreamingDemodulator::new(self)
    }

    fn check_rate(&self, sample_rate: f64) -> Result<()> {
        if (sample_rate - self.sample_rate).abs() > 1e-9 * self.sample_rate {
            return Err(Error::invalid_argument(
                "pipeline",
                format!(
                    "input sample rate {sample_rate} Hz does not match the configured {} Hz",
                    self.sample_rate
                ),
            ));
        }
        Ok(())
    }
}

/// Streaming counterpart of [`Pipeline::run`].
///
/// Feed blocks with [`process_samples`](Self::process_samples) and call
/// [`finish`](Self::finish) once at the end of the stream. The outputs,
/// concatenated, equal what [`Pipeline::run`] returns for the concatenated
/// input.
pub struct StreamingDemodulator {
    mixer: Mixer,
    fir: FirFilter,
    decimator: Decimator,
    discriminator: Discriminator,
    /// Group delay in samples when compensating, else 0
    delay: usize,
    /// Filtered samples still to drop from the start of the stream
    skip: usize,
    /// Last `delay` filtered samples, held back in case the stream ends
    held: Vec<Sample>,
    sample_rate: f64,
    output_rate: f64,
    output_hz: bool,
}

impl StreamingDemodulator {
    fn new(pipeline: &Pipeline) -> Result<Self> {
        let config = &pipeline.config;
        let delay = if config.compensate_group_delay {
            pipeline.kernel.delay_samples()
        } else {
            0
        };
        Ok(Self {
            mixer: Mixer::new(config.shift_hz, pipeline.sample_rate)?,
            fir: FirFilter::new(&pipeline.kernel),
            decimator: Decimator::new(config.decimation, config.mode)?,
            discriminator: Discriminator::new(),
            delay,
            skip: delay,
            held: Vec::with_capacity(delay),
            sample_rate: pipeline.sample_rate,
            output_rate: pipeline.output_rate(),
            output_hz: config.output_hz,
        })
    }

    pub fn output_rate(&self) -> f64 {
        self.output_rate
    }

    /// Demodulate one block of a sequence at the pipeline's rate.
    pub fn process(&mut self, block: &SampleSequence) -> Result<Vec<f64>> {
        if (block.sample_rate() - self.sample_rate).abs() > 1e-9 * self.sample_rate {
            return Err(Error::invalid_argument(
                "pipeline",
                format!(
                    "block sample rate {} Hz does not match the configured {} Hz",
                    block.sample_rate(),
                    self.sample_rate
                ),
            ));
        }
        Ok(self.process_samples(block.samples()))
    }

    /// Demodulate one block of raw samples.
    pub fn process_samples(&mut self, block: &[Sample]) -> Vec<f64> {
        let shifted = self.mixer.process(block);
        let filtered = self.fir.process(&shifted);
        let aligned = self.align(filtered);
        let out = self.demodulate(&aligned);
        trace!(input = block.len(), output = out.len(), "processed block");
        out
    }

    /// Flush the filter tail at the end of the stream and reset, ready for
    /// a new stream.
    pub fn finish(&mut self) -> Vec<f64> {
        let tail = self.fir.flush();
        let aligned = self.align(tail);
        // what is still held is the trailing group delay
        self.held.clear();
        let out = self.demodulate(&aligned);
        self.reset();
        out
    }

    /// Pull every block from `source` and demodulate it.
    pub fn run_source<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
        block_size: usize,
    ) -> Result<Demodulated> {
        let mut samples = Vec::new();
        let mut blocks = 0usize;
        loop {
            let block = match source.next_block(block_size) {
                Ok(block) => block,
                Err(e) if e.is_end_of_stream() => break,
                Err(e) => return Err(e),
            };
            samples.extend(self.process(&block)?);
            blocks += 1;
        }
        samples.extend(self.finish());
        debug!(blocks, output = samples.len(), "source drained");
        Ok(Demodulated {
            samples,
            sample_rate: self.output_rate,
        })
    }

    pub fn reset(&mut self) {
        self.mixer.reset();
        self.fir.reset();
        self.decimator.reset();
        self.discriminator.reset();
        self.skip = self.delay;
        self.held.clear();
    }

    /// Drop the leading group delay and hold back the trailing one.
    fn align(&mut self, mut filtered: Vec<Sample>) -> Vec<Sample> {
        if self.skip > 0 {
            let n = self.skip.min(filtered.len());
            filtered.drain(..n);
            self.skip -= n;
        }
        if self.delay == 0 {
            return filtered;
        }
        self.held.extend(filtered);
        let ready = self.held.len().saturating_sub(self.delay);
        self.held.drain(..ready).collect()
    }

    fn demodulate(&mut self, filtered: &[Sample]) -> Vec<f64> {
        let decimated = self.decimator.process(filtered);
        let phases = self.discriminator.process(&decimated);
        if self.output_hz {
            to_hz(&phases, self.output_rate)
        } else {
            phases
        }
    }
}
