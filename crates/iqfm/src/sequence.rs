//! Sample sequences flowing between pipeline stages.
//!
//! A [`SampleSequence`] owns its complex samples together with the sample
//! rate they were taken at. Every stage takes a sequence by reference and
//! returns a new one, so the rate travels with the data and cannot drift out
//! of sync with it.

use std::ops::{Index, Range};

use num_complex::Complex;

use crate::error::{Error, Result};

/// One complex I/Q sample.
pub type Sample = Complex<f64>;

/// An ordered run of complex samples at a known sample rate.
///
/// The center frequency is carried only as a label (for logs and sidecar
/// metadata); no computation depends on it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSequence {
    samples: Vec<Sample>,
    sample_rate: f64,
    center_freq: Option<f64>,
}

impl SampleSequence {
    /// Create a sequence, rejecting a non-positive or non-finite sample rate.
    ///
    /// # Example
    ///
    /// ```
    /// use iqfm::{Sample, SampleSequence};
    ///
    /// let seq = SampleSequence::new(vec![Sample::new(1.0, 0.0); 4], 48_000.0).unwrap();
    /// assert_eq!(seq.len(), 4);
    /// assert!(SampleSequence::new(vec![], 0.0).is_err());
    /// ```
    pub fn new(samples: Vec<Sample>, sample_rate: f64) -> Result<Self> {
        check_sample_rate("sequence", sample_rate)?;
        Ok(Self {
            samples,
            sample_rate,
            center_freq: None,
        })
    }

    /// Attach a center frequency label (Hz).
    pub fn with_center_freq(mut self, center_freq: f64) -> Self {
        self.center_freq = Some(center_freq);
        self
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn center_freq(&self) -> Option<f64> {
        self.center_freq
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration covered by the samples, in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    /// True when every component of every sample is finite.
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.re.is_finite() && s.im.is_finite())
    }

    /// A new sequence holding `range` of this one, with the same rate and label.
    ///
    /// The range is clamped to the sequence bounds.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.samples.len());
        let start = range.start.min(end);
        self.derive(self.samples[start..end].to_vec())
    }

    /// Build a sequence that shares this one's rate and label.
    pub(crate) fn derive(&self, samples: Vec<Sample>) -> Self {
        Self {
            samples,
            sample_rate: self.sample_rate,
            center_freq: self.center_freq,
        }
    }

    /// Build a sequence at a new rate that keeps this one's label.
    pub(crate) fn derive_with_rate(&self, samples: Vec<Sample>, sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
            center_freq: self.center_freq,
        }
    }

    /// Append the samples of `other`; both must share the same sample rate.
    pub fn extend_from(&mut self, other: &SampleSequence) -> Result<()> {
        if other.sample_rate != self.sample_rate {
            return Err(Error::invalid_argument(
                "sequence",
                format!(
                    "cannot join sequences at {} Hz and {} Hz",
                    self.sample_rate, other.sample_rate
                ),
            ));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }
}

impl Index<usize> for SampleSequence {
    type Output = Sample;

    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl<'a> IntoIterator for &'a SampleSequence {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// A demodulated real-valued signal and the rate it is sampled at.
#[derive(Debug, Clone, PartialEq)]
pub struct Demodulated {
    pub samples: Vec<f64>,
    pub sample_rate: f64,
}

pub(crate) fn check_sample_rate(stage: &'static str, sample_rate: f64) -> Result<()> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(Error::invalid_argument(
            stage,
            format!("sample rate must be a positive number of Hz, got {sample_rate}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<Sample> {
        (0..n).map(|i| Sample::new(i as f64, -(i as f64))).collect()
    }

    #[test]
    fn test_rejects_bad_sample_rates() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = SampleSequence::new(ramp(3), rate).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { stage: "sequence", .. }));
        }
    }

    #[test]
    fn test_slice_keeps_rate_and_label() {
        let seq = SampleSequence::new(ramp(10), 1_000.0)
            .unwrap()
            .with_center_freq(100e6);
        let part = seq.slice(2..5);
        assert_eq!(part.len(), 3);
        assert_eq!(part[0], Sample::new(2.0, -2.0));
        assert_eq!(part.sample_rate(), 1_000.0);
        assert_eq!(part.center_freq(), Some(100e6));
    }

    #[test]
    fn test_slice_clamps() {
        let seq = SampleSequence::new(ramp(4), 1.0).unwrap();
        assert_eq!(seq.slice(2..100).len(), 2);
        assert!(seq.slice(7..9).is_empty());
    }

    #[test]
    fn test_extend_requires_same_rate() {
        let mut a = SampleSequence::new(ramp(2), 10.0).unwrap();
        let b = SampleSequence::new(ramp(3), 10.0).unwrap();
        let c = SampleSequence::new(ramp(3), 20.0).unwrap();
        a.extend_from(&b).unwrap();
        assert_eq!(a.len(), 5);
        assert!(a.extend_from(&c).is_err());
    }

    #[test]
    fn test_duration_and_finiteness() {
        let mut samples = ramp(48);
        let seq = SampleSequence::new(samples.clone(), 48.0).unwrap();
        assert_eq!(seq.duration(), 1.0);
        assert!(seq.is_finite());
        samples[3].im = f64::NAN;
        assert!(!SampleSequence::new(samples, 48.0).unwrap().is_finite());
    }
}
