//! Pull-based sample sources.
//!
//! The pipeline never waits on hardware or the network itself: it asks a
//! [`SampleSource`] for the next block and stops when the source reports
//! [`Error::EndOfStream`]. Capture files implement the trait through
//! [`crate::iqread::IqRead`]; [`MemorySource`] serves an already materialized
//! sequence.

use crate::error::{Error, Result};
use crate::sequence::SampleSequence;

/// A finite or unbounded supply of complex samples at a known rate.
pub trait SampleSource {
    /// Sample rate of every block this source returns, in Hz.
    fn sample_rate(&self) -> f64;

    /// Center frequency label of the capture, if known.
    fn center_freq(&self) -> Option<f64> {
        None
    }

    /// Pull up to `n` samples.
    ///
    /// A block shorter than `n` may be returned just before the source runs
    /// dry; once exhausted every call fails with [`Error::EndOfStream`].
    fn next_block(&mut self, n: usize) -> Result<SampleSequence>;

    /// Pull blocks of `block_size` until the source is exhausted and join them.
    fn read_to_end(&mut self, block_size: usize) -> Result<SampleSequence> {
        let mut all = SampleSequence::new(Vec::new(), self.sample_rate())?;
        if let Some(center_freq) = self.center_freq() {
            all = all.with_center_freq(center_freq);
        }
        loop {
            match self.next_block(block_size) {
                Ok(block) => all.extend_from(&block)?,
                Err(Error::EndOfStream) => return Ok(all),
                Err(e) => return Err(e),
            }
        }
    }
}

/// A [`SampleSource`] over a sequence held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    sequence: SampleSequence,
    position: usize,
}

impl MemorySource {
    pub fn new(sequence: SampleSequence) -> Self {
        Self {
            sequence,
            position: 0,
        }
    }

    /// Number of samples not yet handed out.
    pub fn remaining(&self) -> usize {
        self.sequence.len() - self.position
    }
}

impl SampleSource for MemorySource {
    fn sample_rate(&self) -> f64 {
        self.sequence.sample_rate()
    }

    fn center_freq(&self) -> Option<f64> {
        self.sequence.center_freq()
    }

    fn next_block(&mut self, n: usize) -> Result<SampleSequence> {
        if n == 0 {
            return Err(Error::invalid_argument(
                "source",
                "block size must be ≥ 1, got 0",
            ));
        }
        if self.remaining() == 0 {
            return Err(Error::EndOfStream);
        }
        let end = (self.position + n).min(self.sequence.len());
        let block = self.sequence.slice(self.position..end);
        self.position = end;
        Ok(block)
    }
}
