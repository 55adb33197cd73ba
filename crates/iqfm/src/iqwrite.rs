//! I/Q capture writing.
//!
//! The inverse of [`crate::iqread`]: encodes complex samples into a flat
//! interleaved little-endian capture, e.g. to save a frequency-shifted
//! baseband so it can be re-read (and re-shifted) later.

use std::io::{self, Write};
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::sequence::{Sample, SampleSequence};
use crate::{IqFormat, expanduser};

/// Writes complex samples to any `Write` in a fixed [`IqFormat`].
pub struct IqWrite<W: Write> {
    writer: W,
    format: IqFormat,
    written: u64,
}

impl<W: Write> IqWrite<W> {
    pub fn new(writer: W, format: IqFormat) -> Self {
        Self {
            writer,
            format,
            written: 0,
        }
    }

    /// Encode and write one block of samples.
    pub fn write_samples(&mut self, samples: &[Sample]) -> Result<()> {
        let bytes = crate::convert_complex_to_bytes(self.format, samples);
        self.writer.write_all(&bytes)?;
        self.written += samples.len() as u64;
        Ok(())
    }

    /// Samples written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Write a whole sequence to `path`, returning the number of samples written.
pub fn write_iq_file<P: AsRef<Path>>(
    path: P,
    sequence: &SampleSequence,
    format: IqFormat,
) -> Result<u64> {
    let path = expanduser(path.as_ref().to_path_buf());
    let file = std::fs::File::create(&path)?;
    let mut writer = IqWrite::new(io::BufWriter::new(file), format);
    writer.write_samples(sequence.samples())?;
    let written = writer.written();
    writer.finish()?;
    debug!(path = %path.display(), samples = written, format = ?format, "wrote I/Q capture");
    Ok(written)
}
