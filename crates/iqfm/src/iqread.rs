//! I/Q Data Reading Module
//!
//! This module reads raw interleaved I/Q captures from files, standard input
//! and TCP streams. A capture is a flat run of little-endian values, two per
//! complex sample, optionally preceded by a header that is skipped. Samples
//! are upcast to `Complex<f64>` whatever their stored precision.
//!
//! The synchronous [`IqRead`] implements [`SampleSource`] and `Iterator`; the
//! asynchronous [`IqAsyncRead`] is a `futures::Stream` of sample blocks.
use std::io::{self, Read};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::io::{AsyncBufRead, ReadBuf};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::sequence::{Sample, SampleSequence, check_sample_rate};
use crate::source::SampleSource;
use crate::{IqFormat, expanduser};

/**
 * I/Q Data Source Configuration
 */
#[derive(Debug, Clone)]
pub struct IqConfig {
    pub iq_format: IqFormat,
    pub center_freq: Option<f64>,
    pub sample_rate: f64,
    /// Samples per block when iterating or streaming
    pub chunk_size: usize,
    /// Bytes skipped at the start of the data
    pub header_bytes: u64,
    /// Stop after this many samples
    pub max_samples: Option<u64>,
}

impl IqConfig {
    pub fn new(sample_rate: f64, chunk_size: usize, iq_format: IqFormat) -> Self {
        Self {
            iq_format,
            center_freq: None,
            sample_rate,
            chunk_size,
            header_bytes: 0,
            max_samples: None,
        }
    }

    pub fn with_center_freq(mut self, center_freq: f64) -> Self {
        self.center_freq = Some(center_freq);
        self
    }

    pub fn with_header_bytes(mut self, header_bytes: u64) -> Self {
        self.header_bytes = header_bytes;
        self
    }

    pub fn with_max_samples(mut self, max_samples: u64) -> Self {
        self.max_samples = Some(max_samples);
        self
    }

    fn validate(&self) -> Result<()> {
        check_sample_rate("iqread", self.sample_rate)?;
        if self.chunk_size == 0 {
            return Err(Error::invalid_argument(
                "iqread",
                "chunk size must be ≥ 1, got 0",
            ));
        }
        Ok(())
    }

    /// Samples to request next, given how many were already delivered.
    fn block_len(&self, requested: usize, delivered: u64) -> usize {
        match self.max_samples {
            Some(max) => requested.min(max.saturating_sub(delivered) as usize),
            None => requested,
        }
    }
}

/**
 * Synchronous I/Q Reader
 */
pub struct IqRead<R: Read> {
    config: IqConfig,
    reader: R,
    delivered: u64,
    exhausted: bool,
}

impl<R: Read> IqRead<R> {
    /// Wrap a reader, consuming the configured header immediately.
    pub fn new(mut reader: R, config: IqConfig) -> Result<Self> {
        config.validate()?;
        if config.header_bytes > 0 {
            let skipped = io::copy(
                &mut (&mut reader).take(config.header_bytes),
                &mut io::sink(),
            )?;
            if skipped < config.header_bytes {
                return Err(Error::malformed(format!(
                    "header of {} bytes is larger than the data ({} bytes)",
                    config.header_bytes, skipped
                )));
            }
        }
        Ok(Self {
            config,
            reader,
            delivered: 0,
            exhausted: false,
        })
    }

    pub fn config(&self) -> &IqConfig {
        &self.config
    }

    /// Samples handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn read_samples(&mut self, n: usize) -> Result<Vec<Sample>> {
        let n = self.config.block_len(n, self.delivered);
        if self.exhausted || n == 0 {
            self.exhausted = true;
            return Err(Error::EndOfStream);
        }
        let bytes_per_sample = self.config.iq_format.bytes_per_sample();
        let mut buffer = vec![0u8; n * bytes_per_sample];
        let mut filled = 0;
        while filled < buffer.len() {
            match self.reader.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(k) => filled += k,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled < buffer.len() {
            self.exhausted = true;
        }
        if filled % bytes_per_sample != 0 {
            return Err(Error::malformed(format!(
                "data ends inside a sample: {} trailing bytes of a {}-byte {:?} sample",
                filled % bytes_per_sample,
                bytes_per_sample,
                self.config.iq_format
            )));
        }
        if filled == 0 {
            return Err(Error::EndOfStream);
        }
        let samples = crate::convert_bytes_to_complex(self.config.iq_format, &buffer[..filled]);
        self.delivered += samples.len() as u64;
        trace!(samples = samples.len(), delivered = self.delivered, "read I/Q block");
        Ok(samples)
    }

    fn wrap(&self, samples: Vec<Sample>) -> Result<SampleSequence> {
        let seq = SampleSequence::new(samples, self.config.sample_rate)?;
        Ok(match self.config.center_freq {
            Some(center_freq) => seq.with_center_freq(center_freq),
            None => seq,
        })
    }
}

impl IqRead<io::BufReader<std::fs::File>> {
    /// Open a capture file, checking that the header fits and that the
    /// remaining length is a whole number of samples.
    pub fn from_file<P: AsRef<Path>>(path: P, config: IqConfig) -> Result<Self> {
        let path = expanduser(path.as_ref().to_path_buf());
        let file = std::fs::File::open(&path)?;
        let len = file.metadata()?.len();
        if config.header_bytes > len {
            return Err(Error::malformed(format!(
                "header of {} bytes is larger than {} ({} bytes)",
                config.header_bytes,
                path.display(),
                len
            )));
        }
        let bytes_per_sample = config.iq_format.bytes_per_sample() as u64;
        let payload = len - config.header_bytes;
        if payload % bytes_per_sample != 0 {
            return Err(Error::malformed(format!(
                "{} holds {} data bytes, not a whole number of {}-byte {:?} samples",
                path.display(),
                payload,
                bytes_per_sample,
                config.iq_format
            )));
        }
        debug!(
            path = %path.display(),
            samples = payload / bytes_per_sample,
            format = ?config.iq_format,
            "opened I/Q capture"
        );
        Self::new(io::BufReader::new(file), config)
    }
}

impl IqRead<io::BufReader<io::Stdin>> {
    pub fn from_stdin(config: IqConfig) -> Result<Self> {
        Self::new(io::BufReader::new(io::stdin()), config)
    }
}

impl<R: Read> SampleSource for IqRead<R> {
    fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    fn center_freq(&self) -> Option<f64> {
        self.config.center_freq
    }

    fn next_block(&mut self, n: usize) -> Result<SampleSequence> {
        if n == 0 {
            return Err(Error::invalid_argument(
                "iqread",
                "block size must be ≥ 1, got 0",
            ));
        }
        let samples = self.read_samples(n)?;
        self.wrap(samples)
    }
}

impl<R: Read> Iterator for IqRead<R> {
    type Item = Result<SampleSequence>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_block(self.config.chunk_size) {
            Ok(block) => Some(Ok(block)),
            Err(Error::EndOfStream) => None,
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

/// Read a whole capture file into memory.
pub fn read_iq_file<P: AsRef<Path>>(path: P, config: IqConfig) -> Result<SampleSequence> {
    let chunk_size = config.chunk_size;
    let mut reader = IqRead::from_file(path, config)?;
    reader.read_to_end(chunk_size)
}

/**
 * Asynchronous I/Q Reader
 */
pub struct IqAsyncRead<R: AsyncBufRead + Unpin> {
    config: IqConfig,
    reader: R,
    header_remaining: u64,
    pending: Vec<u8>,
    delivered: u64,
    done: bool,
}

impl<R: AsyncBufRead + Unpin> IqAsyncRead<R> {
    pub fn new(reader: R, config: IqConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            header_remaining: config.header_bytes,
            config,
            reader,
            pending: Vec::new(),
            delivered: 0,
            done: false,
        })
    }

    pub fn config(&self) -> &IqConfig {
        &self.config
    }
}

impl IqAsyncRead<tokio::io::BufReader<tokio::fs::File>> {
    pub async fn from_file<P: AsRef<Path>>(path: P, config: IqConfig) -> Result<Self> {
        let path = expanduser(path.as_ref().to_path_buf());
        let file = tokio::fs::File::open(path).await?;
        Self::new(tokio::io::BufReader::new(file), config)
    }
}

impl IqAsyncRead<tokio::io::BufReader<tokio::io::Stdin>> {
    pub fn from_stdin(config: IqConfig) -> Result<Self> {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), config)
    }
}

impl IqAsyncRead<tokio::io::BufReader<tokio::net::TcpStream>> {
    pub async fn from_tcp(address: &str, port: u16, config: IqConfig) -> Result<Self> {
        let stream = tokio::net::TcpStream::connect((address, port)).await?;
        Self::new(tokio::io::BufReader::new(stream), config)
    }
}

impl<R: AsyncBufRead + Unpin> Stream for IqAsyncRead<R> {
    type Item = Result<Vec<Sample>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let bytes_per_sample = this.config.iq_format.bytes_per_sample();
        let target = this.config.block_len(this.config.chunk_size, this.delivered) * bytes_per_sample;
        if target == 0 {
            this.done = true;
            return Poll::Ready(None);
        }

        // Bytes read before a Pending stay in `pending` for the next poll.
        let mut eof = false;
        while this.header_remaining > 0 {
            let mut scratch = [0u8; 4096];
            let want = this.header_remaining.min(scratch.len() as u64) as usize;
            let mut read_buf = ReadBuf::new(&mut scratch[..want]);
            match Pin::new(&mut this.reader).poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => {
                    let filled = read_buf.filled().len();
                    if filled == 0 {
                        this.done = true;
                        return Poll::Ready(Some(Err(Error::malformed(format!(
                            "header of {} bytes is larger than the stream",
                            this.config.header_bytes
                        )))));
                    }
                    this.header_remaining -= filled as u64;
                }
                Poll::Ready(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        while this.pending.len() < target {
            let start = this.pending.len();
            this.pending.resize(target, 0);
            let (poll, filled) = {
                let mut read_buf = ReadBuf::new(&mut this.pending[start..]);
                let poll = Pin::new(&mut this.reader).poll_read(cx, &mut read_buf);
                (poll, read_buf.filled().len())
            };
            this.pending.truncate(start + filled);
            match poll {
                Poll::Ready(Ok(())) => {
                    if filled == 0 {
                        eof = true;
                        break;
                    }
                }
                Poll::Ready(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        if eof {
            this.done = true;
            if this.pending.len() % bytes_per_sample != 0 {
                let trailing = this.pending.len() % bytes_per_sample;
                this.pending.clear();
                return Poll::Ready(Some(Err(Error::malformed(format!(
                    "stream ends inside a sample: {trailing} trailing bytes"
                )))));
            }
            if this.pending.is_empty() {
                return Poll::Ready(None);
            }
        }

        let samples = crate::convert_bytes_to_complex(this.config.iq_format, &this.pending);
        this.pending.clear();
        this.delivered += samples.len() as u64;
        Poll::Ready(Some(Ok(samples)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cu8_config(chunk_size: usize) -> IqConfig {
        IqConfig::new(96_000.0, chunk_size, IqFormat::Cu8)
    }

    #[test]
    fn test_header_is_skipped() {
        let data = vec![0xAA, 0xBB, 0xCC, 255, 0, 127, 128];
        let mut reader = IqRead::new(Cursor::new(data), cu8_config(8).with_header_bytes(3)).unwrap();
        let block = reader.next_block(8).unwrap();
        assert_eq!(block.len(), 2);
        assert!(block[0].re > 0.99 && block[0].im < -0.99);
    }

    #[test]
    fn test_header_larger_than_stream() {
        let data = vec![1u8, 2, 3];
        let err = IqRead::new(Cursor::new(data), cu8_config(8).with_header_bytes(4))
            .err()
            .expect("header must not fit");
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_trailing_partial_sample_is_malformed() {
        let data = vec![0u8; 8 + 3];
        let mut reader = IqRead::new(
            Cursor::new(data),
            IqConfig::new(1_000.0, 4, IqFormat::Cf32),
        )
        .unwrap();
        let err = reader.next_block(4).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_max_samples_limits_output() {
        let data = vec![127u8; 20];
        let reader = IqRead::new(Cursor::new(data), cu8_config(3).with_max_samples(7)).unwrap();
        let lens: Vec<usize> = reader.map(|b| b.unwrap().len()).collect();
        assert_eq!(lens, vec![3, 3, 1]);
    }

    #[test]
    fn test_end_of_stream_is_sticky() {
        let mut reader = IqRead::new(Cursor::new(vec![127u8; 4]), cu8_config(2)).unwrap();
        assert_eq!(reader.next_block(5).unwrap().len(), 2);
        assert!(reader.next_block(5).unwrap_err().is_end_of_stream());
        assert!(reader.next_block(5).unwrap_err().is_end_of_stream());
        assert_eq!(reader.delivered(), 2);
    }

    #[test]
    fn test_invalid_config() {
        let bad_rate = IqConfig::new(0.0, 16, IqFormat::Cu8);
        assert!(IqRead::new(Cursor::new(vec![]), bad_rate).is_err());
        let bad_chunk = IqConfig::new(1.0, 0, IqFormat::Cu8);
        assert!(IqRead::new(Cursor::new(vec![]), bad_chunk).is_err());
    }

    #[test]
    fn test_blocks_carry_rate_and_center() {
        let config = cu8_config(2).with_center_freq(162e6);
        let mut reader = IqRead::new(Cursor::new(vec![127u8; 4]), config).unwrap();
        let block = reader.next_block(2).unwrap();
        assert_eq!(block.sample_rate(), 96_000.0);
        assert_eq!(block.center_freq(), Some(162e6));
    }
}
