#![doc = include_str!("../readme.md")]

use std::{
    path::PathBuf,
    pin::Pin,
    str::FromStr,
    task::{Context, Poll},
};

use futures::Stream;

pub mod dsp;
pub mod error;
pub mod iqread;
pub mod iqwrite;
pub mod meta;
pub mod pipeline;
pub mod sequence;
pub mod source;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineConfig, StreamingDemodulator};
pub use sequence::{Demodulated, Sample, SampleSequence};
pub use source::{MemorySource, SampleSource};

/**
 * I/Q Data Format
 *
 * All multi-byte formats are little-endian.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IqFormat {
    /// Complex unsigned 8-bit (Cu8)
    Cu8,
    /// Complex signed 8-bit (Cs8)
    Cs8,
    /// Complex signed 16-bit (Cs16)
    Cs16,
    /// Complex 32-bit float (Cf32)
    Cf32,
    /// Complex 64-bit float (Cf64)
    Cf64,
}

impl IqFormat {
    /// Number of bytes holding one complex sample (I and Q together).
    pub fn bytes_per_sample(self) -> usize {
        match self {
            IqFormat::Cu8 | IqFormat::Cs8 => 2,
            IqFormat::Cs16 => 4,
            IqFormat::Cf32 => 8,
            IqFormat::Cf64 => 16,
        }
    }

    /// The SigMF `core:datatype` string for this format.
    pub fn sigmf_datatype(self) -> &'static str {
        match self {
            IqFormat::Cu8 => "cu8",
            IqFormat::Cs8 => "ci8",
            IqFormat::Cs16 => "ci16_le",
            IqFormat::Cf32 => "cf32_le",
            IqFormat::Cf64 => "cf64_le",
        }
    }
}

impl FromStr for IqFormat {
    type Err = Error;

    /// Accepts the short names (`cu8`, `cs8`, `cs16`, `cf32`, `cf64`) as well
    /// as the SigMF datatypes (`ci8`, `ci16_le`, `cf32_le`, ...).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cu8" | "cu8_le" => Ok(IqFormat::Cu8),
            "cs8" | "ci8" | "ci8_le" => Ok(IqFormat::Cs8),
            "cs16" | "ci16" | "ci16_le" => Ok(IqFormat::Cs16),
            "cf32" | "cf32_le" => Ok(IqFormat::Cf32),
            "cf64" | "cf64_le" => Ok(IqFormat::Cf64),
            other if other.ends_with("_be") => Err(Error::invalid_argument(
                "format",
                format!("big-endian data is not supported: {other}"),
            )),
            other => Err(Error::invalid_argument(
                "format",
                format!("unsupported I/Q format: {other}"),
            )),
        }
    }
}

/**
 * Asynchronous I/Q Data Source (streamable)
 */
pub enum IqAsyncSource {
    /// File-based IQ source
    IqAsyncFile(iqread::IqAsyncRead<tokio::io::BufReader<tokio::fs::File>>),
    /// Stdin-based IQ source
    IqAsyncStdin(iqread::IqAsyncRead<tokio::io::BufReader<tokio::io::Stdin>>),
    /// TCP-based IQ source
    IqAsyncTcp(iqread::IqAsyncRead<tokio::io::BufReader<tokio::net::TcpStream>>),
}

impl IqAsyncSource {
    /// Create a new file-based asynchronous I/Q source
    pub async fn from_file<P: AsRef<std::path::Path>>(
        path: P,
        config: iqread::IqConfig,
    ) -> Result<Self> {
        let source = iqread::IqAsyncRead::from_file(path, config).await?;
        Ok(IqAsyncSource::IqAsyncFile(source))
    }

    /// Create a new stdin-based asynchronous I/Q source
    pub fn from_stdin(config: iqread::IqConfig) -> Result<Self> {
        let source = iqread::IqAsyncRead::from_stdin(config)?;
        Ok(IqAsyncSource::IqAsyncStdin(source))
    }

    /// Create a new TCP-based asynchronous I/Q source
    pub async fn from_tcp(addr: &str, port: u16, config: iqread::IqConfig) -> Result<Self> {
        let source = iqread::IqAsyncRead::from_tcp(addr, port, config).await?;
        Ok(IqAsyncSource::IqAsyncTcp(source))
    }

    /// Sample rate the blocks of this source are taken at
    pub fn sample_rate(&self) -> f64 {
        match self {
            IqAsyncSource::IqAsyncFile(source) => source.config().sample_rate,
            IqAsyncSource::IqAsyncStdin(source) => source.config().sample_rate,
            IqAsyncSource::IqAsyncTcp(source) => source.config().sample_rate,
        }
    }
}

impl Stream for IqAsyncSource {
    type Item = Result<Vec<Sample>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut() {
            IqAsyncSource::IqAsyncFile(source) => Pin::new(source).poll_next(cx),
            IqAsyncSource::IqAsyncStdin(source) => Pin::new(source).poll_next(cx),
            IqAsyncSource::IqAsyncTcp(source) => Pin::new(source).poll_next(cx),
        }
    }
}

/// Decode whole samples from `buffer`; trailing bytes of a partial sample
/// are ignored (callers check alignment before decoding).
fn convert_bytes_to_complex(format: IqFormat, buffer: &[u8]) -> Vec<Sample> {
    match format {
        IqFormat::Cu8 => buffer
            .chunks_exact(2)
            .map(|c| Sample::new((c[0] as f64 - 127.5) / 128.0, (c[1] as f64 - 127.5) / 128.0))
            .collect(),
        IqFormat::Cs8 => buffer
            .chunks_exact(2)
            .map(|c| Sample::new((c[0] as i8) as f64 / 128.0, (c[1] as i8) as f64 / 128.0))
            .collect(),
        IqFormat::Cs16 => buffer
            .chunks_exact(4)
            .map(|c| {
                Sample::new(
                    i16::from_le_bytes([c[0], c[1]]) as f64 / 32768.0,
                    i16::from_le_bytes([c[2], c[3]]) as f64 / 32768.0,
                )
            })
            .collect(),
        IqFormat::Cf32 => buffer
            .chunks_exact(8)
            .map(|c| {
                Sample::new(
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]) as f64,
                )
            })
            .collect(),
        IqFormat::Cf64 => buffer
            .chunks_exact(16)
            .map(|c| {
                let (re, im) = c.split_at(8);
                Sample::new(
                    f64::from_le_bytes(re.try_into().unwrap_or([0; 8])),
                    f64::from_le_bytes(im.try_into().unwrap_or([0; 8])),
                )
            })
            .collect(),
    }
}

/// Encode samples into interleaved little-endian bytes of `format`.
///
/// Integer formats saturate at their full-scale range.
fn convert_complex_to_bytes(format: IqFormat, samples: &[Sample]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * format.bytes_per_sample());
    for s in samples {
        match format {
            IqFormat::Cu8 => {
                for v in [s.re, s.im] {
                    out.push((v * 128.0 + 127.5).round().clamp(0.0, 255.0) as u8);
                }
            }
            IqFormat::Cs8 => {
                for v in [s.re, s.im] {
                    out.push(((v * 128.0).round().clamp(-128.0, 127.0) as i8) as u8);
                }
            }
            IqFormat::Cs16 => {
                for v in [s.re, s.im] {
                    let q = (v * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
                    out.extend_from_slice(&q.to_le_bytes());
                }
            }
            IqFormat::Cf32 => {
                out.extend_from_slice(&(s.re as f32).to_le_bytes());
                out.extend_from_slice(&(s.im as f32).to_le_bytes());
            }
            IqFormat::Cf64 => {
                out.extend_from_slice(&s.re.to_le_bytes());
                out.extend_from_slice(&s.im.to_le_bytes());
            }
        }
    }
    out
}

fn expanduser(path: PathBuf) -> PathBuf {
    // Check if the path starts with "~"
    if let Some(stripped) = path.to_str().and_then(|p| p.strip_prefix("~"))
        && let Some(home_dir) = dirs::home_dir()
    {
        return home_dir.join(stripped.trim_start_matches('/'));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_format_names() {
        assert_eq!("cu8".parse::<IqFormat>().unwrap(), IqFormat::Cu8);
        assert_eq!("CS16".parse::<IqFormat>().unwrap(), IqFormat::Cs16);
        assert_eq!("ci16_le".parse::<IqFormat>().unwrap(), IqFormat::Cs16);
        assert_eq!("cf32_le".parse::<IqFormat>().unwrap(), IqFormat::Cf32);
        assert_eq!("cf64".parse::<IqFormat>().unwrap(), IqFormat::Cf64);
        assert!("cf32_be".parse::<IqFormat>().is_err());
        assert!("wav".parse::<IqFormat>().is_err());
    }

    #[test]
    fn test_sigmf_datatype_parses_back() {
        for format in [
            IqFormat::Cu8,
            IqFormat::Cs8,
            IqFormat::Cs16,
            IqFormat::Cf32,
            IqFormat::Cf64,
        ] {
            assert_eq!(format.sigmf_datatype().parse::<IqFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_cu8_center_and_extremes() {
        let samples = convert_bytes_to_complex(IqFormat::Cu8, &[0, 255, 127, 128]);
        assert_eq!(samples.len(), 2);
        assert_relative_eq!(samples[0].re, -127.5 / 128.0);
        assert_relative_eq!(samples[0].im, 127.5 / 128.0);
        assert_relative_eq!(samples[1].re, -0.5 / 128.0);
        assert_relative_eq!(samples[1].im, 0.5 / 128.0);
    }

    #[test]
    fn test_cs16_decoding() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16384i16.to_le_bytes());
        bytes.extend_from_slice(&(-32768i16).to_le_bytes());
        let samples = convert_bytes_to_complex(IqFormat::Cs16, &bytes);
        assert_eq!(samples, vec![Sample::new(0.5, -1.0)]);
    }

    #[test]
    fn test_partial_trailing_sample_is_ignored() {
        let samples = convert_bytes_to_complex(IqFormat::Cf32, &[0u8; 12]);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_integer_encoding_saturates() {
        let bytes = convert_complex_to_bytes(IqFormat::Cs8, &[Sample::new(2.0, -2.0)]);
        assert_eq!(bytes, vec![127u8, 128u8]);
        let bytes = convert_complex_to_bytes(IqFormat::Cu8, &[Sample::new(2.0, -2.0)]);
        assert_eq!(bytes, vec![255u8, 0u8]);
    }

    #[test]
    fn test_float_encoding_is_exact() {
        let samples = vec![Sample::new(0.25, -0.75), Sample::new(1e-3, 3.5)];
        for format in [IqFormat::Cf32, IqFormat::Cf64] {
            let bytes = convert_complex_to_bytes(format, &samples);
            assert_eq!(bytes.len(), samples.len() * format.bytes_per_sample());
            assert_eq!(convert_bytes_to_complex(format, &bytes)[0], samples[0]);
        }
    }
}
