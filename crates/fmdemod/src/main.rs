//! FM demodulator for recorded I/Q captures
//!
//! Reads a raw I/Q capture (file, stdin or TCP), brings the station of
//! interest to baseband, low-pass filters, decimates and demodulates it, and
//! writes the result as raw PCM.
//!
//! # Usage Examples
//!
//! ## Raw capture, station 300 kHz above the tuner frequency
//! ```bash
//! fmdemod capture.cu8 -s 2.4M -o 300k --output audio.f32
//! ```
//!
//! ## SigMF capture, sample rate and format from the sidecar
//! ```bash
//! fmdemod capture.sigmf-data -c 98.5M --station 98.2M --encoding s16 | aplay -f S16_LE -r 240000
//! ```
//!
//! ## Keep the decimated baseband for later
//! ```bash
//! fmdemod capture.cs16 -f cs16 -s 2M -o -150k --baseband-out station.sigmf-data
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{ArgAction, Parser, ValueEnum};
use futures::StreamExt;
use tracing::{debug, info, warn};

use iqfm::dsp::convolve::ConvolutionMethod;
use iqfm::dsp::decimator::DecimationMode;
use iqfm::dsp::fm::{demodulate, to_hz};
use iqfm::iqread::IqConfig;
use iqfm::iqwrite::write_iq_file;
use iqfm::meta::{SigMfMeta, meta_path_for};
use iqfm::{Error, IqAsyncSource, IqFormat, Pipeline, PipelineConfig, SampleSequence};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frequency(f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Encoding {
    /// 32-bit float, little-endian
    F32,
    /// Signed 16-bit PCM, little-endian
    S16,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "FM demodulator for recorded I/Q captures", long_about = None)]
struct Args {
    /// Input capture (omit or use "-" for stdin)
    input: Option<PathBuf>,

    /// Read from a TCP server instead (host:port)
    #[arg(long, conflicts_with = "input")]
    tcp: Option<String>,

    /// IQ format (cu8, cs8, cs16, cf32, cf64 or a SigMF datatype)
    #[arg(short, long, value_parser = IqFormat::from_str)]
    format: Option<IqFormat>,

    /// Sample rate in Hz (accepts k/M suffix, e.g. 2.4M)
    #[arg(short, long, value_parser = Frequency::from_str)]
    sample_rate: Option<Frequency>,

    /// Center frequency of the capture in Hz (accepts k/M suffix)
    #[arg(short, long, value_parser = Frequency::from_str)]
    center_freq: Option<Frequency>,

    /// SigMF sidecar (defaults to the .sigmf-meta next to a .sigmf-data input)
    #[arg(long)]
    meta: Option<PathBuf>,

    /// Bytes to skip at the start of the input
    #[arg(long)]
    header_bytes: Option<u64>,

    /// Stop after this many samples
    #[arg(long)]
    max_samples: Option<u64>,

    /// Station offset from the center frequency in Hz (can be negative)
    #[arg(short, long, value_parser = Frequency::from_str, allow_hyphen_values = true)]
    offset_freq: Option<Frequency>,

    /// Absolute station frequency, needs the center frequency
    #[arg(long, value_parser = Frequency::from_str, conflicts_with = "offset_freq")]
    station: Option<Frequency>,

    /// Low-pass cutoff in Hz
    #[arg(long, value_parser = Frequency::from_str, default_value = "100k")]
    cutoff: Frequency,

    /// Filter transition width as a fraction of the sample rate
    #[arg(long, default_value_t = 0.02)]
    transition_width: f64,

    /// Number of filter taps (overrides --transition-width)
    #[arg(long)]
    taps: Option<usize>,

    /// Decimation factor
    #[arg(short, long, default_value_t = 10)]
    decimation: usize,

    /// Decimation mode (select or average)
    #[arg(long, value_parser = DecimationMode::from_str, default_value = "select")]
    mode: DecimationMode,

    /// Convolution method (direct, fft or auto)
    #[arg(long, value_parser = ConvolutionMethod::from_str, default_value = "auto")]
    convolution: ConvolutionMethod,

    /// Trim the filter group delay from both ends
    #[arg(long, default_value_t = false)]
    compensate_delay: bool,

    /// Output instantaneous frequency in Hz instead of radians per sample
    #[arg(long, default_value_t = false)]
    hz: bool,

    /// Samples read per block
    #[arg(long, default_value_t = 65_536)]
    chunk_size: usize,

    /// Output file ("-" for stdout)
    #[arg(long, default_value = "-")]
    output: PathBuf,

    /// Output sample encoding
    #[arg(long, value_enum, default_value = "f32")]
    encoding: Encoding,

    /// Also save the decimated baseband as cf32 with a SigMF sidecar
    /// (processes the whole capture in memory)
    #[arg(long)]
    baseband_out: Option<PathBuf>,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> iqfm::Result<()> {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    let iq_config = reader_config(&args)?;
    let shift_hz = -station_offset(&args, iq_config.center_freq)?;
    let config = PipelineConfig {
        shift_hz,
        cutoff_hz: args.cutoff.0,
        transition_width: args.transition_width,
        taps: args.taps,
        decimation: args.decimation,
        mode: args.mode,
        compensate_group_delay: args.compensate_delay,
        output_hz: args.hz,
        convolution: args.convolution,
    };
    let pipeline = Pipeline::new(config, iq_config.sample_rate)?;
    let full_scale = if args.hz {
        pipeline.output_rate() / 2.0
    } else {
        std::f64::consts::PI
    };
    let mut sink = AudioSink::open(&args.output, args.encoding, full_scale)?;

    let center_freq = iq_config.center_freq;
    let mut source = open_source(&args, iq_config).await?;

    match &args.baseband_out {
        Some(path) => {
            let mut samples = Vec::new();
            while let Some(block) = source.next().await {
                samples.extend(block?);
            }
            let mut capture = SampleSequence::new(samples, pipeline.sample_rate())?;
            if let Some(fc) = center_freq {
                capture = capture.with_center_freq(fc);
            }
            let baseband = pipeline.baseband(&capture)?;
            save_baseband(path, &baseband, &pipeline)?;

            let mut audio = demodulate(&baseband);
            if args.hz {
                audio = to_hz(&audio, baseband.sample_rate());
            }
            sink.write(&audio)?;
        }
        None => {
            let mut demod = pipeline.streaming()?;
            while let Some(block) = source.next().await {
                let audio = demod.process_samples(&block?);
                sink.write(&audio)?;
            }
            sink.write(&demod.finish())?;
        }
    }

    let written = sink.finish()?;
    info!(
        samples = written,
        sample_rate = pipeline.output_rate(),
        encoding = ?args.encoding,
        "demodulation complete"
    );
    Ok(())
}

/// Reader settings from the sidecar (if any), overridden by the command line.
fn reader_config(args: &Args) -> iqfm::Result<IqConfig> {
    let meta_path = args.meta.clone().or_else(|| {
        let input = args.input.as_ref()?;
        let is_sigmf = input.extension().is_some_and(|ext| ext == "sigmf-data");
        let candidate = meta_path_for(input);
        (is_sigmf && candidate.exists()).then_some(candidate)
    });

    let mut config = match &meta_path {
        Some(path) => {
            debug!(path = %path.display(), "reading sidecar");
            SigMfMeta::load(path)?.iq_config(args.chunk_size)?
        }
        None => {
            let Some(rate) = args.sample_rate else {
                return Err(Error::invalid_argument(
                    "cli",
                    "a sample rate (--sample-rate) or a sidecar (--meta) is required",
                ));
            };
            IqConfig::new(rate.0, args.chunk_size, args.format.unwrap_or(IqFormat::Cu8))
        }
    };

    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate.0;
    }
    if let Some(format) = args.format {
        config.iq_format = format;
    }
    if let Some(fc) = args.center_freq {
        config.center_freq = Some(fc.0);
    }
    if let Some(header_bytes) = args.header_bytes {
        config.header_bytes = header_bytes;
    }
    if let Some(max_samples) = args.max_samples {
        config.max_samples = Some(max_samples);
    }
    Ok(config)
}

/// Offset of the station from the capture center, in Hz.
fn station_offset(args: &Args, center_freq: Option<f64>) -> iqfm::Result<f64> {
    match (args.offset_freq, args.station) {
        (Some(offset), _) => Ok(offset.0),
        (None, Some(station)) => match center_freq {
            Some(fc) => Ok(station.0 - fc),
            None => Err(Error::invalid_argument(
                "cli",
                "--station needs the capture center frequency (--center-freq or a sidecar)",
            )),
        },
        (None, None) => {
            warn!("no --offset-freq or --station given, demodulating the capture center");
            Ok(0.0)
        }
    }
}

async fn open_source(args: &Args, config: IqConfig) -> iqfm::Result<IqAsyncSource> {
    if let Some(endpoint) = &args.tcp {
        let (host, port) = endpoint
            .rsplit_once(':')
            .and_then(|(host, port)| Some((host, port.parse::<u16>().ok()?)))
            .ok_or_else(|| {
                Error::invalid_argument("cli", format!("expected host:port, got {endpoint:?}"))
            })?;
        info!(host, port, "reading I/Q from TCP");
        return IqAsyncSource::from_tcp(host, port, config).await;
    }
    match &args.input {
        Some(path) if path != Path::new("-") => {
            info!(path = %path.display(), format = ?config.iq_format, "reading I/Q file");
            IqAsyncSource::from_file(path, config).await
        }
        _ => {
            info!(format = ?config.iq_format, "reading I/Q from stdin");
            IqAsyncSource::from_stdin(config)
        }
    }
}

/// Write the baseband capture and a sidecar describing it.
fn save_baseband(path: &Path, baseband: &SampleSequence, pipeline: &Pipeline) -> iqfm::Result<()> {
    write_iq_file(path, baseband, IqFormat::Cf32)?;

    let config = pipeline.config();
    let mut meta = SigMfMeta::new(IqFormat::Cf32, baseband.sample_rate());
    meta.global.description = Some(format!(
        "shifted by {} Hz, low-passed at {} Hz ({} taps), decimated by {}",
        config.shift_hz,
        config.cutoff_hz,
        pipeline.kernel().len(),
        config.decimation
    ));
    // the station now sits at 0 Hz
    let station = baseband.center_freq().map(|fc| fc - config.shift_hz);
    meta.add_capture(0, station, None);
    let meta_path = meta_path_for(path);
    meta.save(&meta_path)?;
    info!(
        data = %path.display(),
        meta = %meta_path.display(),
        samples = baseband.len(),
        "saved baseband"
    );
    Ok(())
}

/// Raw PCM output.
struct AudioSink {
    writer: BufWriter<Box<dyn Write>>,
    encoding: Encoding,
    /// Input value mapped to full scale for `s16`
    full_scale: f64,
    written: u64,
}

impl AudioSink {
    fn open(path: &Path, encoding: Encoding, full_scale: f64) -> iqfm::Result<Self> {
        let writer: Box<dyn Write> = if path == Path::new("-") {
            Box::new(io::stdout())
        } else {
            Box::new(File::create(path)?)
        };
        Ok(Self::new(writer, encoding, full_scale))
    }

    fn new(writer: Box<dyn Write>, encoding: Encoding, full_scale: f64) -> Self {
        Self {
            writer: BufWriter::new(writer),
            encoding,
            full_scale,
            written: 0,
        }
    }

    fn write(&mut self, samples: &[f64]) -> iqfm::Result<()> {
        let bytes = encode(samples, self.encoding, self.full_scale);
        self.writer.write_all(&bytes)?;
        self.written += samples.len() as u64;
        Ok(())
    }

    fn finish(mut self) -> iqfm::Result<u64> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

fn encode(samples: &[f64], encoding: Encoding, full_scale: f64) -> Vec<u8> {
    match encoding {
        Encoding::F32 => samples
            .iter()
            .flat_map(|&x| (x as f32).to_le_bytes())
            .collect(),
        Encoding::S16 => samples
            .iter()
            .flat_map(|&x| {
                let scaled = (x / full_scale * i16::MAX as f64).round();
                (scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16).to_le_bytes()
            })
            .collect(),
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let value = if let Some(stripped) = s.strip_suffix('M') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid MHz value")?;
            val * 1_000_000.0
        } else if let Some(stripped) = s.strip_suffix('k') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid kHz value")?;
            val * 1_000.0
        } else {
            s.parse().map_err(|_| "Invalid Hz value")?
        };
        if !value.is_finite() {
            return Err(format!("Invalid frequency: {s}"));
        }
        Ok(Frequency(value))
    }
}
