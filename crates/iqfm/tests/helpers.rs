//! Test helper utilities for generating synthetic I/Q signals
#![allow(dead_code)]

use std::f64::consts::TAU;
use std::path::PathBuf;

use num_complex::Complex;

/// Generate a complex tone at `frequency` Hz
pub fn tone(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<Complex<f64>> {
    (0..num_samples)
        .map(|n| Complex::from_polar(1.0, TAU * frequency * n as f64 / sample_rate))
        .collect()
}

/// Generate an FM signal: a carrier at `carrier` Hz whose frequency swings
/// by `deviation` Hz following a sine at `audio` Hz
pub fn fm_signal(
    carrier: f64,
    deviation: f64,
    audio: f64,
    sample_rate: f64,
    num_samples: usize,
) -> Vec<Complex<f64>> {
    let mut phase = 0.0f64;
    (0..num_samples)
        .map(|n| {
            let t = n as f64 / sample_rate;
            let inst = carrier + deviation * (TAU * audio * t).sin();
            let sample = Complex::from_polar(1.0, phase);
            phase = (phase + TAU * inst / sample_rate) % TAU;
            sample
        })
        .collect()
}

/// Encode samples as interleaved Cu8 bytes
pub fn to_cu8(samples: &[Complex<f64>]) -> Vec<u8> {
    let encode = |x: f64| (x * 128.0 + 127.5).round().clamp(0.0, 255.0) as u8;
    samples
        .iter()
        .flat_map(|s| [encode(s.re), encode(s.im)])
        .collect()
}

/// Encode samples as interleaved little-endian Cs16 bytes
pub fn to_cs16(samples: &[Complex<f64>]) -> Vec<u8> {
    let encode = |x: f64| ((x * 32768.0).round().clamp(-32768.0, 32767.0) as i16).to_le_bytes();
    samples
        .iter()
        .flat_map(|s| {
            let [i0, i1] = encode(s.re);
            let [q0, q1] = encode(s.im);
            [i0, i1, q0, q1]
        })
        .collect()
}

/// Encode samples as interleaved little-endian Cf32 bytes
pub fn to_cf32(samples: &[Complex<f64>]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| {
            let mut bytes = [0u8; 8];
            bytes[..4].copy_from_slice(&(s.re as f32).to_le_bytes());
            bytes[4..].copy_from_slice(&(s.im as f32).to_le_bytes());
            bytes
        })
        .collect()
}

/// A path in the system temp directory unique to this test process
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("iqfm-{}-{name}", std::process::id()))
}
