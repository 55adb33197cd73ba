//! Per-sample phase angles and phase unwrapping.
//!
//! Taking the angle of every sample and differencing gives values in
//! `(-2π, 2π)`: wherever the true phase step straddles the branch cut the
//! difference is off by a whole turn. [`unwrap`] folds each difference back
//! into `(-π, π]`, after which the result matches
//! [`fm::demodulate`](super::fm::demodulate). The polar discriminator is the
//! path to use; this one exists to check it.

use std::f64::consts::{PI, TAU};

use tracing::debug;

use super::fm::angle;
use crate::sequence::{Sample, SampleSequence};

/// Fold a single phase value into `(-π, π]`.
///
/// Non-finite values are returned unchanged.
pub fn wrap_phase(phase: f64) -> f64 {
    if !phase.is_finite() {
        return phase;
    }
    let mut p = phase;
    if p.abs() > 4.0 * PI {
        // many turns out: reduce first so the loops below stay short
        p = (p + PI).rem_euclid(TAU) - PI;
    }
    while p > PI {
        p -= TAU;
    }
    while p <= -PI {
        p += TAU;
    }
    p
}

/// Unwrap a sequence of phase differences into `(-π, π]`.
pub fn unwrap(diffs: &[f64]) -> Vec<f64> {
    diffs.iter().copied().map(wrap_phase).collect()
}

/// Angle of every sample, each in `(-π, π]`.
pub fn phase_angles(samples: &[Sample]) -> Vec<f64> {
    samples.iter().copied().map(angle).collect()
}

/// `angles[i+1] - angles[i]`, without any wrap correction.
pub fn naive_diff(angles: &[f64]) -> Vec<f64> {
    angles.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Demodulate through per-sample angles, differencing and unwrapping.
pub fn demodulate_unwrapped(input: &SampleSequence) -> Vec<f64> {
    let diffs = naive_diff(&phase_angles(input.samples()));
    let wraps = diffs.iter().filter(|d| d.abs() > PI).count();
    debug!(samples = input.len(), wraps, "unwrapping naive phase differences");
    unwrap(&diffs)
}
