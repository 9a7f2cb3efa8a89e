//! Synthetic single-lead ECG for demos and tests: narrow Gaussian R-waves
//! riding on a slow 1 Hz baseline wander.

use std::f64::consts::PI;

/// Seconds of signal before the first beat and after the last one.
const PADDING_S: f64 = 0.5;

/// Render a signal sampled at `fs` Hz whose beats are separated by `rr`
/// (seconds). The first beat sits at 0.5 s.
pub fn synthetic_ecg(fs: u32, rr: &[f64]) -> Vec<f64> {
    let fs = fs as f64;
    let beats = beat_times(rr);
    let duration = beats.last().copied().unwrap_or(0.0) + 2.0 * PADDING_S;
    let samples = (duration * fs) as usize;
    (0..samples)
        .map(|i| {
            let time = i as f64 / fs;
            let mut v = 0.05 * (2.0 * PI * time).sin();
            for &bt in &beats {
                let width = 0.02;
                v += 1.2 * (-0.5 * ((time - bt) / width).powi(2)).exp();
            }
            v
        })
        .collect()
}

/// Timestamp column matching [`synthetic_ecg`]: `len` samples starting at 0.
pub fn timestamps(fs: u32, len: usize) -> Vec<f64> {
    (0..len).map(|i| i as f64 / fs as f64).collect()
}

fn beat_times(rr: &[f64]) -> Vec<f64> {
    let mut t = PADDING_S;
    let mut beats = Vec::with_capacity(rr.len() + 1);
    beats.push(t);
    for &interval in rr {
        t += interval;
        beats.push(t);
    }
    beats
}
