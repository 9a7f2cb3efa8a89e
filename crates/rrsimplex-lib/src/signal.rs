use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SimplexError};

/// Two columns pulled from a tabular recording, one row per sample.
///
/// Timestamps are expected to be strictly increasing; amplitudes may still
/// contain NaN for empty or unparseable cells until [`condition_signal`] runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub lead: String,
    pub time_column: String,
    pub timestamps: Vec<f64>,
    pub amplitude: Vec<f64>,
}

impl RawSeries {
    pub fn len(&self) -> usize {
        self.amplitude.len()
    }
    pub fn is_empty(&self) -> bool {
        self.amplitude.is_empty()
    }
}

/// Integer sampling frequency in Hz, always > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SamplingRate(u32);

impl SamplingRate {
    pub fn new(hz: u32) -> Option<Self> {
        (hz > 0).then_some(Self(hz))
    }
    pub fn hz(self) -> u32 {
        self.0
    }
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl TryFrom<u32> for SamplingRate {
    type Error = String;

    fn try_from(hz: u32) -> std::result::Result<Self, Self::Error> {
        SamplingRate::new(hz).ok_or_else(|| "sampling rate must be positive".to_string())
    }
}

impl From<SamplingRate> for u32 {
    fn from(fs: SamplingRate) -> u32 {
        fs.0
    }
}

impl fmt::Display for SamplingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Derive the sampling frequency from the mean spacing of `timestamps`.
///
/// A single difference is too sensitive to logger jitter, so the mean step is
/// inverted and rounded to the nearest integer.
pub fn estimate_sampling_rate(timestamps: &[f64]) -> Result<SamplingRate> {
    if timestamps.len() < 2 {
        return Err(SimplexError::InsufficientData {
            found: timestamps.len(),
        });
    }
    let steps = timestamps.len() - 1;
    let mean_step = timestamps
        .windows(2)
        .map(|w| w[1] - w[0])
        .sum::<f64>()
        / steps as f64;
    if !mean_step.is_finite() || mean_step <= 0.0 {
        return Err(SimplexError::DegenerateTimebase { mean_step });
    }
    let hz = (1.0 / mean_step).round();
    if hz < 1.0 || hz > u32::MAX as f64 {
        return Err(SimplexError::DegenerateTimebase { mean_step });
    }
    let fs = SamplingRate(hz as u32);
    log::info!("calculated sampling rate: {:.2} Hz -> {}", 1.0 / mean_step, fs);
    Ok(fs)
}

/// Replace non-finite samples with the mean of the finite ones.
pub fn condition_signal(samples: &[f64]) -> Result<Vec<f64>> {
    let (sum, valid) = samples
        .iter()
        .filter(|x| x.is_finite())
        .fold((0.0, 0usize), |(sum, n), x| (sum + x, n + 1));
    if valid == 0 {
        return Err(SimplexError::AllInvalidSignal { len: samples.len() });
    }
    let fill = sum / valid as f64;
    if valid < samples.len() {
        log::debug!(
            "filled {} invalid samples with mean {:.6}",
            samples.len() - valid,
            fill
        );
    }
    Ok(samples
        .iter()
        .map(|&x| if x.is_finite() { x } else { fill })
        .collect())
}

/// Basic typed time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: SamplingRate, data: Vec<f64>) -> Self {
        Self {
            fs: fs.as_f64(),
            data,
        }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Point events on a timeline (e.g., R-peaks indices)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    /// Successive peak distances divided by `fs`. Fewer than two peaks give an
    /// empty series; the triplet stage reports the shortage.
    pub fn from_events(events: &Events, fs: SamplingRate) -> Self {
        let fs = fs.as_f64();
        let rr = events
            .indices
            .windows(2)
            .map(|w| (w[1] as f64 - w[0] as f64) / fs)
            .collect();
        Self { rr }
    }
    pub fn len(&self) -> usize {
        self.rr.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hz_timestamps_give_one_hz() {
        let ts: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(estimate_sampling_rate(&ts).unwrap().hz(), 1);
    }

    #[test]
    fn jittered_timestamps_round_to_nominal_rate() {
        let ts: Vec<f64> = (0..500)
            .map(|i| i as f64 * 0.004 + if i % 2 == 0 { 0.0003 } else { -0.0002 })
            .collect();
        assert_eq!(estimate_sampling_rate(&ts).unwrap().hz(), 250);
    }

    #[test]
    fn short_or_flat_timebase_is_rejected() {
        assert!(matches!(
            estimate_sampling_rate(&[1.0]),
            Err(SimplexError::InsufficientData { found: 1 })
        ));
        assert!(matches!(
            estimate_sampling_rate(&[2.0, 2.0, 2.0]),
            Err(SimplexError::DegenerateTimebase { .. })
        ));
        assert!(matches!(
            estimate_sampling_rate(&[3.0, 2.0, 1.0]),
            Err(SimplexError::DegenerateTimebase { .. })
        ));
        // 0.2 Hz rounds to zero
        assert!(matches!(
            estimate_sampling_rate(&[0.0, 5.0, 10.0]),
            Err(SimplexError::DegenerateTimebase { .. })
        ));
    }

    #[test]
    fn nan_samples_take_the_valid_mean() {
        let out = condition_signal(&[1.0, f64::NAN, 3.0, f64::INFINITY]).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 2.0]);
    }

    #[test]
    fn all_invalid_signal_is_reported() {
        assert!(matches!(
            condition_signal(&[f64::NAN, f64::NAN]),
            Err(SimplexError::AllInvalidSignal { len: 2 })
        ));
    }

    #[test]
    fn rr_from_regular_peaks() {
        let events = Events::from_indices(vec![0, 100, 200, 300]);
        let fs = SamplingRate::new(100).unwrap();
        let rr = RRSeries::from_events(&events, fs);
        assert_eq!(rr.rr, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn rr_length_is_peaks_minus_one() {
        let fs = SamplingRate::new(250).unwrap();
        for n in 0..6usize {
            let events = Events::from_indices((0..n).map(|i| i * 200 + 7).collect());
            let rr = RRSeries::from_events(&events, fs);
            assert_eq!(rr.len(), n.saturating_sub(1));
            assert!(rr.rr.iter().all(|&x| x > 0.0));
        }
    }

    #[test]
    fn sampling_rate_rejects_zero_when_deserialized() {
        assert!(serde_json::from_str::<SamplingRate>("0").is_err());
        assert_eq!(serde_json::from_str::<SamplingRate>("360").unwrap().hz(), 360);
    }
}
