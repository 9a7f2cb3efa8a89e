use crate::signal::{Events, SamplingRate, TimeSeries};
use serde::{Deserialize, Serialize};

/// Anything that can locate R-peaks in a conditioned single-lead signal.
///
/// Implementations must be deterministic for identical input. Positions may be
/// fractional; [`detect_peak_indices`] turns them into sample indices.
pub trait BeatDetector {
    fn find_peaks(&self, signal: &[f64], fs: SamplingRate) -> Vec<f64>;
}

/// Run `detector` and normalize its output into strictly increasing sample
/// indices: positions are rounded to the nearest sample, anything outside
/// `[0, len - 1]` or non-finite is dropped, and duplicates collapse.
pub fn detect_peak_indices<D: BeatDetector + ?Sized>(
    detector: &D,
    signal: &[f64],
    fs: SamplingRate,
) -> Events {
    let last = signal.len() as f64 - 1.0;
    let mut indices: Vec<usize> = detector
        .find_peaks(signal, fs)
        .into_iter()
        .filter(|p| p.is_finite())
        .map(f64::round)
        .filter(|&p| p >= 0.0 && p <= last)
        .map(|p| p as usize)
        .collect();
    indices.sort_unstable();
    indices.dedup();
    log::info!("detected {} R-peaks", indices.len());
    Events::from_indices(indices)
}

/// Configurable parameters for the ECG beat detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgPipelineConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
}

impl Default for EcgPipelineConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.250,
            threshold_scale: 0.6,
            search_back_s: 0.150,
        }
    }
}

/// Pan–Tompkins-inspired detector: band-pass, derivative, squaring, moving
/// window integration and an adaptive threshold with a refractory period.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanTompkinsDetector {
    pub config: EcgPipelineConfig,
}

impl PanTompkinsDetector {
    pub fn new(config: EcgPipelineConfig) -> Self {
        Self { config }
    }
}

impl BeatDetector for PanTompkinsDetector {
    fn find_peaks(&self, signal: &[f64], fs: SamplingRate) -> Vec<f64> {
        let ts = TimeSeries::new(fs, signal.to_vec());
        detect_r_peaks_with_config(&ts, &self.config)
            .indices
            .into_iter()
            .map(|i| i as f64)
            .collect()
    }
}

/// Detect R-peaks using the configurable pipeline.
pub fn detect_r_peaks_with_config(ts: &TimeSeries, cfg: &EcgPipelineConfig) -> Events {
    if ts.is_empty() {
        return Events::from_indices(Vec::new());
    }

    let (bandpassed, integrated) = pan_tompkins_envelope(ts, cfg);
    let peaks = pick_peaks(&bandpassed, &integrated, ts.fs, cfg);

    if peaks.len() < 2 {
        // Fall back to the naive peak picker if the adaptive method underperformed.
        return Events::from_indices(fallback_peak_picker(ts, cfg));
    }

    Events::from_indices(peaks)
}

fn pan_tompkins_envelope(ts: &TimeSeries, cfg: &EcgPipelineConfig) -> (Vec<f64>, Vec<f64>) {
    let fs = ts.fs.max(1.0);
    let bandpassed = bandpass(&ts.data, fs, cfg.lowcut_hz, cfg.highcut_hz);
    let squared: Vec<f64> = derivative(&bandpassed).iter().map(|x| x * x).collect();
    let win = ((cfg.integration_window_s * fs).round() as usize).max(1);
    let integrated = moving_average(&squared, win);
    (bandpassed, integrated)
}

fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = first;
    let mut prev_x = first;
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut prev = first;
    data.iter()
        .map(|&x| {
            prev += alpha * (x - prev);
            prev
        })
        .collect()
}

fn derivative(data: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc / win as f64;
    }
    out
}

fn pick_peaks(
    bandpassed: &[f64],
    envelope: &[f64],
    fs: f64,
    cfg: &EcgPipelineConfig,
) -> Vec<usize> {
    if bandpassed.is_empty() || envelope.is_empty() {
        return Vec::new();
    }
    // A flat lead has no energy to threshold against.
    if envelope.iter().all(|&e| e <= f64::EPSILON) {
        return Vec::new();
    }

    let refractory = (cfg.min_rr_s * fs).round().max(1.0) as usize;
    let search = (cfg.search_back_s * fs).round().max(1.0) as usize;

    let init = envelope.len().min((fs as usize).max(1));
    let avg = envelope[..init].iter().sum::<f64>() / init as f64;
    let mut signal_level = avg;
    let mut noise_level = avg * 0.5;
    let mut threshold = noise_level + cfg.threshold_scale * (signal_level - noise_level).max(0.0);
    let mut last_peak_sample = 0usize;
    let mut peaks = Vec::new();

    for (i, &sample) in envelope.iter().enumerate() {
        let refractory_ok = peaks.is_empty() || i - last_peak_sample >= refractory;
        if sample > threshold && refractory_ok {
            let start = i.saturating_sub(search);
            let end = i.min(bandpassed.len() - 1);
            let mut idx = start;
            let mut max_val = f64::MIN;
            for (j, &v) in bandpassed.iter().enumerate().take(end + 1).skip(start) {
                if v > max_val {
                    max_val = v;
                    idx = j;
                }
            }
            peaks.push(idx);
            last_peak_sample = i;
            signal_level = 0.125 * sample + 0.875 * signal_level;
        } else {
            noise_level = 0.125 * sample + 0.875 * noise_level;
        }

        threshold = noise_level + cfg.threshold_scale * (signal_level - noise_level).max(0.0);
    }

    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

fn fallback_peak_picker(ts: &TimeSeries, cfg: &EcgPipelineConfig) -> Vec<usize> {
    let min_gap = (cfg.min_rr_s * ts.fs).max(1.0) as usize;
    let data = &ts.data;
    if data.len() < 3 {
        return Vec::new();
    }

    let win = ((0.150 * ts.fs) as usize).max(1);
    let ma = moving_average(data, win);

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..data.len() - 1 {
        let y = data[i] - ma[i];
        let local_max = y > f64::EPSILON
            && y > (data[i - 1] - ma[i - 1])
            && y > (data[i + 1] - ma[i + 1]);
        let spaced = peaks.last().map_or(true, |&last| i - last >= min_gap);
        if local_max && spaced {
            peaks.push(i);
        }
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::synthetic_ecg;

    struct FixedPositions(Vec<f64>);

    impl BeatDetector for FixedPositions {
        fn find_peaks(&self, _signal: &[f64], _fs: SamplingRate) -> Vec<f64> {
            self.0.clone()
        }
    }

    fn fs(hz: u32) -> SamplingRate {
        SamplingRate::new(hz).unwrap()
    }

    #[test]
    fn detects_regular_beats() {
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let signal = synthetic_ecg(250, &rr);
        let events = detect_peak_indices(&PanTompkinsDetector::default(), &signal, fs(250));
        assert_eq!(events.indices.len(), rr.len() + 1);
        assert!(events.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn detection_is_deterministic() {
        let rr = [0.9, 0.85, 0.88, 0.86, 0.82, 0.81, 0.8];
        let signal = synthetic_ecg(360, &rr);
        let detector = PanTompkinsDetector::default();
        let a = detect_peak_indices(&detector, &signal, fs(360));
        let b = detect_peak_indices(&detector, &signal, fs(360));
        assert_eq!(a, b);
    }

    #[test]
    fn fractional_positions_round_to_nearest() {
        let detector = FixedPositions(vec![10.4, 10.6, 2.5, 99.5, -0.4, f64::NAN, 42.0]);
        let signal = vec![0.0; 100];
        let events = detect_peak_indices(&detector, &signal, fs(100));
        // 2.5 rounds away from zero, 99.5 -> 100 is out of range, -0.4 -> 0
        assert_eq!(events.indices, vec![0, 3, 10, 11, 42]);
    }

    #[test]
    fn flat_zero_lead_yields_no_beats() {
        let signal = vec![0.0; 2500];
        let events = detect_peak_indices(&PanTompkinsDetector::default(), &signal, fs(250));
        assert!(events.len() < 2, "got {:?}", events.indices);
        let constant = vec![1.0; 2500];
        let events = detect_peak_indices(&PanTompkinsDetector::default(), &constant, fs(250));
        assert!(events.len() < 2);
    }

    #[test]
    fn empty_signal_yields_no_peaks() {
        let events = detect_peak_indices(&PanTompkinsDetector::default(), &[], fs(250));
        assert!(events.is_empty());
    }
}
