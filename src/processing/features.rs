use std::fmt::Debug;

use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex64, FftPlanner};

use crate::processing::WindowSpec;
use crate::types::Label;

/// Turns one cleaned channel into a `[n_windows, n_features]` block.
pub trait FeatureExtractor: Debug + Send + Sync {
    fn n_features(&self) -> usize;

    fn extract(&self, signal: ArrayView1<f64>, spec: &WindowSpec) -> Array2<f64>;

    /// Picks one label and one group per window using the same bounds as `extract`.
    fn align_labels_and_groups(
        &self,
        labels: &[Label],
        groups: &[u32],
        spec: &WindowSpec,
    ) -> (Vec<Label>, Vec<u32>) {
        (spec.center_align(labels), spec.center_align(groups))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureSet {
    /// RMS, MAV, waveform length, zero crossings, slope sign changes.
    Simple,
    /// The simple set plus statistical, Hjorth and spectral features.
    Advanced,
}

const SIMPLE_FEATURES: usize = 5;
const ADVANCED_FEATURES: usize = 17;
const WAMP_THRESHOLD: f64 = 0.05;

/// Classic time/frequency-domain EMG window features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowFeatures {
    set: FeatureSet,
}

impl WindowFeatures {
    pub fn simple() -> Self {
        Self {
            set: FeatureSet::Simple,
        }
    }

    pub fn advanced() -> Self {
        Self {
            set: FeatureSet::Advanced,
        }
    }

    pub fn set(&self) -> FeatureSet {
        self.set
    }
}

impl FeatureExtractor for WindowFeatures {
    fn n_features(&self) -> usize {
        match self.set {
            FeatureSet::Simple => SIMPLE_FEATURES,
            FeatureSet::Advanced => ADVANCED_FEATURES,
        }
    }

    fn extract(&self, signal: ArrayView1<f64>, spec: &WindowSpec) -> Array2<f64> {
        let samples: Vec<f64> = signal.iter().copied().collect();
        let n_windows = spec.count(samples.len());
        let mut out = Array2::zeros((n_windows, self.n_features()));
        let mut spectrum = match self.set {
            FeatureSet::Advanced => Some(Spectrum::new(spec.window_samples(), spec.sampling_rate())),
            FeatureSet::Simple => None,
        };
        for (row, (start, end)) in spec.bounds(samples.len()).enumerate() {
            let window = &samples[start..end];
            let mut values = simple_features(window);
            if let Some(spectrum) = spectrum.as_mut() {
                values.extend(statistical_features(window));
                values.extend(spectrum.features(window));
            }
            for (col, value) in values.into_iter().enumerate() {
                out[[row, col]] = value;
            }
        }
        out
    }
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

fn sign_changes(values: &[f64]) -> usize {
    values
        .windows(2)
        .filter(|pair| sign(pair[0]) != sign(pair[1]))
        .count()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

fn simple_features(window: &[f64]) -> Vec<f64> {
    let rms = (window.iter().map(|v| v * v).sum::<f64>() / window.len() as f64).sqrt();
    let mav = window.iter().map(|v| v.abs()).sum::<f64>() / window.len() as f64;
    let deltas = diff(window);
    let wl = deltas.iter().map(|v| v.abs()).sum::<f64>();
    let zc = sign_changes(window) as f64;
    let ssc = sign_changes(&deltas) as f64;
    vec![rms, mav, wl, zc, ssc]
}

fn statistical_features(window: &[f64]) -> Vec<f64> {
    let var = variance(window);
    let iemg = window.iter().map(|v| v.abs()).sum::<f64>();
    let std = var.sqrt();

    let m = mean(window);
    let n = window.len() as f64;
    let m3 = window.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
    let m4 = window.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n;
    // biased moments, zero variance gives NaN
    let skewness = m3 / var.powf(1.5);
    let kurtosis = m4 / (var * var) - 3.0;

    let first = diff(window);
    let second = diff(&first);
    let wamp = first.iter().filter(|d| d.abs() > WAMP_THRESHOLD).count() as f64;

    let activity = var;
    let var_first = variance(&first);
    let mobility = (var_first / activity).sqrt();
    let complexity = (variance(&second) / var_first).sqrt();

    vec![
        var, iemg, std, skewness, kurtosis, wamp, activity, mobility, complexity,
    ]
}

/// Real-input magnitude spectrum, planned once per window length.
struct Spectrum {
    fft: std::sync::Arc<dyn rustfft::Fft<f64>>,
    frequencies_hz: Vec<f64>,
    buffer: Vec<Complex64>,
}

impl Spectrum {
    fn new(window_samples: usize, sampling_rate: f64) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(window_samples);
        let bins = window_samples / 2 + 1;
        let frequencies_hz = (0..bins)
            .map(|k| k as f64 * sampling_rate / window_samples as f64)
            .collect();
        Self {
            fft,
            frequencies_hz,
            buffer: Vec::with_capacity(window_samples),
        }
    }

    /// Mean frequency, median frequency, spectral entropy.
    fn features(&mut self, window: &[f64]) -> [f64; 3] {
        self.buffer.clear();
        self.buffer
            .extend(window.iter().map(|&v| Complex64::new(v, 0.0)));
        self.fft.process(&mut self.buffer);
        let magnitudes: Vec<f64> = self
            .buffer
            .iter()
            .take(self.frequencies_hz.len())
            .map(|c| c.norm())
            .collect();

        let total: f64 = magnitudes.iter().sum();
        let mnf = self
            .frequencies_hz
            .iter()
            .zip(&magnitudes)
            .map(|(f, m)| f * m)
            .sum::<f64>()
            / total;

        let half = total / 2.0;
        let mut cumulative = 0.0;
        let mut mdf = 0.0;
        for (freq, magnitude) in self.frequencies_hz.iter().zip(&magnitudes) {
            cumulative += magnitude;
            if cumulative >= half {
                mdf = *freq;
                break;
            }
        }

        let entropy = -magnitudes
            .iter()
            .map(|m| {
                let p = m / total;
                p * (p + 1e-12).log2()
            })
            .sum::<f64>();

        [mnf, mdf, entropy]
    }
}
