use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt::Debug;

use ndarray::{Array1, ArrayView1};

use crate::processing::filter::{FilterChain, FilterKind};

/// Turns one raw channel into a cleaned channel of identical length.
pub trait SignalCleaner: Debug + Send + Sync {
    fn clean(&self, signal: ArrayView1<f64>, sampling_rate: f64) -> Array1<f64>;
}

/// Leaves the signal untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

impl SignalCleaner for PassThrough {
    fn clean(&self, signal: ArrayView1<f64>, _sampling_rate: f64) -> Array1<f64> {
        signal.to_owned()
    }
}

/// Band-pass (cascaded high-pass + low-pass) followed by a mains notch, zero phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandpassNotch {
    pub low_hz: f64,
    pub high_hz: f64,
    /// Sections per band edge.
    pub order: usize,
    pub notch_hz: f64,
    pub q: f64,
}

impl BandpassNotch {
    pub fn emg() -> Self {
        Self {
            low_hz: 20.0,
            high_hz: 450.0,
            order: 2,
            notch_hz: 50.0,
            q: 30.0,
        }
    }

    pub fn eeg() -> Self {
        Self {
            low_hz: 1.0,
            high_hz: 40.0,
            order: 2,
            notch_hz: 50.0,
            q: 30.0,
        }
    }

    fn chain(&self, sampling_rate: f64) -> FilterChain {
        let order = self.order.max(1);
        let mut kinds = Vec::with_capacity(2 * order + 1);
        for _ in 0..order {
            kinds.push(FilterKind::Highpass {
                cutoff_hz: self.low_hz,
                q: FRAC_1_SQRT_2,
            });
            kinds.push(FilterKind::Lowpass {
                cutoff_hz: self.high_hz,
                q: FRAC_1_SQRT_2,
            });
        }
        kinds.push(FilterKind::Notch {
            freq_hz: self.notch_hz,
            q: self.q,
        });
        FilterChain::from_kinds(sampling_rate, &kinds)
    }
}

impl Default for BandpassNotch {
    fn default() -> Self {
        Self::emg()
    }
}

impl SignalCleaner for BandpassNotch {
    fn clean(&self, signal: ArrayView1<f64>, sampling_rate: f64) -> Array1<f64> {
        let raw: Vec<f64> = signal.iter().copied().collect();
        Array1::from(self.chain(sampling_rate).filtfilt(&raw))
    }
}
