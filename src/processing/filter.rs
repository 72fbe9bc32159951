use std::f64::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterKind {
    Notch { freq_hz: f64, q: f64 },
    Highpass { cutoff_hz: f64, q: f64 },
    Lowpass { cutoff_hz: f64, q: f64 },
}

#[derive(Clone, Copy, Debug)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

#[derive(Clone, Copy, Debug)]
struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    fn process(&mut self, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * y + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * y;
        y
    }

    /// Primes the delay line as if `value` had been fed forever; returns the steady output.
    fn settle(&mut self, value: f64) -> f64 {
        let c = self.coeffs;
        let gain = (c.b0 + c.b1 + c.b2) / (1.0 + c.a1 + c.a2);
        let y = if gain.is_finite() { gain * value } else { 0.0 };
        self.state.z2 = c.b2 * value - c.a2 * y;
        self.state.z1 = c.b1 * value - c.a1 * y + self.state.z2;
        y
    }
}

/// Cascade of biquad sections designed for one sampling rate.
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    sections: Vec<BiquadFilter>,
}

impl FilterChain {
    pub fn from_kinds(sample_rate_hz: f64, kinds: &[FilterKind]) -> Self {
        let sections = kinds
            .iter()
            .map(|kind| BiquadFilter::new(design(sample_rate_hz, *kind)))
            .collect();
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn reset_to(&mut self, mut value: f64) {
        for section in &mut self.sections {
            value = section.settle(value);
        }
    }

    fn run(&mut self, signal: &mut [f64]) {
        let Some(&first) = signal.first() else {
            return;
        };
        self.reset_to(first);
        for sample in signal.iter_mut() {
            let mut value = *sample;
            for section in &mut self.sections {
                value = section.process(value);
            }
            *sample = value;
        }
    }

    /// Zero-phase filtering: one forward pass, one backward pass.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        let mut out = signal.to_vec();
        if self.is_empty() {
            return out;
        }
        let mut chain = self.clone();
        chain.run(&mut out);
        out.reverse();
        chain.run(&mut out);
        out.reverse();
        out
    }
}

fn design(sample_rate_hz: f64, kind: FilterKind) -> BiquadCoeffs {
    let nyquist = sample_rate_hz * 0.5;
    match kind {
        FilterKind::Notch { freq_hz, q } => notch(nyquist_clamp(freq_hz, nyquist), sample_rate_hz, q),
        FilterKind::Highpass { cutoff_hz, q } => {
            highpass(nyquist_clamp(cutoff_hz, nyquist), sample_rate_hz, q)
        }
        FilterKind::Lowpass { cutoff_hz, q } => {
            lowpass(nyquist_clamp(cutoff_hz, nyquist), sample_rate_hz, q)
        }
    }
}

fn nyquist_clamp(freq_hz: f64, nyquist: f64) -> f64 {
    freq_hz.clamp(0.01, (nyquist - 0.01).max(0.01))
}

fn lowpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = b0;
    normalize(b0, b1, b2, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
}

fn highpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 + cos_w0) * 0.5;
    let b1 = -(1.0 + cos_w0);
    let b2 = b0;
    normalize(b0, b1, b2, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
}

fn notch(center_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * center_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    normalize(1.0, -2.0 * cos_w0, 1.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
}

fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> BiquadCoeffs {
    let a0_inv = 1.0 / a0;
    BiquadCoeffs {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}
