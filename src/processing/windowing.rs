//! Sliding-window arithmetic shared by dataset construction and online prediction.
//!
//! Window and step lengths are `trunc(seconds * sampling_rate)` samples. A sequence of
//! length `L` yields `floor((L - window) / step) + 1` windows when `L >= window`, else
//! none. Labels, groups and raw signal all go through the same bounds, so the i-th
//! window of each lines up positionally.
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Validated window configuration, in seconds and in samples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    window_size: f64,
    step_size: f64,
    sampling_rate: f64,
    window_samples: usize,
    step_samples: usize,
}

impl WindowSpec {
    pub fn new(window_size: f64, step_size: f64, sampling_rate: f64) -> Result<Self, ConfigError> {
        if !(sampling_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sampling_rate));
        }
        let window_samples = samples_for(window_size, sampling_rate);
        let step_samples = samples_for(step_size, sampling_rate);
        if step_samples == 0 {
            return Err(ConfigError::EmptyStep {
                step_size,
                sampling_rate,
            });
        }
        if window_samples < step_samples {
            return Err(ConfigError::WindowShorterThanStep {
                window_samples,
                step_samples,
            });
        }
        Ok(Self {
            window_size,
            step_size,
            sampling_rate,
            window_samples,
            step_samples,
        })
    }

    pub fn window_size(&self) -> f64 {
        self.window_size
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    pub fn step_samples(&self) -> usize {
        self.step_samples
    }

    /// Number of windows over a sequence of `length` samples.
    pub fn count(&self, length: usize) -> usize {
        if length < self.window_samples {
            0
        } else {
            (length - self.window_samples) / self.step_samples + 1
        }
    }

    pub fn bounds(&self, length: usize) -> WindowBounds {
        WindowBounds {
            next: 0,
            remaining: self.count(length),
            window: self.window_samples,
            step: self.step_samples,
        }
    }

    /// Center index of every window over `length` samples.
    pub fn centers(&self, length: usize) -> Vec<usize> {
        self.bounds(length)
            .map(|(start, end)| start + (end - start) / 2)
            .collect()
    }

    /// One value per window, taken at the window center.
    pub fn center_align<T: Clone>(&self, sequence: &[T]) -> Vec<T> {
        self.bounds(sequence.len())
            .map(|(start, end)| sequence[start + (end - start) / 2].clone())
            .collect()
    }
}

/// Iterator over `[start, end)` window bounds.
#[derive(Clone, Debug)]
pub struct WindowBounds {
    next: usize,
    remaining: usize,
    window: usize,
    step: usize,
}

impl Iterator for WindowBounds {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let start = self.next;
        self.next += self.step;
        self.remaining -= 1;
        Some((start, start + self.window))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for WindowBounds {}

fn samples_for(seconds: f64, sampling_rate: f64) -> usize {
    let product = seconds * sampling_rate;
    if product.is_finite() && product > 0.0 {
        product.trunc() as usize
    } else {
        0
    }
}

/// Stateless form of [`WindowSpec::bounds`].
pub fn window_bounds(
    length: usize,
    window_size: f64,
    step_size: f64,
    sampling_rate: f64,
) -> Result<Vec<(usize, usize)>, ConfigError> {
    let spec = WindowSpec::new(window_size, step_size, sampling_rate)?;
    Ok(spec.bounds(length).collect())
}

/// Stateless form of [`WindowSpec::center_align`].
pub fn center_align<T: Clone>(
    sequence: &[T],
    window_size: f64,
    step_size: f64,
    sampling_rate: f64,
) -> Result<Vec<T>, ConfigError> {
    let spec = WindowSpec::new(window_size, step_size, sampling_rate)?;
    Ok(spec.center_align(sequence))
}
