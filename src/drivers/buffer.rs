use std::collections::VecDeque;

use ndarray::Array2;

use crate::error::PredictorError;

/// Rolling buffer that keeps the most recent `capacity` readings per channel.
#[derive(Clone, Debug)]
pub struct SampleRing {
    per_channel: Vec<VecDeque<f64>>, // channel -> samples
    capacity: usize,
}

impl SampleRing {
    pub fn new(n_channels: usize, capacity: usize) -> Self {
        let per_channel = (0..n_channels)
            .map(|_| VecDeque::with_capacity(capacity))
            .collect();
        Self {
            per_channel,
            capacity,
        }
    }

    pub fn n_channels(&self) -> usize {
        self.per_channel.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.per_channel.first().map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Appends one reading per channel, evicting the oldest once full.
    pub fn push_row(&mut self, readings: &[f64]) -> Result<(), PredictorError> {
        if readings.len() != self.per_channel.len() {
            return Err(PredictorError::ChannelMismatch {
                expected: self.per_channel.len(),
                actual: readings.len(),
            });
        }
        for (channel_queue, &sample) in self.per_channel.iter_mut().zip(readings) {
            if channel_queue.len() == self.capacity {
                channel_queue.pop_front();
            }
            channel_queue.push_back(sample);
        }
        Ok(())
    }

    /// Buffer contents, oldest first, as `[len, n_channels]`.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), self.n_channels()), |(row, channel)| {
            self.per_channel[channel][row]
        })
    }

    pub fn clear(&mut self) {
        for channel_queue in &mut self.per_channel {
            channel_queue.clear();
        }
    }
}
