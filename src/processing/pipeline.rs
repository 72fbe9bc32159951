use std::sync::Arc;

use ndarray::{concatenate, Array2, ArrayView2, Axis};

use crate::error::{ConfigError, ProcessingError};
use crate::processing::{FeatureExtractor, SignalCleaner, WindowSpec};
use crate::types::Label;

/// Cleaner + extractor applied to every channel of one signal group.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub cleaner: Arc<dyn SignalCleaner>,
    pub extractor: Arc<dyn FeatureExtractor>,
}

impl ChannelConfig {
    pub fn new(cleaner: impl SignalCleaner + 'static, extractor: impl FeatureExtractor + 'static) -> Self {
        Self {
            cleaner: Arc::new(cleaner),
            extractor: Arc::new(extractor),
        }
    }

    fn features_for(
        &self,
        signals: ArrayView2<f64>,
        columns: &[usize],
        spec: &WindowSpec,
        blocks: &mut Vec<Array2<f64>>,
    ) {
        for &column in columns {
            let clean = self.cleaner.clean(signals.column(column), spec.sampling_rate());
            blocks.push(self.extractor.extract(clean.view(), spec));
        }
    }
}

/// Multi-channel feature pipeline: EMG columns first, then EEG columns.
#[derive(Clone, Debug)]
pub struct SignalProcessor {
    emg: Option<ChannelConfig>,
    eeg: Option<ChannelConfig>,
    emg_columns: Option<Vec<usize>>,
}

impl SignalProcessor {
    pub fn new(
        emg: Option<ChannelConfig>,
        eeg: Option<ChannelConfig>,
        emg_columns: Option<Vec<usize>>,
    ) -> Result<Self, ConfigError> {
        if emg.is_none() && eeg.is_none() {
            return Err(ConfigError::NoSignalGroup);
        }
        if emg.is_some() && eeg.is_some() && emg_columns.is_none() {
            return Err(ConfigError::MissingChannelPartition);
        }
        Ok(Self {
            emg,
            eeg,
            emg_columns,
        })
    }

    pub fn emg_only(config: ChannelConfig) -> Self {
        Self {
            emg: Some(config),
            eeg: None,
            emg_columns: None,
        }
    }

    /// Feature columns produced per window for `n_channels` input channels.
    pub fn n_features(&self, n_channels: usize) -> Result<usize, ProcessingError> {
        let mut total = 0;
        for (config, columns) in self.partition(n_channels)? {
            total += config.extractor.n_features() * columns.len();
        }
        Ok(total)
    }

    /// One label and one group per window, aligned by the leading extractor.
    pub fn align_labels_and_groups(
        &self,
        labels: &[Label],
        groups: &[u32],
        spec: &WindowSpec,
    ) -> (Vec<Label>, Vec<u32>) {
        match self.emg.as_ref().or(self.eeg.as_ref()) {
            Some(config) => config.extractor.align_labels_and_groups(labels, groups, spec),
            None => (spec.center_align(labels), spec.center_align(groups)),
        }
    }

    fn partition(
        &self,
        n_channels: usize,
    ) -> Result<Vec<(&ChannelConfig, Vec<usize>)>, ProcessingError> {
        if let Some(columns) = &self.emg_columns {
            if let Some(&index) = columns.iter().find(|&&index| index >= n_channels) {
                return Err(ProcessingError::ChannelOutOfRange {
                    index,
                    channels: n_channels,
                });
            }
        }
        let mut groups = Vec::with_capacity(2);
        if let Some(emg) = &self.emg {
            let columns = match &self.emg_columns {
                Some(columns) => columns.clone(),
                None => (0..n_channels).collect(),
            };
            if columns.is_empty() {
                return Err(ProcessingError::NoChannels { group: "emg" });
            }
            groups.push((emg, columns));
        }
        if let Some(eeg) = &self.eeg {
            let columns: Vec<usize> = match &self.emg_columns {
                Some(emg_columns) => (0..n_channels)
                    .filter(|index| !emg_columns.contains(index))
                    .collect(),
                None => (0..n_channels).collect(),
            };
            if columns.is_empty() {
                return Err(ProcessingError::NoChannels { group: "eeg" });
            }
            groups.push((eeg, columns));
        }
        Ok(groups)
    }

    /// `signals` is `[n_samples, n_channels]` without the timestamp column.
    /// Returns `[n_windows, n_features]`.
    pub fn process(
        &self,
        signals: ArrayView2<f64>,
        spec: &WindowSpec,
    ) -> Result<Array2<f64>, ProcessingError> {
        let mut blocks = Vec::new();
        for (config, columns) in self.partition(signals.ncols())? {
            config.features_for(signals, &columns, spec, &mut blocks);
        }

        let expected = blocks.first().map(|block| block.nrows()).unwrap_or(0);
        if let Some(block) = blocks.iter().find(|block| block.nrows() != expected) {
            return Err(ProcessingError::WindowCountMismatch {
                expected,
                actual: block.nrows(),
            });
        }
        let views: Vec<_> = blocks.iter().map(|block| block.view()).collect();
        Ok(concatenate(Axis(1), &views)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{PassThrough, WindowFeatures};
    use ndarray::{Array2, ArrayView1};

    /// Emits the window mean, tagging which extractor produced it.
    #[derive(Debug)]
    struct MeanExtractor {
        offset: f64,
    }

    impl FeatureExtractor for MeanExtractor {
        fn n_features(&self) -> usize {
            1
        }

        fn extract(&self, signal: ArrayView1<f64>, spec: &WindowSpec) -> Array2<f64> {
            let values: Vec<f64> = spec
                .bounds(signal.len())
                .map(|(start, end)| {
                    signal.slice(ndarray::s![start..end]).mean().unwrap_or(0.0) + self.offset
                })
                .collect();
            Array2::from_shape_vec((values.len(), 1), values).unwrap()
        }
    }

    /// Breaks the equal-window-count contract on purpose.
    #[derive(Debug)]
    struct ShortExtractor;

    impl FeatureExtractor for ShortExtractor {
        fn n_features(&self) -> usize {
            1
        }

        fn extract(&self, _signal: ArrayView1<f64>, _spec: &WindowSpec) -> Array2<f64> {
            Array2::zeros((0, 1))
        }
    }

    fn signals() -> Array2<f64> {
        // channel c holds the constant value c
        Array2::from_shape_fn((20, 3), |(_, c)| c as f64)
    }

    fn spec() -> WindowSpec {
        WindowSpec::new(1.0, 0.5, 10.0).unwrap()
    }

    #[test]
    fn rejects_ambiguous_partitioning() {
        let emg = ChannelConfig::new(PassThrough, WindowFeatures::simple());
        let eeg = ChannelConfig::new(PassThrough, WindowFeatures::simple());
        assert!(matches!(
            SignalProcessor::new(Some(emg), Some(eeg), None),
            Err(ConfigError::MissingChannelPartition)
        ));
        assert!(matches!(
            SignalProcessor::new(None, None, None),
            Err(ConfigError::NoSignalGroup)
        ));
    }

    #[test]
    fn stacks_channels_in_order() {
        let processor =
            SignalProcessor::emg_only(ChannelConfig::new(PassThrough, MeanExtractor { offset: 0.0 }));
        let features = processor.process(signals().view(), &spec()).unwrap();
        assert_eq!(features.dim(), (3, 3));
        assert_eq!(features.row(0).to_vec(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn emg_block_precedes_eeg_block() {
        let processor = SignalProcessor::new(
            Some(ChannelConfig::new(PassThrough, MeanExtractor { offset: 100.0 })),
            Some(ChannelConfig::new(PassThrough, MeanExtractor { offset: 200.0 })),
            Some(vec![2]),
        )
        .unwrap();
        let features = processor.process(signals().view(), &spec()).unwrap();
        // emg: channel 2, eeg: channels 0 and 1
        assert_eq!(features.row(0).to_vec(), vec![102.0, 200.0, 201.0]);
        assert_eq!(processor.n_features(3).unwrap(), 3);
    }

    #[test]
    fn out_of_range_partition_fails() {
        let processor = SignalProcessor::new(
            Some(ChannelConfig::new(PassThrough, MeanExtractor { offset: 0.0 })),
            None,
            Some(vec![7]),
        )
        .unwrap();
        assert!(matches!(
            processor.process(signals().view(), &spec()),
            Err(ProcessingError::ChannelOutOfRange { index: 7, channels: 3 })
        ));
    }

    #[test]
    fn mismatched_window_counts_fail_hard() {
        let processor = SignalProcessor::new(
            Some(ChannelConfig::new(PassThrough, MeanExtractor { offset: 0.0 })),
            Some(ChannelConfig::new(PassThrough, ShortExtractor)),
            Some(vec![0]),
        )
        .unwrap();
        assert!(matches!(
            processor.process(signals().view(), &spec()),
            Err(ProcessingError::WindowCountMismatch { expected: 3, actual: 0 })
        ));
    }

    #[test]
    fn short_input_gives_zero_rows() {
        let processor =
            SignalProcessor::emg_only(ChannelConfig::new(PassThrough, WindowFeatures::simple()));
        let short = Array2::from_shape_fn((5, 2), |(r, _)| r as f64);
        let features = processor.process(short.view(), &spec()).unwrap();
        assert_eq!(features.dim(), (0, 10));
    }
}
