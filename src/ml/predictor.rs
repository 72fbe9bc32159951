use std::sync::Arc;

use ndarray::Array2;

use crate::drivers::SampleRing;
use crate::error::PredictorError;
use crate::ml::classifier::{argmax, Classifier};
use crate::ml::trainer::FittedModel;
use crate::processing::{SignalProcessor, WindowSpec};

/// One emitted prediction.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub code: usize,
    /// One probability per label-mapping code.
    pub probabilities: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictorState {
    /// Fewer than `window_samples` rows buffered.
    Filling,
    /// Buffer full; a prediction is due every `step_samples` rows.
    Ready,
}

/// Online classifier over the last `window_samples` rows.
///
/// The first prediction comes on the row that fills the buffer, then one every
/// `step_samples` rows.
#[derive(Debug)]
pub struct Predictor<C> {
    spec: WindowSpec,
    processor: SignalProcessor,
    model: Arc<FittedModel<C>>,
    // sized on the first row
    ring: Option<SampleRing>,
    countdown: usize,
    n_predictions: u64,
}

impl<C: Classifier> Predictor<C> {
    pub fn new(spec: WindowSpec, processor: SignalProcessor, model: Arc<FittedModel<C>>) -> Self {
        Self {
            spec,
            processor,
            model,
            ring: None,
            countdown: 1,
            n_predictions: 0,
        }
    }

    pub fn model(&self) -> &Arc<FittedModel<C>> {
        &self.model
    }

    pub fn state(&self) -> PredictorState {
        match &self.ring {
            Some(ring) if ring.is_full() => PredictorState::Ready,
            _ => PredictorState::Filling,
        }
    }

    pub fn n_predictions(&self) -> u64 {
        self.n_predictions
    }

    /// Feeds one row (channels plus trailing timestamp).
    pub fn update(&mut self, row: &[f64]) -> Result<Option<Prediction>, PredictorError> {
        if row.len() < 2 {
            return Err(PredictorError::MalformedRow(row.len()));
        }
        let readings = &row[..row.len() - 1];
        let window_samples = self.spec.window_samples();
        let ring = self
            .ring
            .get_or_insert_with(|| SampleRing::new(readings.len(), window_samples));
        ring.push_row(readings)?;
        if !ring.is_full() {
            return Ok(None);
        }

        self.countdown -= 1;
        if self.countdown > 0 {
            return Ok(None);
        }
        self.countdown = self.spec.step_samples();
        self.predict().map(Some)
    }

    fn predict(&mut self) -> Result<Prediction, PredictorError> {
        let buffered = match &self.ring {
            Some(ring) => ring.to_array(),
            None => return Err(PredictorError::UnexpectedWindows(0)),
        };
        let features = self.processor.process(buffered.view(), &self.spec)?;
        if features.nrows() != 1 {
            return Err(PredictorError::UnexpectedWindows(features.nrows()));
        }
        let raw = features.row(0);
        let selected = self
            .model
            .feature_columns
            .iter()
            .map(|&index| {
                raw.get(index).copied().ok_or(PredictorError::MissingFeature {
                    index,
                    width: raw.len(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let x = Array2::from_shape_vec((1, selected.len()), selected)
            .map_err(crate::error::ProcessingError::from)?;

        let proba = self.model.classifier.predict_proba(x.view())?;
        let probabilities: Vec<f64> = proba.row(0).to_vec();
        self.n_predictions += 1;
        Ok(Prediction {
            code: argmax(probabilities.iter().copied()),
            probabilities,
        })
    }

    /// Empties the buffer and restarts the schedule.
    pub fn reset(&mut self) {
        self.ring = None;
        self.countdown = 1;
        self.n_predictions = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::GaussianNb;
    use crate::processing::{ChannelConfig, LabelMapping, PassThrough, WindowFeatures};
    use crate::types::Label;

    fn model() -> Arc<FittedModel<GaussianNb>> {
        // rms / mav of calm (code 0) and tense (code 1) windows
        let x = ndarray::array![
            [0.1, 0.1],
            [0.12, 0.09],
            [0.09, 0.11],
            [5.0, 4.0],
            [5.2, 4.1],
            [4.9, 3.9]
        ];
        let mut classifier = GaussianNb::default();
        classifier.fit(x.view(), &[0, 0, 0, 1, 1, 1]).unwrap();
        Arc::new(FittedModel {
            classifier,
            label_mapping: LabelMapping::from_labels(&[Label::from("calm"), Label::from("tense")]),
            feature_columns: vec![0, 1],
        })
    }

    fn predictor(window: f64, step: f64, rate: f64) -> Predictor<GaussianNb> {
        Predictor::new(
            WindowSpec::new(window, step, rate).unwrap(),
            SignalProcessor::emg_only(ChannelConfig::new(PassThrough, WindowFeatures::simple())),
            model(),
        )
    }

    #[test]
    fn emits_on_fill_then_every_step() {
        // 10 samples per window, 3 per step
        let mut predictor = predictor(1.0, 0.3, 10.0);
        let mut emitted = Vec::new();
        for call in 1..=25 {
            let value = if call % 2 == 0 { 5.0 } else { -5.0 };
            if predictor.update(&[value, call as f64]).unwrap().is_some() {
                emitted.push(call);
            }
        }
        assert_eq!(emitted, vec![10, 13, 16, 19, 22, 25]);
        assert_eq!(predictor.n_predictions(), 6);
    }

    #[test]
    fn state_follows_buffer_fill() {
        let mut predictor = predictor(0.5, 0.1, 10.0);
        for call in 0..4 {
            assert_eq!(predictor.update(&[0.1, call as f64]).unwrap(), None);
            assert_eq!(predictor.state(), PredictorState::Filling);
        }
        assert!(predictor.update(&[0.1, 4.0]).unwrap().is_some());
        assert_eq!(predictor.state(), PredictorState::Ready);
    }

    #[test]
    fn classifies_buffer_contents() {
        let mut predictor = predictor(0.4, 0.4, 10.0);
        let mut last = None;
        for call in 0..4 {
            let value = if call % 2 == 0 { 5.0 } else { -5.0 };
            last = predictor.update(&[value, call as f64]).unwrap();
        }
        let prediction = last.unwrap();
        assert_eq!(prediction.code, 1);
        assert_eq!(prediction.probabilities.len(), 2);
        assert!((prediction.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_rows_without_readings() {
        let mut predictor = predictor(0.4, 0.2, 10.0);
        assert!(matches!(predictor.update(&[1.0]), Err(PredictorError::MalformedRow(1))));
        predictor.update(&[1.0, 0.0]).unwrap();
        assert!(matches!(
            predictor.update(&[1.0, 2.0, 0.0]),
            Err(PredictorError::ChannelMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut predictor = predictor(0.2, 0.1, 10.0);
        for call in 0..2 {
            predictor.update(&[1.0, call as f64]).unwrap();
        }
        assert_eq!(predictor.n_predictions(), 1);
        predictor.reset();
        assert_eq!(predictor.state(), PredictorState::Filling);
        assert_eq!(predictor.n_predictions(), 0);
        assert_eq!(predictor.update(&[1.0, 0.0]).unwrap(), None);
        assert!(predictor.update(&[1.0, 1.0]).unwrap().is_some());
    }

    #[test]
    fn shares_the_trainers_model() {
        let model = model();
        let predictor = Predictor::new(
            WindowSpec::new(0.2, 0.1, 10.0).unwrap(),
            SignalProcessor::emg_only(ChannelConfig::new(PassThrough, WindowFeatures::simple())),
            Arc::clone(&model),
        );
        assert!(Arc::ptr_eq(predictor.model(), &model));
    }
}
