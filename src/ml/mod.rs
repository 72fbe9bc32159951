// src/ml/mod.rs
// 分类器、交叉验证、训练器、实时预测器与实验存档
pub mod classifier;
pub mod persistence;
pub mod predictor;
pub mod trainer;
pub mod validation;

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use classifier::{argmax, Classifier, GaussianNb, NbParams};
pub use persistence::{ExperimentStore, TrainerSnapshot};
pub use predictor::{Prediction, Predictor, PredictorState};
pub use trainer::{FittedModel, Trainer, TrainerMetadata, TrainerOptions};
pub use validation::{cross_val_accuracy, Fold, StratifiedGroupKFold};

/// A classifier that can be shared across threads and stored in an experiment.
pub trait PersistentClassifier:
    Classifier + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> PersistentClassifier for T where
    T: Classifier + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}
