use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, TrainerError};
use crate::ml::classifier::Classifier;
use crate::ml::persistence::{ExperimentStore, TrainerSnapshot};
use crate::ml::validation::{self, StratifiedGroupKFold};
use crate::ml::PersistentClassifier;
use crate::processing::{build_dataset, Dataset, LabelMapping, SampleTable, SignalProcessor, WindowSpec};
use crate::types::Label;

/// Classifier frozen by a successful `train()`, with everything prediction needs
/// to line up with the training feature space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedModel<C> {
    pub classifier: C,
    pub label_mapping: LabelMapping,
    /// Raw feature columns kept after the non-finite column drop.
    pub feature_columns: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct TrainerOptions {
    /// Diagnostic cross-validation before fitting; `None` disables it.
    pub cross_validation: Option<StratifiedGroupKFold>,
    pub ignore_labels: Vec<Label>,
    pub store: ExperimentStore,
    /// Save an experiment right after every successful `train()`.
    pub save_after_training: bool,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            cross_validation: None,
            ignore_labels: Vec::new(),
            store: ExperimentStore::new("./experiments"),
            save_after_training: false,
        }
    }
}

/// Human-readable summary of the trainer, written next to every saved experiment.
#[derive(Clone, Debug, Serialize)]
pub struct TrainerMetadata {
    pub sampling_rate: f64,
    pub window_size: f64,
    pub step_size: f64,
    pub label_mapping: Option<BTreeMap<usize, Label>>,
    #[serde(flatten)]
    pub data: Option<DataSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DataSummary {
    pub shape: (usize, usize),
    pub labels: Vec<Label>,
    pub n_groups: usize,
    pub n_groups_by_label: BTreeMap<String, usize>,
}

/// Accumulates labelled rows in trial groups and fits the classifier on demand.
#[derive(Debug)]
pub struct Trainer<C> {
    spec: WindowSpec,
    processor: SignalProcessor,
    options: TrainerOptions,
    // hyperparameter template, never fitted
    classifier: C,
    model: Option<Arc<FittedModel<C>>>,
    label_mapping: Option<LabelMapping>,
    table: SampleTable,
    group: u32,
    steps: usize,
    training: bool,
}

impl<C: PersistentClassifier> Trainer<C> {
    pub fn new(spec: WindowSpec, processor: SignalProcessor, classifier: C, options: TrainerOptions) -> Self {
        Self {
            spec,
            processor,
            options,
            classifier: classifier.unfitted(),
            model: None,
            label_mapping: None,
            table: SampleTable::new(),
            group: 0,
            steps: 0,
            training: true,
        }
    }

    /// Rebuilds a trainer exactly as it was saved.
    pub fn from_snapshot(
        snapshot: TrainerSnapshot<C>,
        processor: SignalProcessor,
        options: TrainerOptions,
    ) -> Result<Self, PersistenceError> {
        let window = snapshot.window;
        let spec = WindowSpec::new(window.window_size(), window.step_size(), window.sampling_rate())?;
        snapshot.table.validate()?;
        if !snapshot.training && snapshot.model.is_none() {
            return Err(PersistenceError::MissingModel);
        }
        let model = if snapshot.training {
            None
        } else {
            snapshot.model.map(Arc::new)
        };
        info!(
            "Restored trainer with {} rows in {} groups (training: {})",
            snapshot.table.len(),
            snapshot.table.n_groups(),
            snapshot.training
        );
        Ok(Self {
            spec,
            processor,
            options,
            classifier: snapshot.classifier.unfitted(),
            model,
            label_mapping: snapshot.label_mapping,
            table: snapshot.table,
            group: snapshot.group,
            steps: snapshot.steps,
            training: snapshot.training,
        })
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    pub fn processor(&self) -> &SignalProcessor {
        &self.processor
    }

    pub fn table(&self) -> &SampleTable {
        &self.table
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    /// Rows collected since the last group switch.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn label_mapping(&self) -> Option<&LabelMapping> {
        self.label_mapping.as_ref()
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// The fitted model, shared with any predictor built from it.
    pub fn model(&self) -> Option<Arc<FittedModel<C>>> {
        self.model.clone()
    }

    pub fn store(&self) -> &ExperimentStore {
        &self.options.store
    }

    /// Appends `rows` (channels plus trailing timestamp) under `label` and the current group.
    pub fn update(&mut self, rows: ArrayView2<f64>, label: &Label) -> Result<(), TrainerError> {
        if !self.training {
            return Err(TrainerError::NotTraining);
        }
        if label.is_empty() {
            return Err(TrainerError::EmptyLabel);
        }
        self.table.append(rows, label, self.group)?;
        self.steps += rows.nrows();
        Ok(())
    }

    /// Closes the current trial.
    pub fn switch_group(&mut self) {
        self.group += 1;
        self.steps = 0;
    }

    pub fn build_dataset(&self) -> Result<Dataset, TrainerError> {
        if self.table.is_empty() {
            return Err(TrainerError::NoData);
        }
        let dataset = build_dataset(&self.processor, &self.table, &self.spec, &self.options.ignore_labels)?;
        if dataset.is_empty() {
            return Err(TrainerError::NoWindows);
        }
        Ok(dataset)
    }

    /// Builds the dataset, fits a fresh classifier and leaves training mode.
    ///
    /// Either the fit succeeds and the trainer holds the model with `training == false`,
    /// or nothing changes.
    pub fn train(&mut self) -> Result<Arc<FittedModel<C>>, TrainerError> {
        if !self.training {
            return Err(TrainerError::NotTraining);
        }
        let dataset = self.build_dataset()?;
        warn_single_group_labels(&dataset);
        if let Some(cv) = &self.options.cross_validation {
            self.cross_validate(cv, &dataset);
        }

        let mut classifier = self.classifier.unfitted();
        classifier.fit(dataset.x.view(), &dataset.y)?;
        let model = Arc::new(FittedModel {
            classifier,
            label_mapping: dataset.label_mapping.clone(),
            feature_columns: dataset.feature_columns,
        });
        self.model = Some(Arc::clone(&model));
        self.label_mapping = Some(dataset.label_mapping);
        self.training = false;
        info!("Training completed.");

        if self.options.save_after_training {
            if let Err(err) = self.save() {
                error!("Error saving: {err}");
            }
        }
        Ok(model)
    }

    fn cross_validate(&self, cv: &StratifiedGroupKFold, dataset: &Dataset) {
        let Some(folds) = cv.split(&dataset.y, &dataset.groups) else {
            warn!(
                "Skipping cross-validation: fewer than {} distinct groups",
                cv.n_splits()
            );
            return;
        };
        info!("Performing cross-validation...");
        match validation::cross_val_accuracy(&self.classifier, dataset, &folds) {
            Ok(scores) => {
                let (mean, std) = validation::summarize(&scores);
                info!("Cross-validation completed - Mean: {mean:.5} (±{std:.5})");
                info!("All CV scores: {scores:.5?}");
            }
            Err(err) => warn!("Cross-validation failed: {err}"),
        }
    }

    /// Writes the next numbered experiment. `Ok(None)` when there is nothing to save.
    pub fn save(&self) -> Result<Option<PathBuf>, PersistenceError> {
        self.options.store.save(self)
    }

    /// Back to training mode, keeping the collected data.
    pub fn reset_model(&mut self) {
        self.model = None;
        self.training = true;
    }

    /// Drops all collected data and any fitted state.
    pub fn reset(&mut self) {
        self.table = SampleTable::new();
        self.label_mapping = None;
        self.group = 0;
        self.steps = 0;
        self.model = None;
        self.training = true;
    }

    pub fn metadata(&self) -> TrainerMetadata {
        let data = (!self.table.is_empty()).then(|| DataSummary {
            shape: self.table.shape(),
            labels: self.table.distinct_labels(),
            n_groups: self.table.n_groups(),
            n_groups_by_label: self
                .table
                .groups_per_label()
                .into_iter()
                .map(|(label, groups)| (label.to_string(), groups))
                .collect(),
        });
        TrainerMetadata {
            sampling_rate: self.spec.sampling_rate(),
            window_size: self.spec.window_size(),
            step_size: self.spec.step_size(),
            label_mapping: self.label_mapping.as_ref().map(|mapping| {
                mapping
                    .iter()
                    .map(|(code, label)| (code, label.clone()))
                    .collect()
            }),
            data,
            classifier: self
                .model
                .as_ref()
                .map(|model| format!("{:?}", model.classifier.unfitted())),
        }
    }
}

fn warn_single_group_labels(dataset: &Dataset) {
    let mut groups_by_code: BTreeMap<usize, BTreeSet<u32>> = BTreeMap::new();
    for (&code, &group) in dataset.y.iter().zip(&dataset.groups) {
        groups_by_code.entry(code).or_default().insert(group);
    }
    if groups_by_code.values().any(|groups| groups.len() == 1) {
        warn!(
            "At least one label has a single group; cross-validation folds may be \
             unevenly distributed for it"
        );
    }
}
