//! Numbered experiment directories under a base directory.
//!
//! Every save creates `<base>/<n>/` holding `signal_data.csv`, `metadata.json` and
//! `trainer.json`, where `n` is one more than the highest numeric entry already there.
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::ml::trainer::{FittedModel, Trainer};
use crate::ml::PersistentClassifier;
use crate::processing::{LabelMapping, SampleTable, WindowSpec};

const SIGNAL_FILE: &str = "signal_data.csv";
const METADATA_FILE: &str = "metadata.json";
const TRAINER_FILE: &str = "trainer.json";

/// Everything needed to rebuild a [`Trainer`], minus the signal processor.
#[derive(Debug, Deserialize)]
pub struct TrainerSnapshot<C> {
    pub window: WindowSpec,
    pub table: SampleTable,
    pub group: u32,
    pub steps: usize,
    pub training: bool,
    pub label_mapping: Option<LabelMapping>,
    pub classifier: C,
    pub model: Option<FittedModel<C>>,
}

// borrowed twin of TrainerSnapshot for writing
#[derive(Serialize)]
struct SnapshotRef<'a, C> {
    window: &'a WindowSpec,
    table: &'a SampleTable,
    group: u32,
    steps: usize,
    training: bool,
    label_mapping: Option<&'a LabelMapping>,
    classifier: &'a C,
    model: Option<&'a FittedModel<C>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExperimentStore {
    base_dir: PathBuf,
}

impl ExperimentStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Next free numbered directory, not yet created.
    pub fn next_experiment_dir(&self) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.base_dir)?;
        let mut highest: Option<u64> = None;
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if let Some(number) = entry.file_name().to_str().and_then(|name| name.parse::<u64>().ok()) {
                highest = Some(highest.map_or(number, |current| current.max(number)));
            }
        }
        let next = highest.map_or(0, |number| number + 1);
        Ok(self.base_dir.join(next.to_string()))
    }

    /// Writes a new experiment for `trainer`. Returns `Ok(None)` when no data was collected.
    pub fn save<C: PersistentClassifier>(&self, trainer: &Trainer<C>) -> Result<Option<PathBuf>, PersistenceError> {
        if trainer.table().is_empty() {
            warn!("Model was not saved because no data has been collected");
            return Ok(None);
        }
        let dir = self.next_experiment_dir()?;
        fs::create_dir(&dir)?;

        trainer
            .table()
            .write_csv(BufWriter::new(File::create(dir.join(SIGNAL_FILE))?))?;

        let metadata = BufWriter::new(File::create(dir.join(METADATA_FILE))?);
        serde_json::to_writer_pretty(metadata, &trainer.metadata())?;

        let model = trainer.model();
        let snapshot = SnapshotRef {
            window: trainer.spec(),
            table: trainer.table(),
            group: trainer.group(),
            steps: trainer.steps(),
            training: trainer.is_training(),
            label_mapping: trainer.label_mapping(),
            classifier: trainer.classifier(),
            model: model.as_deref(),
        };
        let snapshot_file = BufWriter::new(File::create(dir.join(TRAINER_FILE))?);
        serde_json::to_writer(snapshot_file, &snapshot)?;

        info!("Model saved to: {}", dir.display());
        Ok(Some(dir))
    }

    /// Reads a snapshot from an experiment directory or a `trainer.json` path.
    pub fn load<C: DeserializeOwned>(path: impl AsRef<Path>) -> Result<TrainerSnapshot<C>, PersistenceError> {
        let path = path.as_ref();
        let file_path = if path.is_dir() {
            path.join(TRAINER_FILE)
        } else {
            path.to_path_buf()
        };
        let reader = std::io::BufReader::new(File::open(&file_path)?);
        let snapshot = serde_json::from_reader(reader)?;
        info!("Loaded trainer snapshot from {}", file_path.display());
        Ok(snapshot)
    }
}
