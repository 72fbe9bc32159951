use log::info;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ProcessingError;
use crate::processing::{SampleTable, SignalProcessor, WindowSpec};
use crate::types::Label;

/// Dense code <-> label bijection, codes `0..k-1` in sorted label order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMapping {
    labels: Vec<Label>,
}

impl LabelMapping {
    /// Sorts and deduplicates the given labels.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a Label>) -> Self {
        let mut labels: Vec<Label> = labels.into_iter().cloned().collect();
        labels.sort();
        labels.dedup();
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, code: usize) -> Option<&Label> {
        self.labels.get(code)
    }

    pub fn code(&self, label: &Label) -> Option<usize> {
        self.labels.binary_search(label).ok()
    }

    /// `(code, label)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Label)> {
        self.labels.iter().enumerate()
    }
}

/// Supervised dataset: one row per window.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Vec<usize>,
    pub groups: Vec<u32>,
    pub label_mapping: LabelMapping,
    /// Columns of the raw feature matrix that survived the non-finite drop.
    pub feature_columns: Vec<usize>,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Builds the windowed, encoded dataset from an accumulated table.
///
/// Feature columns that are non-finite in any window are dropped for the whole
/// dataset; windows whose center label is in `ignore_labels` are dropped afterwards.
pub fn build_dataset(
    processor: &SignalProcessor,
    table: &SampleTable,
    spec: &WindowSpec,
    ignore_labels: &[Label],
) -> Result<Dataset, ProcessingError> {
    if table.is_empty() {
        return Err(ProcessingError::EmptyTable);
    }
    info!("Building dataset from shape {:?}", table.shape());

    let features = processor.process(table.signals()?, spec)?;
    let (labels, groups) = processor.align_labels_and_groups(table.labels(), table.groups(), spec);
    if labels.len() != features.nrows() {
        return Err(ProcessingError::WindowCountMismatch {
            expected: labels.len(),
            actual: features.nrows(),
        });
    }

    let feature_columns: Vec<usize> = features
        .axis_iter(Axis(1))
        .enumerate()
        .filter(|(_, column)| column.iter().all(|v| v.is_finite()))
        .map(|(index, _)| index)
        .collect();

    let kept_rows: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, label)| !ignore_labels.contains(label))
        .map(|(index, _)| index)
        .collect();

    let x = features
        .select(Axis(1), &feature_columns)
        .select(Axis(0), &kept_rows);
    let kept_labels: Vec<&Label> = kept_rows.iter().map(|&row| &labels[row]).collect();
    let label_mapping = LabelMapping::from_labels(kept_labels.iter().copied());
    let y = kept_labels
        .iter()
        .filter_map(|label| label_mapping.code(label))
        .collect();
    let groups = kept_rows.iter().map(|&row| groups[row]).collect();

    info!("Final dataset shape: {:?}", x.dim());
    info!(
        "Label mapping: {{{}}}",
        label_mapping
            .iter()
            .map(|(code, label)| format!("{code}: {label}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(Dataset {
        x,
        y,
        groups,
        label_mapping,
        feature_columns,
    })
}
