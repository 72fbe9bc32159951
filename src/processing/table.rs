use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use ndarray::{ArrayView2, ShapeError};
use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::types::Label;

/// Append-only record of labelled rows, in arrival order.
///
/// Every row is `n_channels` readings plus a timestamp, tagged with the label and
/// group that were current when it arrived.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    n_channels: usize,
    // row-major [rows, n_channels]
    #[serde(with = "readings")]
    signals: Vec<f64>,
    #[serde(with = "readings")]
    timestamps: Vec<f64>,
    labels: Vec<Label>,
    groups: Vec<u32>,
}

impl SampleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// `(rows, columns)` counting channels, timestamp, label and group.
    pub fn shape(&self) -> (usize, usize) {
        if self.is_empty() {
            (0, 0)
        } else {
            (self.len(), self.n_channels + 3)
        }
    }

    /// Appends raw rows whose last column is the timestamp.
    pub fn append(&mut self, rows: ArrayView2<f64>, label: &Label, group: u32) -> Result<(), TableError> {
        let width = rows.ncols();
        if width < 2 {
            return Err(TableError::TooFewColumns(width));
        }
        let channels = width - 1;
        if self.is_empty() {
            self.n_channels = channels;
        } else if channels != self.n_channels {
            return Err(TableError::ColumnMismatch {
                expected: self.n_channels + 1,
                actual: width,
            });
        }
        self.signals.reserve(rows.nrows() * channels);
        for row in rows.rows() {
            self.signals.extend(row.iter().take(channels));
            self.timestamps.push(row[channels]);
            self.labels.push(label.clone());
            self.groups.push(group);
        }
        Ok(())
    }

    /// Signal columns only: everything except timestamp, label and group.
    pub fn signals(&self) -> Result<ArrayView2<'_, f64>, ShapeError> {
        ArrayView2::from_shape((self.len(), self.n_channels), &self.signals)
    }

    /// Checks the column vectors agree after deserialization and that group ids
    /// never decrease.
    pub fn validate(&self) -> Result<(), TableError> {
        let rows = self.len();
        if self.labels.len() != rows
            || self.groups.len() != rows
            || self.signals.len() != rows * self.n_channels
        {
            return Err(TableError::Corrupt { rows });
        }
        if let Some(row) = self.groups.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(TableError::GroupOrder { row: row + 1 });
        }
        Ok(())
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn groups(&self) -> &[u32] {
        &self.groups
    }

    /// Distinct labels in first-seen order.
    pub fn distinct_labels(&self) -> Vec<Label> {
        let mut seen = BTreeSet::new();
        self.labels
            .iter()
            .filter(|label| seen.insert(*label))
            .cloned()
            .collect()
    }

    pub fn n_groups(&self) -> usize {
        self.groups.iter().collect::<BTreeSet<_>>().len()
    }

    /// Number of distinct groups each label was collected in.
    pub fn groups_per_label(&self) -> BTreeMap<Label, usize> {
        let mut sets: BTreeMap<&Label, BTreeSet<u32>> = BTreeMap::new();
        for (label, group) in self.labels.iter().zip(&self.groups) {
            sets.entry(label).or_default().insert(*group);
        }
        sets.into_iter()
            .map(|(label, groups)| (label.clone(), groups.len()))
            .collect()
    }

    /// CSV with a header: channel columns, timestamp, label, group.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let mut header: Vec<String> = (1..=self.n_channels).map(|i| format!("EBR_{i}")).collect();
        header.extend(["TIMESTAMP".to_owned(), "label".to_owned(), "group".to_owned()]);
        writeln!(writer, "{}", header.join(","))?;
        let rows = self.signals.chunks(self.n_channels.max(1));
        for (index, row) in rows.enumerate() {
            for value in row {
                write!(writer, "{value},")?;
            }
            writeln!(
                writer,
                "{},{},{}",
                self.timestamps[index],
                csv_field(&self.labels[index].to_string()),
                self.groups[index]
            )?;
        }
        writer.flush()
    }
}

fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}

/// JSON has no NaN or infinity, so non-finite readings are stored as strings.
mod readings {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Reading {
        Number(f64),
        Text(String),
    }

    fn encode(value: f64) -> Reading {
        if value.is_finite() {
            Reading::Number(value)
        } else if value.is_nan() {
            Reading::Text("NaN".to_owned())
        } else if value > 0.0 {
            Reading::Text("inf".to_owned())
        } else {
            Reading::Text("-inf".to_owned())
        }
    }

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&value| encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Reading>::deserialize(deserializer)?
            .into_iter()
            .map(|reading| match reading {
                Reading::Number(value) => Ok(value),
                Reading::Text(text) => match text.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(D::Error::custom(format!("invalid reading {other:?}"))),
                },
            })
            .collect()
    }
}
