//! Group-aware stratified cross-validation, used only as a training diagnostic.
use std::collections::BTreeMap;

use ndarray::Axis;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ClassifierError, ConfigError};
use crate::ml::classifier::Classifier;
use crate::processing::Dataset;

/// Row indices of one train/test split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// K folds where no group spans two folds and class proportions stay close to
/// the overall ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StratifiedGroupKFold {
    n_splits: usize,
    seed: u64,
}

impl StratifiedGroupKFold {
    pub fn new(n_splits: usize, seed: u64) -> Result<Self, ConfigError> {
        if n_splits < 2 {
            return Err(ConfigError::InvalidSplits(n_splits));
        }
        Ok(Self { n_splits, seed })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// `None` when there are fewer distinct groups than splits.
    pub fn split(&self, y: &[usize], groups: &[u32]) -> Option<Vec<Fold>> {
        let n_classes = y.iter().max().map(|max| max + 1).unwrap_or(0);
        let mut per_group: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (&group, &code) in groups.iter().zip(y) {
            per_group
                .entry(group)
                .or_insert_with(|| vec![0; n_classes])[code] += 1;
        }
        if per_group.len() < self.n_splits {
            return None;
        }

        let mut class_totals = vec![0usize; n_classes];
        for &code in y {
            class_totals[code] += 1;
        }

        let mut order: Vec<(u32, Vec<usize>)> = per_group.into_iter().collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);
        // groups with the most lopsided class mix are placed first
        order.sort_by(|a, b| spread(&b.1).total_cmp(&spread(&a.1)));

        let mut fold_counts = vec![vec![0usize; n_classes]; self.n_splits];
        let mut fold_of_group: BTreeMap<u32, usize> = BTreeMap::new();
        for (group, counts) in &order {
            let mut best_fold = 0;
            let mut best_cost = f64::INFINITY;
            let mut best_size = usize::MAX;
            for fold in 0..self.n_splits {
                for (slot, count) in fold_counts[fold].iter_mut().zip(counts) {
                    *slot += count;
                }
                let cost = imbalance(&fold_counts, &class_totals);
                for (slot, count) in fold_counts[fold].iter_mut().zip(counts) {
                    *slot -= count;
                }
                let size: usize = fold_counts[fold].iter().sum();
                if cost < best_cost || (cost == best_cost && size < best_size) {
                    best_fold = fold;
                    best_cost = cost;
                    best_size = size;
                }
            }
            for (slot, count) in fold_counts[best_fold].iter_mut().zip(counts) {
                *slot += count;
            }
            fold_of_group.insert(*group, best_fold);
        }

        let folds = (0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) = (0..groups.len())
                    .partition(|&row| fold_of_group.get(&groups[row]) == Some(&fold));
                Fold { train, test }
            })
            .collect();
        Some(folds)
    }
}

/// Population standard deviation of a group's class distribution.
fn spread(counts: &[usize]) -> f64 {
    std_dev(counts.iter().map(|&count| count as f64))
}

/// Mean over classes of the spread of that class's share across folds.
fn imbalance(fold_counts: &[Vec<usize>], class_totals: &[usize]) -> f64 {
    let n_classes = class_totals.len();
    if n_classes == 0 {
        return 0.0;
    }
    let total: f64 = (0..n_classes)
        .map(|class| {
            let denominator = class_totals[class].max(1) as f64;
            std_dev(fold_counts.iter().map(|fold| fold[class] as f64 / denominator))
        })
        .sum();
    total / n_classes as f64
}

fn std_dev(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count();
    if n == 0 {
        return 0.0;
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    (values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64).sqrt()
}

/// Fits an unfitted copy of `classifier` per fold and returns argmax accuracy per fold.
///
/// Folds whose training part holds a single class are scored by predicting that class.
pub fn cross_val_accuracy<C: Classifier>(
    classifier: &C,
    dataset: &Dataset,
    folds: &[Fold],
) -> Result<Vec<f64>, ClassifierError> {
    let mut scores = Vec::with_capacity(folds.len());
    for fold in folds {
        if fold.test.is_empty() {
            continue;
        }
        let train_x = dataset.x.select(Axis(0), &fold.train);
        let train_y: Vec<usize> = fold.train.iter().map(|&row| dataset.y[row]).collect();
        let test_x = dataset.x.select(Axis(0), &fold.test);

        let predicted = match single_class(&train_y) {
            Some(code) => vec![code; fold.test.len()],
            None => {
                let mut model = classifier.unfitted();
                model.fit(train_x.view(), &train_y)?;
                model.predict(test_x.view())?
            }
        };
        let correct = fold
            .test
            .iter()
            .zip(&predicted)
            .filter(|&(&row, &code)| dataset.y[row] == code)
            .count();
        scores.push(correct as f64 / fold.test.len() as f64);
    }
    Ok(scores)
}

fn single_class(y: &[usize]) -> Option<usize> {
    let first = *y.first()?;
    y.iter().all(|&code| code == first).then_some(first)
}

/// Mean and population standard deviation of fold scores.
pub fn summarize(scores: &[f64]) -> (f64, f64) {
    if scores.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean, std_dev(scores.iter().copied()))
}
