use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

/// Probabilistic multi-class classifier over dense feature rows.
///
/// Class indices are the dense codes `0..k-1` the classifier was fitted with;
/// `predict_proba` returns one column per code.
pub trait Classifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize]) -> Result<(), ClassifierError>;

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ClassifierError>;

    fn is_fitted(&self) -> bool;

    /// Same hyperparameters, no fitted state.
    fn unfitted(&self) -> Self
    where
        Self: Sized;

    /// Most probable code per row.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>, ClassifierError> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(row.iter().copied())).collect())
    }
}

/// Index of the largest value, first one on ties.
pub fn argmax(values: impl IntoIterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (index, value) in values.into_iter().enumerate() {
        if value > best_value {
            best = index;
            best_value = value;
        }
    }
    best
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NbParams {
    /// Fraction of the largest feature variance added to every variance.
    pub var_smoothing: f64,
}

impl Default for NbParams {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct NbFitted {
    class_counts: Vec<usize>,
    means: Vec<Vec<f64>>,     // class -> feature
    variances: Vec<Vec<f64>>, // class -> feature
}

/// Gaussian naive Bayes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GaussianNb {
    params: NbParams,
    fitted: Option<NbFitted>,
}

impl GaussianNb {
    pub fn new(params: NbParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn params(&self) -> NbParams {
        self.params
    }

    pub fn n_classes(&self) -> Option<usize> {
        self.fitted.as_ref().map(|fitted| fitted.class_counts.len())
    }

    fn joint_log_likelihood(fitted: &NbFitted, row: &[f64]) -> Vec<f64> {
        let n_samples: usize = fitted.class_counts.iter().sum();
        fitted
            .class_counts
            .iter()
            .zip(fitted.means.iter().zip(&fitted.variances))
            .map(|(&count, (means, variances))| {
                if count == 0 {
                    return f64::NEG_INFINITY;
                }
                let mut total = (count as f64 / n_samples as f64).ln();
                for ((x, mean), var) in row.iter().zip(means).zip(variances) {
                    total -= 0.5 * (2.0 * std::f64::consts::PI * var).ln();
                    total -= (x - mean) * (x - mean) / (2.0 * var);
                }
                total
            })
            .collect()
    }
}

impl Classifier for GaussianNb {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize]) -> Result<(), ClassifierError> {
        if x.nrows() == 0 {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        if x.nrows() != y.len() {
            return Err(ClassifierError::LengthMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        let n_classes = y.iter().max().map(|max| max + 1).unwrap_or(0);
        let mut counts = vec![0usize; n_classes];
        for &code in y {
            counts[code] += 1;
        }
        let present = counts.iter().filter(|&&count| count > 0).count();
        if present < 2 {
            return Err(ClassifierError::TooFewClasses(present));
        }

        let n_features = x.ncols();
        let epsilon = self.params.var_smoothing
            * x.var_axis(Axis(0), 0.0)
                .iter()
                .copied()
                .fold(0.0, f64::max);

        let mut means = vec![vec![0.0; n_features]; n_classes];
        let mut variances = vec![vec![0.0; n_features]; n_classes];
        for (row, &code) in x.rows().into_iter().zip(y) {
            for (sum, value) in means[code].iter_mut().zip(row) {
                *sum += value;
            }
        }
        for (class_means, &count) in means.iter_mut().zip(&counts) {
            for mean in class_means.iter_mut() {
                *mean /= count.max(1) as f64;
            }
        }
        for (row, &code) in x.rows().into_iter().zip(y) {
            for ((sum, value), mean) in variances[code].iter_mut().zip(row).zip(&means[code]) {
                *sum += (value - mean) * (value - mean);
            }
        }
        for (class_vars, &count) in variances.iter_mut().zip(&counts) {
            for var in class_vars.iter_mut() {
                *var = *var / count.max(1) as f64 + epsilon;
                if !(*var > 0.0) {
                    *var = f64::MIN_POSITIVE;
                }
            }
        }
        self.fitted = Some(NbFitted {
            class_counts: counts,
            means,
            variances,
        });
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ClassifierError> {
        let fitted = self.fitted.as_ref().ok_or(ClassifierError::NotFitted)?;
        let expected = fitted.means.first().map(Vec::len).unwrap_or(0);
        if x.ncols() != expected {
            return Err(ClassifierError::FeatureMismatch {
                expected,
                actual: x.ncols(),
            });
        }
        let n_classes = fitted.class_counts.len();
        let mut proba = Array2::zeros((x.nrows(), n_classes));
        for (index, (row, mut out)) in x.rows().into_iter().zip(proba.rows_mut()).enumerate() {
            if row.iter().any(|value| !value.is_finite()) {
                return Err(ClassifierError::NonFinite { row: index });
            }
            let values: Vec<f64> = row.iter().copied().collect();
            let jll = Self::joint_log_likelihood(fitted, &values);
            // log-sum-exp
            let max = jll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = jll.iter().map(|v| (v - max).exp()).sum();
            for (slot, value) in out.iter_mut().zip(&jll) {
                *slot = (value - max).exp() / sum;
            }
        }
        Ok(proba)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn unfitted(&self) -> Self {
        Self::new(self.params)
    }
}
