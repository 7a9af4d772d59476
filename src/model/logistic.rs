//! Multinomial logistic regression trained by full-batch gradient descent

use super::Classifier;
use crate::config::LogisticParams;
use crate::error::{CryError, Result as CryResult};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Softmax classifier over standardized features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    /// Sorted class labels; probability vectors follow this order
    pub classes: Vec<String>,
    /// One weight row per class
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl LogisticModel {
    /// Fit on scaled rows with string labels and optional per-sample weights
    pub fn fit(
        rows: &[Vec<f64>],
        labels: &[String],
        sample_weight: Option<&[f64]>,
        params: &LogisticParams,
    ) -> CryResult<Self> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(CryError::TrainingError(format!(
                "need matching non-empty rows and labels ({} vs {})",
                rows.len(),
                labels.len()
            )));
        }
        let classes: Vec<String> = labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if classes.len() < 2 {
            return Err(CryError::TrainingError(format!(
                "need at least two classes, found {:?}",
                classes
            )));
        }

        let n = rows.len();
        let d = rows[0].len();
        let k = classes.len();
        if rows.iter().any(|r| r.len() != d) {
            return Err(CryError::TrainingError(
                "training rows have inconsistent widths".to_string(),
            ));
        }

        let x = Array2::from_shape_fn((n, d), |(i, j)| rows[i][j]);
        let class_idx: Vec<usize> = labels
            .iter()
            .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
            .collect();
        let mut y = Array2::<f64>::zeros((n, k));
        for (i, &c) in class_idx.iter().enumerate() {
            y[[i, c]] = 1.0;
        }

        let mut sw = match sample_weight {
            Some(w) if w.len() == n => Array1::from(w.to_vec()),
            Some(w) => {
                return Err(CryError::TrainingError(format!(
                    "{} sample weights for {} rows",
                    w.len(),
                    n
                )))
            }
            None => Array1::ones(n),
        };
        if params.balanced_classes {
            let mut counts = vec![0usize; k];
            for &c in &class_idx {
                counts[c] += 1;
            }
            for (i, &c) in class_idx.iter().enumerate() {
                sw[i] *= n as f64 / (k as f64 * counts[c] as f64);
            }
        }
        let total_weight = sw.sum();
        if total_weight <= 0.0 {
            return Err(CryError::TrainingError("sample weights sum to zero".to_string()));
        }

        let mut w = Array2::<f64>::zeros((k, d));
        let mut b = Array1::<f64>::zeros(k);

        for _ in 0..params.epochs {
            let mut probs = x.dot(&w.t()) + &b;
            for mut row in probs.axis_iter_mut(Axis(0)) {
                softmax_in_place(row.as_slice_mut().unwrap_or(&mut []));
            }
            let mut err = probs - &y;
            for (mut row, &weight) in err.axis_iter_mut(Axis(0)).zip(sw.iter()) {
                row *= weight;
            }
            let grad_w = err.t().dot(&x) / total_weight + &(&w * params.l2);
            let grad_b = err.sum_axis(Axis(0)) / total_weight;
            w = w - &(grad_w * params.learning_rate);
            b = b - &(grad_b * params.learning_rate);
        }

        Ok(Self {
            classes,
            weights: w.outer_iter().map(|r| r.to_vec()).collect(),
            bias: b.to_vec(),
        })
    }
}

impl Classifier for LogisticModel {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.weights.first().map(|w| w.len()).unwrap_or(0)
    }

    fn predict_proba(&self, x: &[f64]) -> CryResult<Vec<f64>> {
        if x.len() != self.n_features() {
            return Err(CryError::InferenceFailed(format!(
                "model expects {} features, got {}",
                self.n_features(),
                x.len()
            )));
        }
        let mut logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, &b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect();
        softmax_in_place(&mut logits);
        Ok(logits)
    }

    fn validate(&self) -> CryResult<()> {
        let k = self.classes.len();
        if k < 2 {
            return Err(CryError::ModelNotLoaded(format!(
                "logistic model needs at least two classes, has {}",
                k
            )));
        }
        if self.weights.len() != k || self.bias.len() != k {
            return Err(CryError::ModelNotLoaded(format!(
                "logistic model has {} classes but {} weight rows and {} biases",
                k,
                self.weights.len(),
                self.bias.len()
            )));
        }
        let d = self.n_features();
        if d == 0 || self.weights.iter().any(|row| row.len() != d) {
            return Err(CryError::ModelNotLoaded(
                "logistic weight rows are empty or of unequal width".to_string(),
            ));
        }
        if self
            .weights
            .iter()
            .flatten()
            .chain(&self.bias)
            .any(|v| !v.is_finite())
        {
            return Err(CryError::ModelNotLoaded(
                "logistic model has non-finite coefficients".to_string(),
            ));
        }
        Ok(())
    }
}

fn softmax_in_place(logits: &mut [f64]) {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in logits.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        logits.iter_mut().for_each(|v| *v /= sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_separable_binary() {
        let rows = vec![vec![-2.0], vec![-1.5], vec![1.5], vec![2.0]];
        let y = labels(&["no", "no", "yes", "yes"]);
        let model = LogisticModel::fit(&rows, &y, None, &LogisticParams::default()).unwrap();
        assert_eq!(model.classes, labels(&["no", "yes"]));
        let p = model.predict_proba(&[2.0]).unwrap();
        assert!(p[1] > 0.8);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(model.predict(&[-2.0]).unwrap(), "no");
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let rows = vec![vec![-1.0, 0.0], vec![1.0, 0.5]];
        let model = LogisticModel::fit(&rows, &labels(&["a", "b"]), None, &LogisticParams::default())
            .unwrap();
        assert!(model.validate().is_ok());

        let mut ragged = model.clone();
        ragged.weights[1].pop();
        assert!(ragged.validate().is_err());

        let mut short_bias = model.clone();
        short_bias.bias.pop();
        assert!(short_bias.validate().is_err());

        let mut extra_class = model;
        extra_class.classes.push("c".to_string());
        assert!(extra_class.validate().is_err());
    }

    #[test]
    fn test_single_class_rejected() {
        let rows = vec![vec![0.0], vec![1.0]];
        let y = labels(&["a", "a"]);
        assert!(LogisticModel::fit(&rows, &y, None, &LogisticParams::default()).is_err());
    }

    #[test]
    fn test_deterministic() {
        let rows = vec![vec![0.1, 1.0], vec![0.9, -1.0], vec![0.5, 0.2]];
        let y = labels(&["a", "b", "c"]);
        let p = LogisticParams::default();
        let a = LogisticModel::fit(&rows, &y, None, &p).unwrap();
        let b = LogisticModel::fit(&rows, &y, None, &p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_weight_shifts_boundary() {
        let rows = vec![vec![0.0], vec![0.0], vec![1.0], vec![1.0]];
        let y = labels(&["neg", "pos", "neg", "pos"]);
        let params = LogisticParams::default();
        let weighted = LogisticModel::fit(&rows, &y, Some(&[1.0, 3.0, 1.0, 3.0]), &params).unwrap();
        let p = weighted.predict_proba(&[0.5]).unwrap();
        assert!(p[1] > 0.6);
    }
}
