//! Per-feature standardization

use crate::error::{CryError, Result as CryResult};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance scaler fitted on training rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population std per feature; constant features keep a scale of 1.0
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on row-major samples; every row must have the same width
    pub fn fit(rows: &[Vec<f64>]) -> CryResult<Self> {
        let first = rows
            .first()
            .ok_or_else(|| CryError::TrainingError("cannot fit scaler on zero rows".to_string()))?;
        let dim = first.len();
        if rows.iter().any(|r| r.len() != dim) {
            return Err(CryError::TrainingError(
                "scaler rows have inconsistent widths".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; dim];
        for row in rows {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; dim];
        for row in rows {
            for ((acc, &v), &m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &[f32]) -> CryResult<Vec<f64>> {
        self.check_width(x.len())?;
        Ok(x
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&v, (&m, &s))| (v as f64 - m) / s)
            .collect())
    }

    pub fn transform_f64(&self, x: &[f64]) -> CryResult<Vec<f64>> {
        self.check_width(x.len())?;
        Ok(x
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&v, (&m, &s))| (v - m) / s)
            .collect())
    }

    fn check_width(&self, len: usize) -> CryResult<()> {
        if len != self.n_features() {
            return Err(CryError::InferenceFailed(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_transform() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);
        let z = scaler.transform(&[3.0, 5.0]).unwrap();
        assert_eq!(z, vec![1.0, 0.0]);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = StandardScaler::fit(&[vec![0.0, 1.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&[1.0]),
            Err(CryError::InferenceFailed(_))
        ));
        assert!(StandardScaler::fit(&[]).is_err());
    }
}
