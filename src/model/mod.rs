//! Stage classifiers and their scalers
//!
//! Every stage of the cascade pairs a [`Classifier`] with the [`StandardScaler`] fitted on
//! that stage's training rows. A stage may instead borrow another stage's scaler through
//! [`ScalerSlot::MissingFallbackTo`].

pub mod logistic;
pub mod scaler;

pub use logistic::LogisticModel;
pub use scaler::StandardScaler;

use crate::error::{CryError, Result as CryResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Probabilistic classifier over a scaled feature row
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Class labels in the order `predict_proba` reports them
    fn classes(&self) -> &[String];

    /// Expected input width
    fn n_features(&self) -> usize;

    /// One probability per class, summing to 1
    fn predict_proba(&self, x: &[f64]) -> CryResult<Vec<f64>>;

    /// Check internal shapes once, before the classifier serves predictions
    fn validate(&self) -> CryResult<()> {
        Ok(())
    }

    /// Most probable class label
    fn predict(&self, x: &[f64]) -> CryResult<String> {
        let probs = self.predict_proba(x)?;
        let best = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .ok_or_else(|| CryError::InferenceFailed("classifier has no classes".to_string()))?;
        self.classes()
            .get(best)
            .cloned()
            .ok_or_else(|| CryError::InferenceFailed("class index out of range".to_string()))
    }
}

/// Cascade stage identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Detector,
    PrimaryPain,
    Cascade,
    NonPain,
}

impl StageId {
    pub fn name(&self) -> &'static str {
        match self {
            StageId::Detector => "detector",
            StageId::PrimaryPain => "primary_pain",
            StageId::Cascade => "cascade",
            StageId::NonPain => "nonpain",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scaler owned by a stage, or a pointer to the stage whose scaler it reuses
#[derive(Debug, Clone)]
pub enum ScalerSlot {
    Present(StandardScaler),
    MissingFallbackTo(StageId),
}

/// Trained classifier plus its scaler
#[derive(Debug, Clone)]
pub struct StageModel {
    pub id: StageId,
    pub classifier: Arc<dyn Classifier>,
    pub scaler: ScalerSlot,
}

impl StageModel {
    pub fn new(id: StageId, classifier: Arc<dyn Classifier>, scaler: StandardScaler) -> Self {
        Self {
            id,
            classifier,
            scaler: ScalerSlot::Present(scaler),
        }
    }

    /// Stage without its own scaler, reusing `fallback`'s at inference
    pub fn with_fallback(id: StageId, classifier: Arc<dyn Classifier>, fallback: StageId) -> Self {
        Self {
            id,
            classifier,
            scaler: ScalerSlot::MissingFallbackTo(fallback),
        }
    }

    pub fn own_scaler(&self) -> Option<&StandardScaler> {
        match &self.scaler {
            ScalerSlot::Present(s) => Some(s),
            ScalerSlot::MissingFallbackTo(_) => None,
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classifier.classes().iter().any(|c| c == class)
    }

    /// Class -> probability for an already scaled row
    pub fn predict_proba(&self, scaled: &[f64]) -> CryResult<BTreeMap<String, f64>> {
        let probs = self.classifier.predict_proba(scaled)?;
        let classes = self.classifier.classes();
        if probs.len() != classes.len() {
            return Err(CryError::InferenceFailed(format!(
                "{} stage returned {} probabilities for {} classes",
                self.id,
                probs.len(),
                classes.len()
            )));
        }
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(CryError::InferenceFailed(format!(
                "{} stage returned a non-finite probability",
                self.id
            )));
        }
        Ok(classes.iter().cloned().zip(probs).collect())
    }

    /// Probability of one named class in a map returned by [`predict_proba`](Self::predict_proba)
    pub fn probability_in(&self, probs: &BTreeMap<String, f64>, class: &str) -> CryResult<f64> {
        probs.get(class).copied().ok_or_else(|| {
            CryError::InferenceFailed(format!("{} stage has no '{}' class", self.id, class))
        })
    }
}
