//! Offline training of every cascade stage plus threshold calibration

use super::dataset::{build_dataset, discover, Dataset};
use super::evaluate::{accuracy, evaluate_labels, SensitivityMetrics};
use super::split::{oversample_minority, stratified_split};
use crate::bundle::{artifact_path, suffix, ModelBundle, CRY, NON_PAIN, NOT_CRY, PAIN};
use crate::calibration::ThresholdCalibrator;
use crate::config::{validate_config, Config, LogisticParams};
use crate::error::{CryError, Result as CryResult};
use crate::model::{Classifier, LogisticModel, StageId, StageModel, StandardScaler};
use crate::predictor::{CascadePredictor, NEEDS_ATTENTION};
use crate::thresholds::{Sensitivity, Thresholds};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A fitted classifier with the scaler fitted on the same rows
#[derive(Debug, Clone)]
pub struct TrainedStage {
    pub model: LogisticModel,
    pub scaler: StandardScaler,
}

impl TrainedStage {
    fn into_stage(self, id: StageId) -> StageModel {
        StageModel::new(id, Arc::new(self.model), self.scaler)
    }

    fn proba_of(&self, row: &[f64], class: &str) -> CryResult<f64> {
        let scaled = self.scaler.transform_f64(row)?;
        let probs = self.model.predict_proba(&scaled)?;
        self.model
            .classes
            .iter()
            .position(|c| c == class)
            .map(|i| probs[i])
            .ok_or_else(|| CryError::TrainingError(format!("model has no '{}' class", class)))
    }

    fn predict(&self, row: &[f64]) -> CryResult<String> {
        let scaled = self.scaler.transform_f64(row)?;
        self.model.predict(&scaled)
    }
}

/// Everything a bundle needs, straight out of training
#[derive(Debug, Clone)]
pub struct TrainedStages {
    pub detector: TrainedStage,
    pub primary_pain: TrainedStage,
    pub cascade: Option<TrainedStage>,
    pub nonpain: Option<TrainedStage>,
    pub thresholds: Thresholds,
}

impl TrainedStages {
    /// In-memory bundle over clones of the trained stages
    pub fn to_bundle(&self) -> CryResult<ModelBundle> {
        ModelBundle::new(
            self.detector.clone().into_stage(StageId::Detector),
            self.primary_pain.clone().into_stage(StageId::PrimaryPain),
            self.cascade.clone().map(|s| s.into_stage(StageId::Cascade)),
            self.nonpain.clone().map(|s| s.into_stage(StageId::NonPain)),
            self.thresholds,
        )
    }

    /// Write the artifact set under `prefix`, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, prefix: P) -> CryResult<Vec<PathBuf>> {
        let prefix = prefix.as_ref();
        if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CryError::ArtifactError(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let mut written = Vec::new();
        let mut stages = vec![
            (&self.detector, suffix::DETECTOR, suffix::SCALER_DETECTOR),
            (&self.primary_pain, suffix::PRIMARY, suffix::SCALER_PRIMARY),
        ];
        if let Some(cascade) = &self.cascade {
            stages.push((cascade, suffix::CASCADE, suffix::SCALER_CASCADE));
        }
        if let Some(nonpain) = &self.nonpain {
            stages.push((nonpain, suffix::NONPAIN, suffix::SCALER_NONPAIN));
        }
        for (stage, model_suffix, scaler_suffix) in stages {
            written.push(write_json(&artifact_path(prefix, model_suffix), &stage.model)?);
            written.push(write_json(&artifact_path(prefix, scaler_suffix), &stage.scaler)?);
        }
        written.push(write_json(
            &artifact_path(prefix, suffix::THRESHOLDS),
            &self.thresholds,
        )?);

        info!("Saved {} artifacts under {}*", written.len(), prefix.display());
        Ok(written)
    }
}

/// Summary of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub n_samples: usize,
    pub n_cry: usize,
    pub n_features: usize,
    pub skipped_files: usize,
    pub detector_accuracy: f64,
    pub primary_test_rows: usize,
    /// Stage-1 test rows at or above the primary cut
    pub cascade_candidates: usize,
    pub cascade_trained: bool,
    pub nonpain_accuracy: Option<f64>,
    pub thresholds: Thresholds,
    /// Metrics per sensitivity name
    pub evaluation: BTreeMap<String, SensitivityMetrics>,
}

/// Trains all stages from a dataset with one configuration
#[derive(Debug, Clone)]
pub struct Trainer {
    config: Config,
}

impl Trainer {
    /// Validate `config` and build a trainer around it
    pub fn new(config: Config) -> CryResult<Self> {
        validate_config(&config)?;
        Ok(Self { config })
    }

    /// Discover, extract and train from a dataset directory
    pub fn train_from_dir<P: AsRef<Path>>(&self, root: P) -> CryResult<(TrainedStages, TrainingReport)> {
        let clips = discover(root, &self.config)?;
        let dataset = build_dataset(&clips, &self.config)?;
        self.train(&dataset)
    }

    /// Train every stage from extracted features
    pub fn train(&self, dataset: &Dataset) -> CryResult<(TrainedStages, TrainingReport)> {
        let t = &self.config.training;
        let pain_category = self.config.dataset.pain_category.as_str();
        let cry_positions = dataset.cry_indices();
        if cry_positions.is_empty() || cry_positions.len() == dataset.len() {
            return Err(CryError::TrainingError(
                "dataset needs both cry and not_cry clips".to_string(),
            ));
        }
        let nonpain_categories: BTreeSet<&str> = cry_positions
            .iter()
            .map(|&i| dataset.categories[i].as_str())
            .filter(|c| *c != pain_category)
            .collect();
        if nonpain_categories.len() < 2 && self.config.bundle.require_nonpain_categorizer {
            return Err(CryError::TrainingError(format!(
                "the non-pain categorizer needs at least two non-pain categories (found {:?}); \
                 set bundle.require_nonpain_categorizer = false to train without it",
                nonpain_categories
            )));
        }

        // Detector over every clip
        info!("Training cry detector on {} clips", dataset.len());
        let binary: Vec<String> = (0..dataset.len())
            .map(|i| (if dataset.is_cry(i) { CRY } else { NOT_CRY }).to_string())
            .collect();
        let (train, test) = stratified_split(&binary, t.test_fraction, t.seed);
        let detector = fit_stage(dataset, &binary, &train, None, &t.detector)?;
        let detector_accuracy = stage_accuracy(&detector, dataset, &binary, &test)?;
        info!("Cry detector accuracy {:.2}%", detector_accuracy * 100.0);

        // Primary pain detector over cries
        let pain_labels: Vec<String> = dataset
            .categories
            .iter()
            .map(|c| (if c == pain_category { PAIN } else { NON_PAIN }).to_string())
            .collect();
        let cry_pain: Vec<String> = cry_positions.iter().map(|&i| pain_labels[i].clone()).collect();
        if !cry_pain.iter().any(|l| l == PAIN) || !cry_pain.iter().any(|l| l == NON_PAIN) {
            return Err(CryError::TrainingError(format!(
                "cries need both '{}' and other categories",
                pain_category
            )));
        }

        let (train, test) = remap(stratified_split(&cry_pain, t.test_fraction, t.seed), &cry_positions);
        let train = if t.oversample_minority {
            let resampled = oversample_minority(&train, &pain_labels, t.seed);
            info!("Oversampled primary training rows {} -> {}", train.len(), resampled.len());
            resampled
        } else {
            train
        };
        let weights = pain_weights(&train, &pain_labels, t.pain_weight_primary);
        info!("Training primary pain detector on {} rows", train.len());
        let primary = fit_stage(dataset, &pain_labels, &train, Some(&weights), &t.primary)?;

        let calibrator = ThresholdCalibrator::new(self.config.calibration.clone());
        let (y_primary, s_primary) = pain_scores(&primary, dataset, &pain_labels, &test)?;
        let primary_pain_cut = calibrator.calibrate_primary(&y_primary, &s_primary)?;

        // Cascade filter, only with enough stage-1 candidates
        let cascade_candidates = s_primary.iter().filter(|&&s| s >= primary_pain_cut).count();
        let mut cascade_cuts = self.config.calibration.defaults.cascade_cuts;
        let cascade = if cascade_candidates < t.min_cascade_candidates {
            warn!(
                "Only {} stage-1 candidates (< {}); skipping the cascade filter",
                cascade_candidates, t.min_cascade_candidates
            );
            None
        } else {
            let (train, test) =
                remap(stratified_split(&cry_pain, t.test_fraction, t.cascade_seed), &cry_positions);
            let weights = pain_weights(&train, &pain_labels, t.pain_weight_cascade);
            info!("Training cascade filter on {} rows", train.len());
            let cascade = fit_stage(dataset, &pain_labels, &train, Some(&weights), &t.cascade)?;
            let (y, s) = pain_scores(&cascade, dataset, &pain_labels, &test)?;
            cascade_cuts = calibrator.calibrate_cascade(&y, &s, cascade_cuts)?;
            Some(cascade)
        };

        // Non-pain categorizer over non-pain cries
        let nonpain_positions: Vec<usize> = cry_positions
            .iter()
            .copied()
            .filter(|&i| dataset.categories[i] != pain_category)
            .collect();
        let nonpain_labels: Vec<String> = nonpain_positions
            .iter()
            .map(|&i| dataset.categories[i].clone())
            .collect();
        let (nonpain, nonpain_accuracy) = if nonpain_categories.len() < 2 {
            warn!("Fewer than two non-pain categories; no categorizer trained");
            (None, None)
        } else {
            let (train, test) =
                remap(stratified_split(&nonpain_labels, t.test_fraction, t.seed), &nonpain_positions);
            info!("Training non-pain categorizer on {} rows", train.len());
            let stage = fit_stage(dataset, &dataset.categories, &train, None, &t.nonpain)?;
            let acc = stage_accuracy(&stage, dataset, &dataset.categories, &test)?;
            info!("Non-pain categorizer accuracy {:.2}%", acc * 100.0);
            (Some(stage), Some(acc))
        };

        let thresholds = Thresholds {
            primary_pain_cut,
            cascade_cuts,
            ..self.config.calibration.defaults
        };
        thresholds.validate()?;

        let stages = TrainedStages {
            detector,
            primary_pain: primary,
            cascade,
            nonpain,
            thresholds,
        };

        let evaluation = self.evaluate(&stages, dataset, &cry_positions)?;
        let report = TrainingReport {
            n_samples: dataset.len(),
            n_cry: cry_positions.len(),
            n_features: dataset.dim(),
            skipped_files: dataset.skipped,
            detector_accuracy,
            primary_test_rows: test.len(),
            cascade_candidates,
            cascade_trained: stages.cascade.is_some(),
            nonpain_accuracy,
            thresholds,
            evaluation,
        };
        Ok((stages, report))
    }

    /// Run the full cascade on a held-out split of the cries at every sensitivity
    fn evaluate(
        &self,
        stages: &TrainedStages,
        dataset: &Dataset,
        cry_positions: &[usize],
    ) -> CryResult<BTreeMap<String, SensitivityMetrics>> {
        let t = &self.config.training;
        let categories: Vec<String> = cry_positions
            .iter()
            .map(|&i| dataset.categories[i].clone())
            .collect();
        let (_, test) = remap(stratified_split(&categories, t.test_fraction, t.seed), cry_positions);
        let truth: Vec<String> = test.iter().map(|&i| dataset.categories[i].clone()).collect();

        let predictor = CascadePredictor::with_config(
            Arc::new(stages.to_bundle()?),
            self.config.audio.clone(),
            self.config.features.clone(),
        )?;

        let mut results = BTreeMap::new();
        for sensitivity in Sensitivity::ALL {
            let predicted = test
                .iter()
                .map(|&i| {
                    predictor
                        .predict_features(&dataset.features[i], sensitivity)
                        .map(|r| r.label)
                })
                .collect::<CryResult<Vec<String>>>()?;
            let metrics = evaluate_labels(
                &truth,
                &predicted,
                &self.config.dataset.pain_category,
                NEEDS_ATTENTION,
            );
            info!(
                "[{}] accuracy {:.1}%, pain recall {:.1}%, precision {:.1}%, FN {}, FP {}",
                sensitivity,
                metrics.accuracy * 100.0,
                metrics.pain_recall * 100.0,
                metrics.pain_precision * 100.0,
                metrics.false_negatives,
                metrics.false_positives
            );
            results.insert(sensitivity.name().to_string(), metrics);
        }
        Ok(results)
    }
}

/// Map split positions (into a subset) back to dataset positions
fn remap((train, test): (Vec<usize>, Vec<usize>), subset: &[usize]) -> (Vec<usize>, Vec<usize>) {
    (
        train.into_iter().map(|i| subset[i]).collect(),
        test.into_iter().map(|i| subset[i]).collect(),
    )
}

fn fit_stage(
    dataset: &Dataset,
    labels: &[String],
    positions: &[usize],
    weights: Option<&[f64]>,
    params: &LogisticParams,
) -> CryResult<TrainedStage> {
    let rows = dataset.rows(positions);
    let scaler = StandardScaler::fit(&rows)?;
    let scaled = rows
        .iter()
        .map(|r| scaler.transform_f64(r))
        .collect::<CryResult<Vec<_>>>()?;
    let y: Vec<String> = positions.iter().map(|&i| labels[i].clone()).collect();
    let model = LogisticModel::fit(&scaled, &y, weights, params)?;
    Ok(TrainedStage { model, scaler })
}

fn pain_weights(positions: &[usize], labels: &[String], pain_weight: f64) -> Vec<f64> {
    positions
        .iter()
        .map(|&i| if labels[i] == PAIN { pain_weight } else { 1.0 })
        .collect()
}

fn pain_scores(
    stage: &TrainedStage,
    dataset: &Dataset,
    labels: &[String],
    positions: &[usize],
) -> CryResult<(Vec<bool>, Vec<f64>)> {
    let mut y = Vec::with_capacity(positions.len());
    let mut s = Vec::with_capacity(positions.len());
    for &i in positions {
        y.push(labels[i] == PAIN);
        s.push(stage.proba_of(&dataset.features[i].to_f64(), PAIN)?);
    }
    Ok((y, s))
}

fn stage_accuracy(
    stage: &TrainedStage,
    dataset: &Dataset,
    labels: &[String],
    positions: &[usize],
) -> CryResult<f64> {
    let truth: Vec<String> = positions.iter().map(|&i| labels[i].clone()).collect();
    let predicted = positions
        .iter()
        .map(|&i| stage.predict(&dataset.features[i].to_f64()))
        .collect::<CryResult<Vec<_>>>()?;
    Ok(accuracy(&truth, &predicted))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> CryResult<PathBuf> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .map_err(|e| CryError::ArtifactError(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(path.to_path_buf())
}
