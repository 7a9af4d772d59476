//! Cascade decision state machine

use crate::audio::AudioClip;
use crate::bundle::{ModelBundle, NOT_CRY, PAIN};
use crate::config::{validate_audio, validate_features, AudioConfig, FeatureConfig};
use crate::error::{CryError, Result as CryResult};
use crate::features::{extract_features, FeatureVector};
use crate::thresholds::{Sensitivity, Severity};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Label emitted when the pain stages confirm pain
pub const PAIN_LABEL: &str = "pain_discomfort";
/// Label emitted for a non-pain cry when no categorizer is loaded
pub const NEEDS_ATTENTION: &str = "needs_attention";
/// Label of an error result
pub const ERROR_LABEL: &str = "error";

/// Where in the cascade a result was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detect,
    PrimaryNonpain,
    CascadeFiltered,
    CascadeConfirmed,
    PrimaryPain,
    ExtractionFailed,
    ModelNotLoaded,
    InferenceFailed,
    InvalidSensitivity,
    Error,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Detect => "detect",
            Stage::PrimaryNonpain => "primary_nonpain",
            Stage::CascadeFiltered => "cascade_filtered",
            Stage::CascadeConfirmed => "cascade_confirmed",
            Stage::PrimaryPain => "primary_pain",
            Stage::ExtractionFailed => "extraction_failed",
            Stage::ModelNotLoaded => "model_not_loaded",
            Stage::InferenceFailed => "inference_failed",
            Stage::InvalidSensitivity => "invalid_sensitivity",
            Stage::Error => "error",
        }
    }

    /// Stage reported for a failed request
    pub fn for_error(err: &CryError) -> Self {
        match err {
            CryError::InvalidAudioFormat(_)
            | CryError::UnsupportedSampleRate(_)
            | CryError::AudioFileError(_)
            | CryError::ResampleError(_)
            | CryError::ExtractionFailed(_) => Stage::ExtractionFailed,
            CryError::ModelNotLoaded(_) | CryError::ArtifactError(_) => Stage::ModelNotLoaded,
            CryError::InferenceFailed(_) => Stage::InferenceFailed,
            CryError::InvalidSensitivity(_) => Stage::InvalidSensitivity,
            CryError::InvalidThresholds(_)
            | CryError::ConfigValidationFailed(_)
            | CryError::DatasetError(_)
            | CryError::TrainingError(_) => Stage::Error,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f64,
    pub severity: Severity,
    pub stage: Stage,
    /// Class probabilities of the stage that decided the label
    pub probabilities: BTreeMap<String, f64>,
    pub sensitivity: Sensitivity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pain_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade_cut: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PredictionResult {
    fn decided(
        label: impl Into<String>,
        confidence: f64,
        severity: Severity,
        stage: Stage,
        probabilities: BTreeMap<String, f64>,
        sensitivity: Sensitivity,
    ) -> Self {
        Self {
            label: label.into(),
            confidence,
            severity,
            stage,
            probabilities,
            sensitivity,
            pain_probability: None,
            cascade_probability: None,
            cascade_cut: None,
            message: None,
        }
    }

    /// Structured result for a failed request: label `error`, zero confidence
    pub fn from_error(err: &CryError, sensitivity: Sensitivity) -> Self {
        Self {
            message: Some(err.to_string()),
            ..Self::decided(
                ERROR_LABEL,
                0.0,
                Severity::None,
                Stage::for_error(err),
                BTreeMap::new(),
                sensitivity,
            )
        }
    }

    pub fn is_error(&self) -> bool {
        self.label == ERROR_LABEL
    }
}

/// Runs the cascade over a shared, read-only [`ModelBundle`]
#[derive(Debug, Clone)]
pub struct CascadePredictor {
    bundle: Arc<ModelBundle>,
    audio_config: AudioConfig,
    feature_config: FeatureConfig,
}

impl CascadePredictor {
    /// Predictor with default audio and feature settings
    pub fn new(bundle: Arc<ModelBundle>) -> Self {
        Self {
            bundle,
            audio_config: AudioConfig::default(),
            feature_config: FeatureConfig::default(),
        }
    }

    /// Predictor with custom audio and feature settings, rejected if they cannot be used
    pub fn with_config(
        bundle: Arc<ModelBundle>,
        audio_config: AudioConfig,
        feature_config: FeatureConfig,
    ) -> CryResult<Self> {
        validate_audio(&audio_config)?;
        validate_features(&feature_config, audio_config.sample_rate)?;
        Ok(Self {
            bundle,
            audio_config,
            feature_config,
        })
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Normalize a clip, extract features and classify it
    pub fn predict(&self, clip: &AudioClip, sensitivity: Sensitivity) -> CryResult<PredictionResult> {
        let normalized = clip.clone().normalized(&self.audio_config)?;
        let features = extract_features(&normalized, &self.feature_config)?;
        self.predict_features(&features, sensitivity)
    }

    /// Load, normalize and classify an audio file
    pub fn predict_file<P: AsRef<Path>>(
        &self,
        path: P,
        sensitivity: Sensitivity,
    ) -> CryResult<PredictionResult> {
        let clip = AudioClip::load(path, &self.audio_config)?;
        let features = extract_features(&clip, &self.feature_config)?;
        self.predict_features(&features, sensitivity)
    }

    /// Like [`predict`](Self::predict), folding any failure into an error result
    pub fn predict_or_error(&self, clip: &AudioClip, sensitivity: Sensitivity) -> PredictionResult {
        self.predict(clip, sensitivity)
            .unwrap_or_else(|e| PredictionResult::from_error(&e, sensitivity))
    }

    /// Classify an extracted feature vector
    pub fn predict_features(
        &self,
        features: &FeatureVector,
        sensitivity: Sensitivity,
    ) -> CryResult<PredictionResult> {
        let bundle = &*self.bundle;
        let thresholds = &bundle.thresholds;
        if features.len() != bundle.n_features() {
            return Err(CryError::InferenceFailed(format!(
                "feature vector has {} values, bundle expects {}",
                features.len(),
                bundle.n_features()
            )));
        }

        // Detect
        let scaled = bundle.scale(&bundle.detector, features)?;
        let detector_probs = bundle.detector.predict_proba(&scaled)?;
        let detected = bundle.detector.classifier.predict(&scaled)?;
        if detected == NOT_CRY {
            let confidence = detector_probs.get(NOT_CRY).copied().unwrap_or(0.0);
            debug!("Detector: not a cry ({:.3})", confidence);
            return Ok(PredictionResult::decided(
                NOT_CRY,
                confidence,
                Severity::None,
                Stage::Detect,
                detector_probs,
                sensitivity,
            ));
        }

        // Primary pain screen
        let scaled = bundle.scale(&bundle.primary_pain, features)?;
        let primary_probs = bundle.primary_pain.predict_proba(&scaled)?;
        let pain_probability = bundle.primary_pain.probability_in(&primary_probs, PAIN)?;
        if pain_probability < thresholds.primary_pain_cut {
            debug!(
                "Primary screen: {:.3} < {:.3}",
                pain_probability, thresholds.primary_pain_cut
            );
            let mut result = self.categorize_nonpain(
                features,
                Stage::PrimaryNonpain,
                1.0 - pain_probability,
                sensitivity,
            )?;
            result.pain_probability = Some(pain_probability);
            return Ok(result);
        }

        // Cascade refine, or primary-only fallback
        let Some(cascade) = &bundle.cascade else {
            let mut result = PredictionResult::decided(
                PAIN_LABEL,
                pain_probability,
                thresholds.severity(pain_probability),
                Stage::PrimaryPain,
                primary_probs,
                sensitivity,
            );
            result.pain_probability = Some(pain_probability);
            return Ok(result);
        };

        let scaled = bundle.scale(cascade, features)?;
        let cascade_probs = cascade.predict_proba(&scaled)?;
        let cascade_probability = cascade.probability_in(&cascade_probs, PAIN)?;
        let cut = thresholds.cascade_cut(sensitivity);
        debug!(
            "Cascade [{}]: {:.3} vs cut {:.3}",
            sensitivity, cascade_probability, cut
        );

        let mut result = if cascade_probability >= cut {
            PredictionResult::decided(
                PAIN_LABEL,
                cascade_probability,
                thresholds.severity(cascade_probability),
                Stage::CascadeConfirmed,
                cascade_probs,
                sensitivity,
            )
        } else {
            self.categorize_nonpain(
                features,
                Stage::CascadeFiltered,
                1.0 - cascade_probability,
                sensitivity,
            )?
        };
        result.pain_probability = Some(pain_probability);
        result.cascade_probability = Some(cascade_probability);
        result.cascade_cut = Some(cut);
        Ok(result)
    }

    /// Categorize a non-pain cry; `fallback_confidence` is used when no categorizer is loaded
    fn categorize_nonpain(
        &self,
        features: &FeatureVector,
        stage: Stage,
        fallback_confidence: f64,
        sensitivity: Sensitivity,
    ) -> CryResult<PredictionResult> {
        let bundle = &*self.bundle;
        let Some(nonpain) = &bundle.nonpain else {
            return Ok(PredictionResult::decided(
                NEEDS_ATTENTION,
                fallback_confidence,
                Severity::Medium,
                stage,
                BTreeMap::new(),
                sensitivity,
            ));
        };

        let scaled = bundle.scale(nonpain, features)?;
        let probs = nonpain.predict_proba(&scaled)?;
        let (label, confidence) = probs
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(label, &p)| (label.clone(), p))
            .ok_or_else(|| {
                CryError::InferenceFailed("non-pain categorizer has no classes".to_string())
            })?;

        Ok(PredictionResult::decided(
            label,
            confidence,
            bundle.thresholds.severity(confidence),
            stage,
            probs,
            sensitivity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{CRY, NON_PAIN};
    use crate::features::FEATURE_DIM;
    use crate::model::{LogisticModel, StageId, StageModel, StandardScaler};
    use crate::thresholds::Thresholds;

    fn tiny_bundle() -> ModelBundle {
        let logistic = |classes: [&str; 2]| LogisticModel {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            weights: vec![vec![0.0; FEATURE_DIM]; 2],
            bias: vec![0.0; 2],
        };
        let scaler = || StandardScaler {
            mean: vec![0.0; FEATURE_DIM],
            scale: vec![1.0; FEATURE_DIM],
        };
        ModelBundle::new(
            StageModel::new(StageId::Detector, Arc::new(logistic([CRY, NOT_CRY])), scaler()),
            StageModel::new(StageId::PrimaryPain, Arc::new(logistic([NON_PAIN, PAIN])), scaler()),
            None,
            None,
            Thresholds::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_error_result() {
        let err = CryError::ExtractionFailed("signal is empty".to_string());
        let result = PredictionResult::from_error(&err, Sensitivity::High);
        assert!(result.is_error());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.severity, Severity::None);
        assert_eq!(result.stage, Stage::ExtractionFailed);
        assert!(result.message.unwrap().contains("E006"));
    }

    #[test]
    fn test_error_stage_per_kind() {
        let cases = [
            (CryError::UnsupportedSampleRate(0), Stage::ExtractionFailed),
            (CryError::InvalidAudioFormat("mp4".into()), Stage::ExtractionFailed),
            (CryError::ArtifactError("bad json".into()), Stage::ModelNotLoaded),
            (CryError::ModelNotLoaded("detector".into()), Stage::ModelNotLoaded),
            (CryError::InferenceFailed("nan".into()), Stage::InferenceFailed),
            (CryError::InvalidSensitivity("max".into()), Stage::InvalidSensitivity),
            (CryError::ConfigValidationFailed("hop".into()), Stage::Error),
            (CryError::TrainingError("empty".into()), Stage::Error),
        ];
        for (err, stage) in cases {
            assert_eq!(Stage::for_error(&err), stage, "{}", err);
        }
    }

    #[test]
    fn test_invalid_feature_config_is_rejected() {
        let bundle = Arc::new(tiny_bundle());
        let features = FeatureConfig {
            hop_length: 0,
            ..FeatureConfig::default()
        };
        let err = CascadePredictor::with_config(bundle.clone(), AudioConfig::default(), features)
            .unwrap_err();
        assert!(matches!(err, CryError::ConfigValidationFailed(_)));
        assert!(CascadePredictor::with_config(
            bundle,
            AudioConfig::default(),
            FeatureConfig::default()
        )
        .is_ok());
    }

    #[test]
    fn test_stage_serializes_as_tag() {
        let json = serde_json::to_string(&Stage::CascadeConfirmed).unwrap();
        assert_eq!(json, "\"cascade_confirmed\"");
        assert_eq!(Stage::PrimaryNonpain.to_string(), "primary_nonpain");
    }
}
