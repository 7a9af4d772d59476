//! Model bundle: stage models, scalers and thresholds loaded from one artifact prefix

use crate::config::BundleConfig;
use crate::error::{CryError, Result as CryResult};
use crate::features::FeatureVector;
use crate::model::{LogisticModel, ScalerSlot, StageId, StageModel, StandardScaler};
use crate::thresholds::Thresholds;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Detector class for a cry
pub const CRY: &str = "cry";
/// Detector class (and result label) for anything that is not a cry
pub const NOT_CRY: &str = "not_cry";
/// Positive class of the pain stages
pub const PAIN: &str = "pain";
/// Negative class of the pain stages
pub const NON_PAIN: &str = "non_pain";

/// Artifact file suffixes appended to a bundle prefix
pub mod suffix {
    pub const DETECTOR: &str = "_detector.json";
    pub const SCALER_DETECTOR: &str = "_scaler_detector.json";
    pub const SCALER_DETECTOR_ALIAS: &str = "_scaler_phase1.json";
    pub const PRIMARY: &str = "_stage1_pain.json";
    pub const PRIMARY_ALIAS: &str = "_stage1_ensemble.json";
    pub const SCALER_PRIMARY: &str = "_scaler_stage1.json";
    pub const CASCADE: &str = "_cascade.json";
    pub const SCALER_CASCADE: &str = "_scaler_cascade.json";
    pub const NONPAIN: &str = "_nonpain.json";
    pub const SCALER_NONPAIN: &str = "_scaler_nonpain.json";
    pub const SCALER_NONPAIN_ALIAS: &str = "_scaler_stage2.json";
    pub const THRESHOLDS: &str = "_thresholds.json";

    pub const ALL: [&str; 12] = [
        SCALER_DETECTOR,
        SCALER_DETECTOR_ALIAS,
        SCALER_PRIMARY,
        SCALER_CASCADE,
        SCALER_NONPAIN,
        SCALER_NONPAIN_ALIAS,
        DETECTOR,
        PRIMARY,
        PRIMARY_ALIAS,
        CASCADE,
        NONPAIN,
        THRESHOLDS,
    ];
}

/// Reduce a path that names any bundle artifact (with or without `.json`) to its prefix
pub fn strip_known_suffix<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    for s in suffix::ALL {
        if let Some(prefix) = raw.strip_suffix(s) {
            return PathBuf::from(prefix);
        }
        let bare = s.trim_end_matches(".json");
        if let Some(prefix) = raw.strip_suffix(bare) {
            return PathBuf::from(prefix);
        }
    }
    path.to_path_buf()
}

/// Artifact path for `prefix` + `suffix`
pub fn artifact_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Immutable set of stage models shared by every prediction
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub detector: StageModel,
    pub primary_pain: StageModel,
    pub cascade: Option<StageModel>,
    pub nonpain: Option<StageModel>,
    pub thresholds: Thresholds,
}

impl ModelBundle {
    /// Assemble and validate a bundle
    pub fn new(
        detector: StageModel,
        primary_pain: StageModel,
        cascade: Option<StageModel>,
        nonpain: Option<StageModel>,
        thresholds: Thresholds,
    ) -> CryResult<Self> {
        let bundle = Self {
            detector,
            primary_pain,
            cascade,
            nonpain,
            thresholds,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Load every artifact under `prefix`; a path naming any single artifact also works
    pub fn load<P: AsRef<Path>>(prefix: P, config: &BundleConfig) -> CryResult<Self> {
        let prefix = strip_known_suffix(prefix);
        info!("Loading model bundle from {}*", prefix.display());

        let detector = StageModel::new(
            StageId::Detector,
            Arc::new(read_required::<LogisticModel>(&prefix, &[suffix::DETECTOR])?),
            read_required(&prefix, &[suffix::SCALER_DETECTOR, suffix::SCALER_DETECTOR_ALIAS])?,
        );
        let primary_pain = StageModel::new(
            StageId::PrimaryPain,
            Arc::new(read_required::<LogisticModel>(
                &prefix,
                &[suffix::PRIMARY, suffix::PRIMARY_ALIAS],
            )?),
            read_required(&prefix, &[suffix::SCALER_PRIMARY])?,
        );

        let cascade = match read_optional::<LogisticModel>(&prefix, &[suffix::CASCADE])? {
            Some(model) => {
                let model: Arc<dyn crate::model::Classifier> = Arc::new(model);
                match read_optional::<StandardScaler>(&prefix, &[suffix::SCALER_CASCADE])? {
                    Some(scaler) => Some(StageModel::new(StageId::Cascade, model, scaler)),
                    None => {
                        warn!("Cascade scaler missing; reusing the primary pain scaler");
                        Some(StageModel::with_fallback(
                            StageId::Cascade,
                            model,
                            StageId::PrimaryPain,
                        ))
                    }
                }
            }
            None => {
                warn!("Cascade filter not found; pain screening uses the primary stage only");
                None
            }
        };

        let nonpain_model = read_optional::<LogisticModel>(&prefix, &[suffix::NONPAIN])?;
        let nonpain_scaler = read_optional::<StandardScaler>(
            &prefix,
            &[suffix::SCALER_NONPAIN, suffix::SCALER_NONPAIN_ALIAS],
        )?;
        let nonpain = match (nonpain_model, nonpain_scaler) {
            (Some(model), Some(scaler)) => {
                Some(StageModel::new(StageId::NonPain, Arc::new(model), scaler))
            }
            (model, scaler) => {
                let missing = if model.is_none() { "model" } else { "scaler" };
                if config.require_nonpain_categorizer || (model.is_some() && scaler.is_none()) {
                    return Err(CryError::ModelNotLoaded(format!(
                        "non-pain categorizer {} not found under {}",
                        missing,
                        prefix.display()
                    )));
                }
                warn!("Non-pain categorizer not found; non-pain cries report needs_attention");
                None
            }
        };

        let thresholds = match read_optional::<Thresholds>(&prefix, &[suffix::THRESHOLDS])? {
            Some(t) => t,
            None => {
                warn!("Thresholds file not found; using defaults");
                Thresholds::default()
            }
        };

        let bundle = Self::new(detector, primary_pain, cascade, nonpain, thresholds)?;
        info!(
            "Bundle ready: {} features, cascade {}, non-pain categorizer {}",
            bundle.n_features(),
            if bundle.cascade.is_some() { "on" } else { "off" },
            if bundle.nonpain.is_some() { "on" } else { "off" },
        );
        Ok(bundle)
    }

    /// Feature width every stage expects
    pub fn n_features(&self) -> usize {
        self.detector.classifier.n_features()
    }

    /// Check class sets, scaler wiring and dimension agreement
    pub fn validate(&self) -> CryResult<()> {
        self.thresholds.validate()?;
        for stage in self.stages() {
            stage.classifier.validate().map_err(|e| {
                CryError::ModelNotLoaded(format!("{} stage is malformed: {}", stage.id, e))
            })?;
        }

        for required in [CRY, NOT_CRY] {
            if !self.detector.has_class(required) {
                return Err(CryError::ModelNotLoaded(format!(
                    "detector lacks the '{}' class",
                    required
                )));
            }
        }
        for stage in std::iter::once(&self.primary_pain).chain(self.cascade.as_ref()) {
            if !stage.has_class(PAIN) {
                return Err(CryError::ModelNotLoaded(format!(
                    "{} stage lacks the '{}' class",
                    stage.id, PAIN
                )));
            }
        }

        let dim = self.n_features();
        for stage in self.stages() {
            if let ScalerSlot::MissingFallbackTo(target) = stage.scaler {
                if stage.id != StageId::Cascade || target != StageId::PrimaryPain {
                    return Err(CryError::ModelNotLoaded(format!(
                        "{} stage cannot borrow the {} scaler",
                        stage.id, target
                    )));
                }
            }
            let scaler = self.scaler_for(stage)?;
            if stage.classifier.n_features() != dim || scaler.n_features() != dim {
                return Err(CryError::ModelNotLoaded(format!(
                    "{} stage expects {} features (scaler {}), bundle uses {}",
                    stage.id,
                    stage.classifier.n_features(),
                    scaler.n_features(),
                    dim
                )));
            }
        }
        debug!("Bundle validated at {} features", dim);
        Ok(())
    }

    fn stages(&self) -> impl Iterator<Item = &StageModel> {
        [Some(&self.detector), Some(&self.primary_pain)]
            .into_iter()
            .chain([self.cascade.as_ref(), self.nonpain.as_ref()])
            .flatten()
    }

    fn stage(&self, id: StageId) -> Option<&StageModel> {
        match id {
            StageId::Detector => Some(&self.detector),
            StageId::PrimaryPain => Some(&self.primary_pain),
            StageId::Cascade => self.cascade.as_ref(),
            StageId::NonPain => self.nonpain.as_ref(),
        }
    }

    /// Resolve the scaler a stage uses, following one fallback hop
    pub fn scaler_for<'a>(&'a self, stage: &'a StageModel) -> CryResult<&'a StandardScaler> {
        match &stage.scaler {
            ScalerSlot::Present(scaler) => Ok(scaler),
            ScalerSlot::MissingFallbackTo(target) => self
                .stage(*target)
                .and_then(StageModel::own_scaler)
                .ok_or_else(|| {
                    CryError::ModelNotLoaded(format!(
                        "{} stage falls back to the {} scaler, which is unavailable",
                        stage.id, target
                    ))
                }),
        }
    }

    /// Scale a feature vector with the stage's scaler
    pub fn scale(&self, stage: &StageModel, features: &FeatureVector) -> CryResult<Vec<f64>> {
        self.scaler_for(stage)?.transform(features.as_slice())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CryResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CryError::ArtifactError(format!("cannot read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| CryError::ArtifactError(format!("cannot parse {}: {}", path.display(), e)))
}

/// First existing artifact among `suffixes`, or `None` if none exist
fn read_optional<T: DeserializeOwned>(prefix: &Path, suffixes: &[&str]) -> CryResult<Option<T>> {
    for s in suffixes {
        let path = artifact_path(prefix, s);
        if path.exists() {
            debug!("Reading {}", path.display());
            return read_json(&path).map(Some);
        }
    }
    Ok(None)
}

fn read_required<T: DeserializeOwned>(prefix: &Path, suffixes: &[&str]) -> CryResult<T> {
    read_optional(prefix, suffixes)?.ok_or_else(|| {
        CryError::ModelNotLoaded(format!(
            "required artifact {} not found",
            artifact_path(prefix, suffixes[0]).display()
        ))
    })
}
