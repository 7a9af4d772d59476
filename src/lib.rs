//! Infant Cry Cause Classifier
//!
//! Extracts a fixed-length acoustic feature vector from a short clip and runs it through
//! a cascade of statistical stages: cry detection, a primary pain screen, an optional
//! sensitivity-dependent cascade filter and a non-pain categorizer.

pub mod audio;
pub mod bundle;
pub mod calibration;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod predictor;
pub mod spectral;
pub mod thresholds;
pub mod training;

pub use audio::AudioClip;
pub use bundle::ModelBundle;
pub use config::Config;
pub use error::{CryError, Result as CryResult};
pub use features::{extract_features, FeatureVector, FEATURE_DIM};
pub use predictor::{CascadePredictor, PredictionResult, Stage};
pub use thresholds::{Sensitivity, Severity, Thresholds};

use std::path::Path;
use std::sync::Arc;

/// Loaded classifier: configuration plus a shared model bundle
pub struct CryClassifier {
    config: Config,
    predictor: CascadePredictor,
}

impl CryClassifier {
    /// Wrap an already loaded bundle
    pub fn new(config: Config, bundle: Arc<ModelBundle>) -> CryResult<Self> {
        let predictor =
            CascadePredictor::with_config(bundle, config.audio.clone(), config.features.clone())?;
        Ok(Self { config, predictor })
    }

    /// Load the bundle stored under `prefix`
    pub fn load<P: AsRef<Path>>(config: Config, prefix: P) -> CryResult<Self> {
        let bundle = ModelBundle::load(prefix, &config.bundle)?;
        Self::new(config, Arc::new(bundle))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn predictor(&self) -> &CascadePredictor {
        &self.predictor
    }

    /// Classify an audio file
    pub fn classify_file<P: AsRef<Path>>(
        &self,
        path: P,
        sensitivity: Sensitivity,
    ) -> CryResult<PredictionResult> {
        self.predictor.predict_file(path, sensitivity)
    }

    /// Classify in-memory samples at any sample rate
    pub fn classify(&self, clip: &AudioClip, sensitivity: Sensitivity) -> CryResult<PredictionResult> {
        self.predictor.predict(clip, sensitivity)
    }
}

/// Validate configuration and input files
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> CryResult<()> {
    audio::validate_audio_file(input_path)?;
    config::validate_config(config)?;
    Ok(())
}
