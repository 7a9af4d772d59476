//! Configuration system for the cry classifier

use crate::audio::SUPPORTED_EXTENSIONS;
use crate::thresholds::Thresholds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub audio: AudioConfig,
    pub features: FeatureConfig,
    pub calibration: CalibrationConfig,
    pub training: TrainingConfig,
    pub dataset: DatasetConfig,
    pub bundle: BundleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            audio: AudioConfig::default(),
            features: FeatureConfig::default(),
            calibration: CalibrationConfig::default(),
            training: TrainingConfig::default(),
            dataset: DatasetConfig::default(),
            bundle: BundleConfig::default(),
        }
    }
}

/// Clip normalization applied before feature extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub duration_sec: f32,
    /// Zero-pad clips shorter than `duration_sec`
    pub pad_to_duration: bool,
    /// Frames per block fed to the resampler
    pub resample_chunk: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            duration_sec: 3.0,
            pad_to_duration: true,
            resample_chunk: 1024,
        }
    }
}

impl AudioConfig {
    /// Number of samples in a normalized clip
    pub fn clip_len(&self) -> usize {
        (self.duration_sec * self.sample_rate as f32).round() as usize
    }
}

/// Spectral analysis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mfcc: usize,
    pub n_mels: usize,
    pub rolloff_percent: f32,
    pub contrast_bands: usize,
    pub contrast_fmin: f32,
    pub contrast_quantile: f32,
    pub delta_width: usize,
    pub top_db: f32,
    pub start_bpm: f32,
    pub tempo_min_bpm: f32,
    pub tempo_max_bpm: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mfcc: 13,
            n_mels: 128,
            rolloff_percent: 0.85,
            contrast_bands: 6,
            contrast_fmin: 200.0,
            contrast_quantile: 0.02,
            delta_width: 9,
            top_db: 80.0,
            start_bpm: 120.0,
            tempo_min_bpm: 30.0,
            tempo_max_bpm: 300.0,
        }
    }
}

/// Precision/recall targets for threshold calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub primary_recall_floor: f64,
    /// Primary cut used when no operating point reaches the recall floor
    pub primary_default_cut: f64,
    pub high_recall_floor: f64,
    pub balanced_recall_floor: f64,
    pub precise_precision_floor: f64,
    /// Thresholds used before calibration and whenever a bundle ships none
    pub defaults: Thresholds,
    /// Clamp cascade cuts so that high <= balanced <= precise after the sweep
    pub enforce_cut_ordering: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            primary_recall_floor: 0.75,
            primary_default_cut: 0.45,
            high_recall_floor: 0.85,
            balanced_recall_floor: 0.70,
            precise_precision_floor: 0.95,
            defaults: Thresholds::default(),
            enforce_cut_ordering: true,
        }
    }
}

/// Gradient descent parameters for one stage classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    /// Reweight classes inversely to their frequency
    pub balanced_classes: bool,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 500,
            l2: 1e-3,
            balanced_classes: false,
        }
    }
}

/// Training-time data augmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    pub enabled: bool,
    /// Augmented copies generated per source clip
    pub per_sample: usize,
    pub noise_range: [f32; 2],
    pub gain_range: [f32; 2],
    pub max_shift_sec: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_sample: 1,
            noise_range: [0.003, 0.01],
            gain_range: [0.7, 1.3],
            max_shift_sec: 0.5,
        }
    }
}

/// Offline training pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    /// Seed for the independent split the cascade filter is trained on
    pub cascade_seed: u64,
    /// Cascade filter is skipped when fewer stage-1 test candidates pass the primary cut
    pub min_cascade_candidates: usize,
    pub pain_weight_primary: f64,
    pub pain_weight_cascade: f64,
    pub oversample_minority: bool,
    pub detector: LogisticParams,
    pub primary: LogisticParams,
    pub cascade: LogisticParams,
    pub nonpain: LogisticParams,
    pub augment: AugmentConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            cascade_seed: 43,
            min_cascade_candidates: 50,
            pain_weight_primary: 2.0,
            pain_weight_cascade: 1.5,
            oversample_minority: true,
            detector: LogisticParams {
                balanced_classes: true,
                ..LogisticParams::default()
            },
            primary: LogisticParams {
                learning_rate: 0.05,
                epochs: 800,
                ..LogisticParams::default()
            },
            cascade: LogisticParams {
                learning_rate: 0.03,
                epochs: 800,
                l2: 5e-3,
                ..LogisticParams::default()
            },
            nonpain: LogisticParams {
                balanced_classes: true,
                ..LogisticParams::default()
            },
            augment: AugmentConfig::default(),
        }
    }
}

/// Labeled dataset layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory holding one sub-directory per cry cause
    pub cry_dir: String,
    /// Directories whose clips are labeled `not_cry`
    pub not_cry_dirs: Vec<String>,
    /// Cry cause directory name -> category label
    pub category_mapping: BTreeMap<String, String>,
    /// Category treated as the pain class by the pain stages
    pub pain_category: String,
    pub extensions: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            cry_dir: "cry".to_string(),
            not_cry_dirs: vec![
                "silence".to_string(),
                "laugh".to_string(),
                "noise".to_string(),
            ],
            category_mapping: default_category_mapping(),
            pain_category: "pain_discomfort".to_string(),
            extensions: ["wav", "flac", "mp3", "ogg"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

/// Model bundle loading policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Treat a missing non-pain categorizer as a fatal load error
    pub require_nonpain_categorizer: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            require_nonpain_categorizer: true,
        }
    }
}

/// Validate audio loading values
pub fn validate_audio(audio: &AudioConfig) -> anyhow::Result<()> {
    if audio.sample_rate < 8000 {
        anyhow::bail!("audio.sample_rate must be >= 8000 Hz");
    }
    if audio.duration_sec.is_nan() || audio.duration_sec <= 0.0 {
        anyhow::bail!("audio.duration_sec must be > 0");
    }
    if audio.resample_chunk == 0 {
        anyhow::bail!("audio.resample_chunk must be > 0");
    }
    Ok(())
}

/// Validate feature extraction values for audio at `sample_rate`
pub fn validate_features(f: &FeatureConfig, sample_rate: u32) -> anyhow::Result<()> {
    if f.n_fft < 16 || f.hop_length == 0 || f.hop_length > f.n_fft {
        anyhow::bail!("features.n_fft must be >= 16 and 0 < hop_length <= n_fft");
    }
    if f.n_mfcc == 0 || f.n_mfcc > f.n_mels {
        anyhow::bail!("features.n_mfcc must be in 1..=n_mels");
    }
    if !(0.0..=1.0).contains(&f.rolloff_percent) {
        anyhow::bail!("features.rolloff_percent must be within [0, 1]");
    }
    if f.delta_width < 3 || f.delta_width % 2 == 0 {
        anyhow::bail!("features.delta_width must be odd and >= 3");
    }
    if f.tempo_min_bpm <= 0.0 || f.tempo_min_bpm >= f.tempo_max_bpm {
        anyhow::bail!("features tempo range min must be > 0 and < max");
    }
    let top_band = f.contrast_fmin * 2.0f32.powi(f.contrast_bands as i32 - 1);
    if f.contrast_bands == 0 || top_band >= sample_rate as f32 / 2.0 {
        anyhow::bail!("features.contrast_bands exceed the Nyquist frequency");
    }
    Ok(())
}

/// Validate configuration values
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    validate_audio(&config.audio)?;
    validate_features(&config.features, config.audio.sample_rate)?;

    let c = &config.calibration;
    for (name, v) in [
        ("primary_recall_floor", c.primary_recall_floor),
        ("high_recall_floor", c.high_recall_floor),
        ("balanced_recall_floor", c.balanced_recall_floor),
        ("precise_precision_floor", c.precise_precision_floor),
    ] {
        if !(0.0..=1.0).contains(&v) {
            anyhow::bail!("calibration.{} must be within [0, 1]", name);
        }
    }
    c.defaults
        .validate()
        .map_err(|e| anyhow::anyhow!("calibration.defaults: {}", e))?;

    let t = &config.training;
    if !(0.0 < t.test_fraction && t.test_fraction < 1.0) {
        anyhow::bail!("training.test_fraction must be within (0, 1)");
    }
    for (name, p) in [
        ("detector", &t.detector),
        ("primary", &t.primary),
        ("cascade", &t.cascade),
        ("nonpain", &t.nonpain),
    ] {
        if p.learning_rate <= 0.0 || p.epochs == 0 || p.l2 < 0.0 {
            anyhow::bail!("training.{}: learning_rate and epochs must be > 0, l2 >= 0", name);
        }
    }
    let ordered = |r: [f32; 2]| r[0].is_finite() && r[1].is_finite() && r[0] <= r[1];
    if !ordered(t.augment.noise_range) || !ordered(t.augment.gain_range) {
        anyhow::bail!("training.augment ranges must be [min, max]");
    }
    if t.augment.max_shift_sec < 0.0 {
        anyhow::bail!("training.augment.max_shift_sec must be >= 0");
    }

    if !config
        .dataset
        .category_mapping
        .values()
        .any(|c| c == &config.dataset.pain_category)
    {
        anyhow::bail!(
            "dataset.pain_category '{}' is not produced by category_mapping",
            config.dataset.pain_category
        );
    }
    for ext in &config.dataset.extensions {
        if !SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            anyhow::bail!("dataset.extensions: cannot decode '{}' files", ext);
        }
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn default_category_mapping() -> BTreeMap<String, String> {
    [
        ("belly_pain", "pain_discomfort"),
        ("cold_hot", "needs_attention"),
        ("burping", "needs_attention"),
        ("discomfort", "needs_attention"),
        ("hungry", "needs_attention"),
        ("tired", "needs_attention"),
        ("emotional", "emotional"),
    ]
    .into_iter()
    .map(|(cause, category)| (cause.to_string(), category.to_string()))
    .collect()
}
