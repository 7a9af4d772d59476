//! Fixed-length acoustic feature vector for one clip

use crate::audio::{self, AudioClip};
use crate::config::{AudioConfig, FeatureConfig};
use crate::error::{CryError, Result as CryResult};
use crate::spectral::{self, StftData};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Vector length for the default 13 MFCCs
pub const FEATURE_DIM: usize = 105;

/// Vector length produced for `n_mfcc` cepstral coefficients
pub fn feature_dim(n_mfcc: usize) -> usize {
    6 * n_mfcc + 27
}

/// Ordered, finite feature values for one clip.
///
/// Layout: MFCC mean, std, max, min and delta / delta-delta means per coefficient
/// (6 × n_mfcc), spectral shape (10), energy (5), harmonic (8), temporal (4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Build from raw values, replacing NaN and infinities with 0.0
    pub fn new(values: Vec<f32>) -> Self {
        Self(
            values
                .into_iter()
                .map(|v| if v.is_finite() { v } else { 0.0 })
                .collect(),
        )
    }

    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Widened copy for the f64 model math
    pub fn to_f64(&self) -> Vec<f64> {
        self.0.iter().map(|&v| v as f64).collect()
    }
}

impl AsRef<[f32]> for FeatureVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Extract the feature vector from a clip already at the analysis rate and length
pub fn extract_features(clip: &AudioClip, config: &FeatureConfig) -> CryResult<FeatureVector> {
    if clip.is_empty() {
        return Err(CryError::ExtractionFailed("signal is empty".to_string()));
    }
    if clip.sample_rate == 0 {
        return Err(CryError::ExtractionFailed("sample rate is zero".to_string()));
    }

    let y = &clip.samples;
    let sr = clip.sample_rate;
    let n_fft = config.n_fft;
    let hop = config.hop_length;

    let stft_data: StftData = spectral::stft(y, n_fft, hop, "hann", sr, true);
    if stft_data.s.ncols() == 0 {
        return Err(CryError::ExtractionFailed("STFT produced no frames".to_string()));
    }
    let mag = spectral::magnitude_spectrogram(&stft_data);
    let power = spectral::power_spectrogram(&stft_data);
    let freqs = &stft_data.freqs;

    let mel_bank = spectral::mel_filter_bank(config.n_mels, n_fft, sr, 0.0, sr as f32 / 2.0);
    let mel = spectral::mel_spectrogram(&power, &mel_bank);
    let mel_db = spectral::power_to_db(&mel, Some(config.top_db));

    let mut features = Vec::with_capacity(feature_dim(config.n_mfcc));

    // Cepstral
    let mfcc = spectral::mfcc_from_db(&mel_db, config.n_mfcc);
    let mfcc_stats = spectral::row_stats(&mfcc);
    for i in 0..4 {
        features.extend(mfcc_stats.iter().map(|s| s[i]));
    }
    let d1 = spectral::delta(&mfcc, config.delta_width);
    let d2 = spectral::delta(&d1, config.delta_width);
    features.extend(row_means(&d1));
    features.extend(row_means(&d2));

    // Spectral shape
    let centroid = spectral::spectral_centroid(&mag, freqs);
    let rolloff = spectral::spectral_rolloff(&mag, freqs, config.rolloff_percent);
    let bandwidth = spectral::spectral_bandwidth(&mag, freqs, &centroid);
    let flatness = spectral::spectral_flatness(&mag);
    for series in [&centroid, &rolloff, &bandwidth] {
        features.push(audio::mean(series));
        features.push(audio::std_dev(series));
    }
    features.extend([
        audio::mean(&flatness),
        audio::std_dev(&flatness),
        audio::max(&flatness),
        audio::min(&flatness),
    ]);

    // Energy
    let zcr = spectral::zero_crossing_rate(y, n_fft, hop);
    let rms = spectral::rms_energy(y, n_fft, hop);
    features.extend([
        audio::mean(&zcr),
        audio::std_dev(&zcr),
        audio::mean(&rms),
        audio::std_dev(&rms),
        audio::max(&rms),
    ]);

    // Harmonic
    let chroma = spectral::chroma(&power, freqs);
    let contrast = spectral::spectral_contrast(
        &mag,
        freqs,
        config.contrast_bands,
        config.contrast_fmin,
        config.contrast_quantile,
    );
    let tonnetz = spectral::tonnetz(&chroma);
    for block in [&chroma, &mel, &contrast, &tonnetz] {
        let (m, s) = spectral::global_mean_std(block);
        features.push(m);
        features.push(s);
    }

    // Temporal
    let onset = spectral::onset_strength(&mel_db);
    let tempo = spectral::estimate_tempo(
        &onset,
        sr,
        hop,
        config.start_bpm,
        config.tempo_min_bpm,
        config.tempo_max_bpm,
    );
    features.extend([
        tempo,
        audio::mean(&onset),
        audio::std_dev(&onset),
        audio::max(&onset),
    ]);

    let expected = feature_dim(config.n_mfcc);
    if features.len() != expected {
        return Err(CryError::ExtractionFailed(format!(
            "produced {} values, expected {}",
            features.len(),
            expected
        )));
    }

    Ok(FeatureVector::new(features))
}

/// Load, normalize and extract a file in one step
pub fn extract_features_from_file<P: AsRef<Path>>(
    path: P,
    audio_config: &AudioConfig,
    feature_config: &FeatureConfig,
) -> CryResult<FeatureVector> {
    let clip = AudioClip::load(path, audio_config)?;
    extract_features(&clip, feature_config)
}

fn row_means(data: &Array2<f32>) -> Vec<f32> {
    data.rows()
        .into_iter()
        .map(|row| row.mean().unwrap_or(0.0))
        .collect()
}
