//! Feature extraction contract: fixed width, finite values, determinism

use crycascade::audio::{write_wav_file, AudioClip};
use crycascade::config::{AudioConfig, FeatureConfig};
use crycascade::error::CryError;
use crycascade::features::{extract_features, extract_features_from_file, feature_dim, FEATURE_DIM};
use std::f32::consts::PI;

const SR: u32 = 22050;
const CLIP_LEN: usize = 66150;

/// Harmonic cry-like tone with a vibrato and a slow amplitude envelope
fn generate_cry(f0: f32, n_samples: usize, sr: u32) -> Vec<f32> {
    (0..n_samples)
        .map(|i| {
            let t = i as f32 / sr as f32;
            let pitch = f0 * (1.0 + 0.03 * (2.0 * PI * 5.0 * t).sin());
            let env = 0.5 + 0.5 * (2.0 * PI * 1.5 * t).sin().abs();
            let tone: f32 = (1..=4)
                .map(|h| (2.0 * PI * pitch * h as f32 * t).sin() / h as f32)
                .sum();
            0.3 * env * tone
        })
        .collect()
}

/// Deterministic pseudo-noise (linear congruential)
fn generate_noise(n_samples: usize, amplitude: f32) -> Vec<f32> {
    let mut state: u32 = 12345;
    (0..n_samples)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            ((state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0) * amplitude
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_yields_finite_vector() {
        let clip = AudioClip::new(vec![0.0; CLIP_LEN], SR);
        let fv = extract_features(&clip, &FeatureConfig::default()).unwrap();
        assert_eq!(fv.len(), FEATURE_DIM);
        assert!(fv.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_constant_signal_yields_finite_vector() {
        let clip = AudioClip::new(vec![0.25; CLIP_LEN], SR);
        let fv = extract_features(&clip, &FeatureConfig::default()).unwrap();
        assert!(fv.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_cry_and_noise_dimensions() {
        let config = FeatureConfig::default();
        for samples in [generate_cry(450.0, CLIP_LEN, SR), generate_noise(CLIP_LEN, 0.2)] {
            let fv = extract_features(&AudioClip::new(samples, SR), &config).unwrap();
            assert_eq!(fv.len(), feature_dim(config.n_mfcc));
            assert!(fv.as_slice().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let clip = AudioClip::new(generate_cry(400.0, CLIP_LEN, SR), SR);
        let config = FeatureConfig::default();
        let a = extract_features(&clip, &config).unwrap();
        let b = extract_features(&clip, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_centroid_rises_with_pitch() {
        // Spectral block starts after the 78 cepstral values; centroid mean comes first
        let config = FeatureConfig::default();
        let low = extract_features(&AudioClip::new(generate_cry(300.0, CLIP_LEN, SR), SR), &config)
            .unwrap();
        let high = extract_features(&AudioClip::new(generate_cry(900.0, CLIP_LEN, SR), SR), &config)
            .unwrap();
        assert!(high.as_slice()[78] > low.as_slice()[78]);
    }

    #[test]
    fn test_noise_is_flatter_than_tone() {
        let config = FeatureConfig::default();
        let tone = extract_features(&AudioClip::new(generate_cry(450.0, CLIP_LEN, SR), SR), &config)
            .unwrap();
        let noise = extract_features(&AudioClip::new(generate_noise(CLIP_LEN, 0.3), SR), &config)
            .unwrap();
        // Flatness mean follows centroid, rolloff and bandwidth (mean, std each)
        assert!(noise.as_slice()[84] > tone.as_slice()[84]);
    }

    #[test]
    fn test_custom_mfcc_count() {
        let config = FeatureConfig {
            n_mfcc: 20,
            ..FeatureConfig::default()
        };
        let clip = AudioClip::new(generate_cry(500.0, CLIP_LEN, SR), SR);
        assert_eq!(extract_features(&clip, &config).unwrap().len(), 147);
    }

    #[test]
    fn test_empty_signal_is_an_error() {
        let clip = AudioClip::new(Vec::new(), SR);
        assert!(matches!(
            extract_features(&clip, &FeatureConfig::default()),
            Err(CryError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn test_file_is_resampled_and_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        // One second at 16 kHz
        write_wav_file(&path, &generate_cry(420.0, 16000, 16000), 16000).unwrap();

        let audio = AudioConfig::default();
        let clip = AudioClip::load(&path, &audio).unwrap();
        assert_eq!(clip.sample_rate, SR);
        assert_eq!(clip.samples.len(), CLIP_LEN);

        let fv = extract_features_from_file(&path, &audio, &FeatureConfig::default()).unwrap();
        assert_eq!(fv.len(), FEATURE_DIM);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = AudioClip::load("clip.3gp", &AudioConfig::default()).unwrap_err();
        assert!(matches!(err, CryError::InvalidAudioFormat(_)));
    }
}
