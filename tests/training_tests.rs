//! Training pipeline over synthetic feature rows and a small on-disk dataset

use crycascade::audio::write_wav_file;
use crycascade::bundle::{ModelBundle, NOT_CRY};
use crycascade::config::Config;
use crycascade::error::CryError;
use crycascade::training::{build_dataset, discover, Dataset, Trainer};
use crycascade::{FeatureVector, FEATURE_DIM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::path::Path;

const CATEGORIES: [&str; 4] = [NOT_CRY, "pain_discomfort", "emotional", "needs_attention"];

fn generate_dataset(per_category: usize, seed: u64) -> Dataset {
    generate_rows(&CATEGORIES, per_category, seed)
}

/// Well separated rows: category `c` lifts every feature `j` with `j % len == c`
fn generate_rows(names: &[&str], per_category: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut features = Vec::new();
    let mut categories = Vec::new();
    for (c, category) in names.iter().enumerate() {
        for _ in 0..per_category {
            let row: Vec<f32> = (0..FEATURE_DIM)
                .map(|j| {
                    let base = if j % names.len() == c { 2.0 } else { 0.0 };
                    base + rng.gen_range(-0.5..0.5)
                })
                .collect();
            features.push(FeatureVector::new(row));
            categories.push(category.to_string());
        }
    }
    Dataset::new(features, categories).unwrap()
}

fn write_tone(path: &Path, freq: f32) {
    let sr = 16000;
    let samples: Vec<f32> = (0..sr)
        .map(|i| 0.3 * (2.0 * PI * freq * i as f32 / sr as f32).sin())
        .collect();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    write_wav_file(path, &samples, sr as u32).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_reports_every_sensitivity() {
        let dataset = generate_dataset(40, 7);
        let (stages, report) = Trainer::new(Config::default()).unwrap().train(&dataset).unwrap();

        assert_eq!(report.n_samples, 160);
        assert_eq!(report.n_cry, 120);
        assert_eq!(report.n_features, FEATURE_DIM);
        assert!(report.detector_accuracy >= 0.9);
        assert!(report.thresholds.validate().is_ok());
        assert_eq!(report.evaluation.len(), 3);
        for name in ["high", "balanced", "precise"] {
            assert!(report.evaluation.contains_key(name));
        }
        assert!(stages.nonpain.is_some());
        assert!(report.nonpain_accuracy.unwrap() >= 0.9);
    }

    #[test]
    fn test_cascade_skipped_without_enough_candidates() {
        // 24 stage-1 test rows can never reach the default 50 candidates
        let dataset = generate_dataset(40, 11);
        let (stages, report) = Trainer::new(Config::default()).unwrap().train(&dataset).unwrap();
        assert!(!report.cascade_trained);
        assert!(stages.cascade.is_none());
        assert!(report.cascade_candidates < 50);

        let high = &report.evaluation["high"];
        let precise = &report.evaluation["precise"];
        assert_eq!(high.accuracy, precise.accuracy);
    }

    #[test]
    fn test_cascade_trained_and_monotone() {
        let mut config = Config::default();
        config.training.min_cascade_candidates = 1;
        let dataset = generate_dataset(40, 13);
        let (stages, report) = Trainer::new(config).unwrap().train(&dataset).unwrap();

        assert!(report.cascade_trained);
        assert!(stages.cascade.is_some());
        assert!(stages.thresholds.cascade_cuts.is_ordered());

        let high = &report.evaluation["high"];
        let balanced = &report.evaluation["balanced"];
        let precise = &report.evaluation["precise"];
        assert!(high.pain_recall >= balanced.pain_recall);
        assert!(balanced.pain_recall >= precise.pain_recall);
        assert!(high.false_negatives <= precise.false_negatives);
    }

    #[test]
    fn test_training_is_reproducible() {
        let dataset = generate_dataset(30, 5);
        let trainer = Trainer::new(Config::default()).unwrap();
        let (a, _) = trainer.train(&dataset).unwrap();
        let (b, _) = trainer.train(&dataset).unwrap();
        assert_eq!(a.primary_pain.model, b.primary_pain.model);
        assert_eq!(a.thresholds, b.thresholds);
    }

    #[test]
    fn test_single_class_dataset_is_rejected() {
        let dataset = Dataset::new(
            vec![FeatureVector::zeros(FEATURE_DIM); 4],
            vec!["emotional".to_string(); 4],
        )
        .unwrap();
        assert!(Trainer::new(Config::default()).unwrap().train(&dataset).is_err());
    }

    #[test]
    fn test_single_nonpain_category_follows_bundle_policy() {
        let names = [NOT_CRY, "pain_discomfort", "needs_attention"];
        let dataset = generate_rows(&names, 40, 17);

        // Default policy requires a categorizer
        let err = Trainer::new(Config::default()).unwrap().train(&dataset).unwrap_err();
        assert!(matches!(err, CryError::TrainingError(_)));

        let mut config = Config::default();
        config.bundle.require_nonpain_categorizer = false;
        let (stages, report) = Trainer::new(config.clone()).unwrap().train(&dataset).unwrap();
        assert!(stages.nonpain.is_none());
        assert!(report.nonpain_accuracy.is_none());

        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("cry");
        stages.save(&prefix).unwrap();
        let bundle = ModelBundle::load(&prefix, &config.bundle).unwrap();
        assert!(bundle.nonpain.is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected_before_training() {
        let mut config = Config::default();
        config.training.augment.enabled = true;
        config.training.augment.noise_range = [0.01, 0.003];
        assert!(matches!(
            Trainer::new(config),
            Err(CryError::ConfigValidationFailed(_))
        ));

        let mut config = Config::default();
        config.features.hop_length = 0;
        assert!(Trainer::new(config).is_err());
    }

    #[test]
    fn test_discover_and_extract_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_tone(&root.join("cry/belly_pain/a.wav"), 500.0);
        write_tone(&root.join("cry/belly_pain/b.wav"), 520.0);
        write_tone(&root.join("cry/hungry/a.wav"), 400.0);
        write_tone(&root.join("cry/unknown_cause/a.wav"), 300.0);
        write_tone(&root.join("silence/a.wav"), 50.0);
        std::fs::write(root.join("silence/notes.txt"), "not audio").unwrap();
        std::fs::write(root.join("silence/broken.wav"), "not audio").unwrap();

        let config = Config::default();
        let clips = discover(root, &config).unwrap();
        let categories: Vec<&str> = clips.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(
            categories,
            vec!["pain_discomfort", "pain_discomfort", "needs_attention", NOT_CRY, NOT_CRY]
        );

        let dataset = build_dataset(&clips, &config).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.skipped, 1);
        assert_eq!(dataset.dim(), FEATURE_DIM);
        assert_eq!(dataset.cry_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_augmentation_adds_rows_for_cries_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_tone(&root.join("cry/tired/a.wav"), 450.0);
        write_tone(&root.join("noise/a.wav"), 80.0);

        let mut config = Config::default();
        config.training.augment.enabled = true;
        config.training.augment.per_sample = 2;
        let clips = discover(root, &config).unwrap();
        let dataset = build_dataset(&clips, &config).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.cry_indices(), vec![0, 1, 2]);
        assert_ne!(dataset.features[0], dataset.features[1]);
    }
}
