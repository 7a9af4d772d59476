//! Cascade state machine behavior over injected stage models

use crycascade::bundle::ModelBundle;
use crycascade::error::{CryError, Result as CryResult};
use crycascade::model::{Classifier, StageId, StageModel, StandardScaler};
use crycascade::predictor::{CascadePredictor, Stage};
use crycascade::thresholds::{Sensitivity, Severity, Thresholds};
use crycascade::{AudioClip, FeatureVector, FEATURE_DIM};
use std::sync::Arc;

/// Classifier that ignores its input and reports fixed probabilities
#[derive(Debug)]
struct FixedProba {
    classes: Vec<String>,
    probs: Vec<f64>,
}

impl Classifier for FixedProba {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        FEATURE_DIM
    }

    fn predict_proba(&self, _x: &[f64]) -> CryResult<Vec<f64>> {
        Ok(self.probs.clone())
    }
}

fn fixed(classes: &[&str], probs: &[f64]) -> Arc<dyn Classifier> {
    Arc::new(FixedProba {
        classes: classes.iter().map(|c| c.to_string()).collect(),
        probs: probs.to_vec(),
    })
}

fn identity_scaler() -> StandardScaler {
    StandardScaler {
        mean: vec![0.0; FEATURE_DIM],
        scale: vec![1.0; FEATURE_DIM],
    }
}

fn detector(p_cry: f64) -> StageModel {
    StageModel::new(
        StageId::Detector,
        fixed(&["cry", "not_cry"], &[p_cry, 1.0 - p_cry]),
        identity_scaler(),
    )
}

fn pain_stage(id: StageId, p_pain: f64) -> StageModel {
    StageModel::new(id, fixed(&["non_pain", "pain"], &[1.0 - p_pain, p_pain]), identity_scaler())
}

fn categorizer(p_emotional: f64) -> StageModel {
    StageModel::new(
        StageId::NonPain,
        fixed(&["emotional", "needs_attention"], &[p_emotional, 1.0 - p_emotional]),
        identity_scaler(),
    )
}

fn predictor(
    p_cry: f64,
    p_primary: f64,
    p_cascade: Option<f64>,
    p_emotional: Option<f64>,
) -> CascadePredictor {
    let bundle = ModelBundle::new(
        detector(p_cry),
        pain_stage(StageId::PrimaryPain, p_primary),
        p_cascade.map(|p| pain_stage(StageId::Cascade, p)),
        p_emotional.map(categorizer),
        Thresholds::default(),
    )
    .unwrap();
    CascadePredictor::new(Arc::new(bundle))
}

fn zeros() -> FeatureVector {
    FeatureVector::zeros(FEATURE_DIM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_confirms_pain_scenario() {
        let p = predictor(0.9, 0.6, Some(0.40), Some(0.8));
        let r = p.predict_features(&zeros(), Sensitivity::Balanced).unwrap();
        assert_eq!(r.label, "pain_discomfort");
        assert_eq!(r.stage, Stage::CascadeConfirmed);
        assert!((r.confidence - 0.40).abs() < 1e-12);
        assert_eq!(r.severity, Severity::Medium);
        assert_eq!(r.pain_probability, Some(0.6));
        assert_eq!(r.cascade_probability, Some(0.40));
        assert_eq!(r.cascade_cut, Some(0.365));
    }

    #[test]
    fn test_sensitivity_monotonicity() {
        // Between the high (0.25) and balanced (0.365) cuts
        let p = predictor(0.9, 0.7, Some(0.30), Some(0.8));
        let high = p.predict_features(&zeros(), Sensitivity::High).unwrap();
        let balanced = p.predict_features(&zeros(), Sensitivity::Balanced).unwrap();
        assert_eq!(high.label, "pain_discomfort");
        assert_eq!(high.stage, Stage::CascadeConfirmed);
        assert_eq!(balanced.stage, Stage::CascadeFiltered);
        assert_eq!(balanced.label, "emotional");
        assert_eq!(balanced.pain_probability, Some(0.7));
        assert_eq!(balanced.cascade_probability, Some(0.30));
    }

    #[test]
    fn test_cut_boundary_is_inclusive() {
        let p = predictor(0.9, 0.6, Some(0.365), Some(0.8));
        let r = p.predict_features(&zeros(), Sensitivity::Balanced).unwrap();
        assert_eq!(r.stage, Stage::CascadeConfirmed);

        let p = predictor(0.9, 0.5, None, Some(0.8));
        let r = p.predict_features(&zeros(), Sensitivity::Balanced).unwrap();
        assert_eq!(r.stage, Stage::PrimaryPain);
    }

    #[test]
    fn test_not_cry_terminates_at_detect() {
        for sensitivity in Sensitivity::ALL {
            let p = predictor(0.2, 0.99, Some(0.99), Some(0.8));
            let r = p.predict_features(&zeros(), sensitivity).unwrap();
            assert_eq!(r.label, "not_cry");
            assert_eq!(r.stage, Stage::Detect);
            assert_eq!(r.severity, Severity::None);
            assert!((r.confidence - 0.8).abs() < 1e-12);
            assert!(r.pain_probability.is_none());
        }
    }

    #[test]
    fn test_without_cascade_never_reports_cascade_stages() {
        for (p_primary, expected) in [(0.9, Stage::PrimaryPain), (0.2, Stage::PrimaryNonpain)] {
            let p = predictor(0.9, p_primary, None, Some(0.6));
            for sensitivity in Sensitivity::ALL {
                let r = p.predict_features(&zeros(), sensitivity).unwrap();
                assert_eq!(r.stage, expected);
                assert!(r.cascade_probability.is_none());
            }
        }
        let r = predictor(0.9, 0.9, None, Some(0.6))
            .predict_features(&zeros(), Sensitivity::Precise)
            .unwrap();
        assert_eq!(r.label, "pain_discomfort");
        assert!((r.confidence - 0.9).abs() < 1e-12);
        assert_eq!(r.severity, Severity::High);
    }

    #[test]
    fn test_primary_nonpain_uses_categorizer() {
        let p = predictor(0.9, 0.3, Some(0.9), Some(0.75));
        let r = p.predict_features(&zeros(), Sensitivity::High).unwrap();
        assert_eq!(r.stage, Stage::PrimaryNonpain);
        assert_eq!(r.label, "emotional");
        assert!((r.confidence - 0.75).abs() < 1e-12);
        assert_eq!(r.severity, Severity::High);
        assert!(r.cascade_probability.is_none());
        assert_eq!(r.probabilities.len(), 2);
    }

    #[test]
    fn test_missing_categorizer_falls_back_to_needs_attention() {
        let p = predictor(0.9, 0.3, Some(0.9), None);
        let r = p.predict_features(&zeros(), Sensitivity::Balanced).unwrap();
        assert_eq!(r.label, "needs_attention");
        assert_eq!(r.stage, Stage::PrimaryNonpain);
        assert!((r.confidence - 0.7).abs() < 1e-12);
        assert_eq!(r.severity, Severity::Medium);

        let p = predictor(0.9, 0.8, Some(0.1), None);
        let r = p.predict_features(&zeros(), Sensitivity::Precise).unwrap();
        assert_eq!(r.label, "needs_attention");
        assert_eq!(r.stage, Stage::CascadeFiltered);
        assert!((r.confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let p = predictor(0.9, 0.6, Some(0.4), Some(0.8));
        let v = FeatureVector::new((0..FEATURE_DIM).map(|i| i as f32 * 0.01).collect());
        let a = p.predict_features(&v, Sensitivity::Balanced).unwrap();
        let b = p.predict_features(&v, Sensitivity::Balanced).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_bundle_across_threads() {
        let p = predictor(0.9, 0.6, Some(0.3), Some(0.8));
        let handles: Vec<_> = Sensitivity::ALL
            .into_iter()
            .map(|s| {
                let p = p.clone();
                std::thread::spawn(move || p.predict_features(&zeros(), s).unwrap().stage)
            })
            .collect();
        let stages: Vec<Stage> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            stages,
            vec![Stage::CascadeConfirmed, Stage::CascadeFiltered, Stage::CascadeFiltered]
        );
    }

    #[test]
    fn test_wrong_width_is_inference_failure() {
        let p = predictor(0.9, 0.6, Some(0.4), Some(0.8));
        let err = p
            .predict_features(&FeatureVector::zeros(10), Sensitivity::Balanced)
            .unwrap_err();
        assert!(matches!(err, CryError::InferenceFailed(_)));
    }

    #[test]
    fn test_cascade_scaler_falls_back_to_primary() {
        let cascade = StageModel::with_fallback(
            StageId::Cascade,
            fixed(&["non_pain", "pain"], &[0.5, 0.5]),
            StageId::PrimaryPain,
        );
        let bundle = ModelBundle::new(
            detector(0.9),
            pain_stage(StageId::PrimaryPain, 0.6),
            Some(cascade),
            Some(categorizer(0.8)),
            Thresholds::default(),
        )
        .unwrap();
        let r = CascadePredictor::new(Arc::new(bundle))
            .predict_features(&zeros(), Sensitivity::Balanced)
            .unwrap();
        assert_eq!(r.stage, Stage::CascadeConfirmed);
    }

    #[test]
    fn test_only_cascade_may_borrow_a_scaler() {
        let nonpain = StageModel::with_fallback(
            StageId::NonPain,
            fixed(&["emotional", "needs_attention"], &[0.5, 0.5]),
            StageId::PrimaryPain,
        );
        let err = ModelBundle::new(
            detector(0.9),
            pain_stage(StageId::PrimaryPain, 0.6),
            None,
            Some(nonpain),
            Thresholds::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CryError::ModelNotLoaded(_)));
    }

    #[test]
    fn test_detector_must_know_not_cry() {
        let bad = StageModel::new(
            StageId::Detector,
            fixed(&["cry", "laugh"], &[0.5, 0.5]),
            identity_scaler(),
        );
        let err = ModelBundle::new(
            bad,
            pain_stage(StageId::PrimaryPain, 0.6),
            None,
            None,
            Thresholds::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CryError::ModelNotLoaded(_)));
    }

    #[test]
    fn test_empty_clip_becomes_error_result() {
        let p = predictor(0.9, 0.6, Some(0.4), Some(0.8));
        let clip = AudioClip::new(Vec::new(), 22050);
        assert!(matches!(
            p.predict(&clip, Sensitivity::High),
            Err(CryError::ExtractionFailed(_))
        ));
        let r = p.predict_or_error(&clip, Sensitivity::High);
        assert!(r.is_error());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.stage, Stage::ExtractionFailed);
    }

    #[test]
    fn test_predict_from_samples() {
        let p = predictor(0.9, 0.6, Some(0.4), Some(0.8));
        let samples: Vec<f32> = (0..16000).map(|i| (i as f32 * 0.1).sin() * 0.2).collect();
        let r = p.predict(&AudioClip::new(samples, 16000), Sensitivity::Balanced).unwrap();
        assert_eq!(r.stage, Stage::CascadeConfirmed);
    }
}
