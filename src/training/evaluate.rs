//! Pain-focused metrics for a labeled prediction run

use serde::{Deserialize, Serialize};

/// Metrics for one sensitivity preset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensitivityMetrics {
    pub accuracy: f64,
    pub pain_precision: f64,
    pub pain_recall: f64,
    pub pain_f1: f64,
    /// Pain cries labeled as something else
    pub false_negatives: usize,
    /// Non-pain clips labeled as pain
    pub false_positives: usize,
    /// `needs_attention` cries labeled as pain
    pub needs_attention_to_pain: usize,
}

/// Score predicted labels against ground truth; `pain_label` is the positive class
pub fn evaluate_labels(
    y_true: &[String],
    y_pred: &[String],
    pain_label: &str,
    needs_attention_label: &str,
) -> SensitivityMetrics {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return SensitivityMetrics::default();
    }

    let mut correct = 0;
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    let mut needs_to_pain = 0;
    for (t, p) in y_true.iter().zip(y_pred) {
        if t == p {
            correct += 1;
        }
        let true_pain = t == pain_label;
        let pred_pain = p == pain_label;
        match (true_pain, pred_pain) {
            (true, true) => tp += 1,
            (false, true) => {
                fp += 1;
                if t == needs_attention_label {
                    needs_to_pain += 1;
                }
            }
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    SensitivityMetrics {
        accuracy: correct as f64 / n as f64,
        pain_precision: precision,
        pain_recall: recall,
        pain_f1: f1,
        false_negatives: fn_,
        false_positives: fp,
        needs_attention_to_pain: needs_to_pain,
    }
}

/// Fraction of matching labels
pub fn accuracy(y_true: &[String], y_pred: &[String]) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return 0.0;
    }
    y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count() as f64 / n as f64
}
