//! Threshold calibration from held-out stage scores

use crate::config::CalibrationConfig;
use crate::error::{CryError, Result as CryResult};
use crate::thresholds::{CascadeCuts, Sensitivity, Thresholds};
use log::{info, warn};

/// One operating point of a precision-recall curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Precision and recall at every distinct score, ordered by increasing threshold.
///
/// A sample is predicted positive when `score >= threshold`. Returns an empty curve when
/// there are no positives, since recall is undefined.
pub fn precision_recall_curve(y_true: &[bool], scores: &[f64]) -> CryResult<Vec<PrPoint>> {
    if y_true.len() != scores.len() {
        return Err(CryError::TrainingError(format!(
            "{} labels for {} scores",
            y_true.len(),
            scores.len()
        )));
    }
    let total_pos = y_true.iter().filter(|&&y| y).count();
    if total_pos == 0 {
        return Ok(Vec::new());
    }

    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .copied()
        .zip(y_true.iter().copied())
        .filter(|(s, _)| s.is_finite())
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    // Sweep from the highest score down, emitting a point after each run of ties
    let mut curve = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        while i < pairs.len() && pairs[i].0 == threshold {
            if pairs[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        curve.push(PrPoint {
            threshold,
            precision: tp as f64 / (tp + fp) as f64,
            recall: tp as f64 / total_pos as f64,
        });
    }
    curve.reverse();
    Ok(curve)
}

/// Highest-precision point whose recall reaches `min_recall`; ties go to the lower threshold
pub fn max_precision_at_recall(curve: &[PrPoint], min_recall: f64) -> Option<PrPoint> {
    best_by(curve, |p| p.recall >= min_recall, |p| p.precision)
}

/// Highest-recall point whose precision reaches `min_precision`; ties go to the lower threshold
pub fn max_recall_at_precision(curve: &[PrPoint], min_precision: f64) -> Option<PrPoint> {
    best_by(curve, |p| p.precision >= min_precision, |p| p.recall)
}

fn best_by(
    curve: &[PrPoint],
    feasible: impl Fn(&PrPoint) -> bool,
    objective: impl Fn(&PrPoint) -> f64,
) -> Option<PrPoint> {
    let mut best: Option<PrPoint> = None;
    for point in curve.iter().filter(|p| feasible(p)) {
        match best {
            Some(b) if objective(point) <= objective(&b) => {}
            _ => best = Some(*point),
        }
    }
    best
}

/// Derives [`Thresholds`] from labeled held-out scores
#[derive(Debug, Clone)]
pub struct ThresholdCalibrator {
    config: CalibrationConfig,
}

impl ThresholdCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    /// Primary pain cut: max precision at the recall floor, or the configured fallback
    pub fn calibrate_primary(&self, y_pain: &[bool], scores: &[f64]) -> CryResult<f64> {
        let curve = precision_recall_curve(y_pain, scores)?;
        match max_precision_at_recall(&curve, self.config.primary_recall_floor) {
            Some(p) => {
                info!(
                    "Primary pain cut {:.3} (recall {:.1}%, precision {:.1}%)",
                    p.threshold,
                    p.recall * 100.0,
                    p.precision * 100.0
                );
                Ok(p.threshold)
            }
            None => {
                warn!(
                    "No primary cut reaches recall {:.2}; using {:.3}",
                    self.config.primary_recall_floor, self.config.primary_default_cut
                );
                Ok(self.config.primary_default_cut)
            }
        }
    }

    /// Per-sensitivity cascade cuts from one curve; infeasible targets keep `previous`
    pub fn calibrate_cascade(
        &self,
        y_pain: &[bool],
        scores: &[f64],
        previous: CascadeCuts,
    ) -> CryResult<CascadeCuts> {
        let curve = precision_recall_curve(y_pain, scores)?;
        let mut cuts = previous;

        for sensitivity in Sensitivity::ALL {
            let point = match sensitivity {
                Sensitivity::High => max_precision_at_recall(&curve, self.config.high_recall_floor),
                Sensitivity::Balanced => {
                    max_precision_at_recall(&curve, self.config.balanced_recall_floor)
                }
                Sensitivity::Precise => {
                    max_recall_at_precision(&curve, self.config.precise_precision_floor)
                }
            };
            match point {
                Some(p) => {
                    info!(
                        "Cascade cut [{}] {:.3} (recall {:.1}%, precision {:.1}%)",
                        sensitivity,
                        p.threshold,
                        p.recall * 100.0,
                        p.precision * 100.0
                    );
                    cuts.set(sensitivity, p.threshold);
                }
                None => warn!(
                    "Cascade target for [{}] is infeasible; keeping {:.3}",
                    sensitivity,
                    cuts.get(sensitivity)
                ),
            }
        }

        if self.config.enforce_cut_ordering {
            for raised in cuts.enforce_ordering() {
                warn!(
                    "Cascade cut [{}] raised to {:.3} to keep high <= balanced <= precise",
                    raised,
                    cuts.get(raised)
                );
            }
        }
        Ok(cuts)
    }

    /// Full threshold set; `cascade` is `None` when no cascade filter was trained
    pub fn calibrate(
        &self,
        primary: (&[bool], &[f64]),
        cascade: Option<(&[bool], &[f64])>,
    ) -> CryResult<Thresholds> {
        let defaults = self.config.defaults;
        let primary_pain_cut = self.calibrate_primary(primary.0, primary.1)?;
        let cascade_cuts = match cascade {
            Some((y, s)) => self.calibrate_cascade(y, s, defaults.cascade_cuts)?,
            None => defaults.cascade_cuts,
        };
        let thresholds = Thresholds {
            primary_pain_cut,
            cascade_cuts,
            ..defaults
        };
        thresholds.validate()?;
        Ok(thresholds)
    }
}
