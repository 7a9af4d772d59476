//! Offline training: dataset assembly, stage fitting, calibration and evaluation

pub mod augment;
pub mod dataset;
pub mod evaluate;
pub mod pipeline;
pub mod split;

pub use dataset::{build_dataset, discover, Dataset, LabeledClip};
pub use evaluate::SensitivityMetrics;
pub use pipeline::{TrainedStage, TrainedStages, Trainer, TrainingReport};
