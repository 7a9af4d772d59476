//! Labeled dataset discovery and parallel feature extraction

use super::augment::augment_clip;
use crate::audio::AudioClip;
use crate::bundle::NOT_CRY;
use crate::config::Config;
use crate::error::{CryError, Result as CryResult};
use crate::features::{extract_features, FeatureVector};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// One audio file and its category (`not_cry` for non-cry sounds)
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledClip {
    pub path: PathBuf,
    pub category: String,
}

impl LabeledClip {
    pub fn is_cry(&self) -> bool {
        self.category != NOT_CRY
    }
}

/// Extracted feature rows with their categories, in discovery order
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub features: Vec<FeatureVector>,
    pub categories: Vec<String>,
    /// Files that failed to load or extract
    pub skipped: usize,
}

impl Dataset {
    pub fn new(features: Vec<FeatureVector>, categories: Vec<String>) -> CryResult<Self> {
        if features.len() != categories.len() {
            return Err(CryError::DatasetError(format!(
                "{} feature rows for {} labels",
                features.len(),
                categories.len()
            )));
        }
        Ok(Self {
            features,
            categories,
            skipped: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn is_cry(&self, i: usize) -> bool {
        self.categories[i] != NOT_CRY
    }

    /// Positions of every cry row
    pub fn cry_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_cry(i)).collect()
    }

    /// Feature width, 0 for an empty dataset
    pub fn dim(&self) -> usize {
        self.features.first().map(FeatureVector::len).unwrap_or(0)
    }

    pub fn rows(&self, positions: &[usize]) -> Vec<Vec<f64>> {
        positions.iter().map(|&i| self.features[i].to_f64()).collect()
    }
}

/// Walk `<root>/<cry_dir>/<cause>/` and the not-cry directories for labeled audio
pub fn discover<P: AsRef<Path>>(root: P, config: &Config) -> CryResult<Vec<LabeledClip>> {
    let root = root.as_ref();
    let ds = &config.dataset;
    if !root.is_dir() {
        return Err(CryError::DatasetError(format!(
            "dataset root {} is not a directory",
            root.display()
        )));
    }

    let mut clips = Vec::new();
    let cry_root = root.join(&ds.cry_dir);
    if cry_root.is_dir() {
        for cause_dir in sorted_entries(&cry_root)? {
            if !cause_dir.is_dir() {
                continue;
            }
            let cause = file_name(&cause_dir);
            let Some(category) = ds.category_mapping.get(&cause) else {
                warn!("Skipping unmapped cry cause '{}'", cause);
                continue;
            };
            for path in audio_files(&cause_dir, &ds.extensions)? {
                clips.push(LabeledClip {
                    path,
                    category: category.clone(),
                });
            }
        }
    } else {
        warn!("No cry directory at {}", cry_root.display());
    }

    for dir in &ds.not_cry_dirs {
        let path = root.join(dir);
        if !path.is_dir() {
            debug!("No '{}' directory, skipping", dir);
            continue;
        }
        for file in audio_files(&path, &ds.extensions)? {
            clips.push(LabeledClip {
                path: file,
                category: NOT_CRY.to_string(),
            });
        }
    }

    if clips.is_empty() {
        return Err(CryError::DatasetError(format!(
            "no audio files found under {}",
            root.display()
        )));
    }
    info!(
        "Discovered {} clips ({} cries)",
        clips.len(),
        clips.iter().filter(|c| c.is_cry()).count()
    );
    Ok(clips)
}

/// Load and extract every clip in parallel, keeping input order.
///
/// With augmentation enabled each cry clip also contributes `per_sample` randomized
/// copies, seeded from the training seed and the clip's position.
pub fn build_dataset(clips: &[LabeledClip], config: &Config) -> CryResult<Dataset> {
    let augment = &config.training.augment;
    let seed = config.training.seed;

    let results: Vec<Option<Vec<(FeatureVector, String)>>> = clips
        .par_iter()
        .enumerate()
        .map(|(index, clip)| {
            let audio = match AudioClip::load(&clip.path, &config.audio) {
                Ok(a) => a,
                Err(e) => {
                    warn!("Skipping {}: {}", clip.path.display(), e);
                    return None;
                }
            };
            let mut variants = vec![audio.clone()];
            if augment.enabled && clip.is_cry() {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                for _ in 0..augment.per_sample {
                    variants.push(augment_clip(&audio, augment, &mut rng));
                }
            }

            let mut rows = Vec::with_capacity(variants.len());
            for variant in &variants {
                match extract_features(variant, &config.features) {
                    Ok(fv) => rows.push((fv, clip.category.clone())),
                    Err(e) => {
                        warn!("Skipping {}: {}", clip.path.display(), e);
                        return None;
                    }
                }
            }
            Some(rows)
        })
        .collect();

    let mut dataset = Dataset::default();
    for result in results {
        match result {
            Some(rows) => {
                for (fv, category) in rows {
                    dataset.features.push(fv);
                    dataset.categories.push(category);
                }
            }
            None => dataset.skipped += 1,
        }
    }

    if dataset.is_empty() {
        return Err(CryError::DatasetError(
            "every clip failed to load or extract".to_string(),
        ));
    }
    info!(
        "Extracted {} feature rows ({} files skipped)",
        dataset.len(),
        dataset.skipped
    );
    Ok(dataset)
}

fn sorted_entries(dir: &Path) -> CryResult<Vec<PathBuf>> {
    let list_err =
        |e: std::io::Error| CryError::DatasetError(format!("cannot list {}: {}", dir.display(), e));
    let mut entries = std::fs::read_dir(dir)
        .map_err(list_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(list_err)?;
    entries.sort();
    Ok(entries)
}

fn audio_files(dir: &Path, extensions: &[String]) -> CryResult<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
                .unwrap_or(false)
        })
        .collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
