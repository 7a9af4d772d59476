//! Waveform augmentation for growing small cry classes

use crate::audio::{self, AudioClip};
use crate::config::AugmentConfig;
use rand::Rng;

/// Add zero-mean Gaussian noise with standard deviation `level`
pub fn add_noise<R: Rng>(samples: &[f32], level: f32, rng: &mut R) -> Vec<f32> {
    samples.iter().map(|&x| x + level * gaussian(rng)).collect()
}

/// Rotate the signal by `shift` samples (positive moves content later)
pub fn time_shift(samples: &[f32], shift: isize) -> Vec<f32> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let k = shift.rem_euclid(n as isize) as usize;
    let mut out = Vec::with_capacity(n);
    out.extend_from_slice(&samples[n - k..]);
    out.extend_from_slice(&samples[..n - k]);
    out
}

/// One randomized copy: noise, gain and shift, then peak-normalized to 0.9
pub fn augment_clip<R: Rng>(clip: &AudioClip, config: &AugmentConfig, rng: &mut R) -> AudioClip {
    let level = rng.gen_range(config.noise_range[0]..=config.noise_range[1]);
    let mut samples = add_noise(&clip.samples, level, rng);

    let factor = rng.gen_range(config.gain_range[0]..=config.gain_range[1]);
    if factor > 0.0 {
        samples = audio::apply_gain(&samples, 20.0 * factor.log10());
    }

    let max_shift = (config.max_shift_sec * clip.sample_rate as f32) as isize;
    if max_shift > 0 {
        samples = time_shift(&samples, rng.gen_range(-max_shift..=max_shift));
    }

    audio::peak_normalize(&mut samples, 0.9);
    AudioClip::new(samples, clip.sample_rate)
}

// Box-Muller
fn gaussian<R: Rng>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::MIN_POSITIVE..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}
