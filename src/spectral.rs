//! Spectral processing utilities (STFT, filterbanks, frame descriptors)

use ndarray::{Array1, Array2, Axis};
use rustfft::{num_complex::Complex32, FftPlanner};
use std::f32::consts::PI;

/// Floor applied before taking logarithms of power values
pub const AMIN: f32 = 1e-10;

/// STFT data structure
#[derive(Debug, Clone)]
pub struct StftData {
    /// Complex spectrum, shape (n_fft / 2 + 1, n_frames)
    pub s: Array2<Complex32>,
    pub freqs: Vec<f32>,
    pub times: Vec<f32>,
}

/// Compute STFT of audio signal.
///
/// With `center`, the signal is zero-padded by `n_fft / 2` on both sides so frame `t`
/// is centered on sample `t * hop_length`. Signals shorter than one frame are
/// zero-padded to a single frame.
pub fn stft(
    y: &[f32],
    n_fft: usize,
    hop_length: usize,
    window: &str,
    sample_rate: u32,
    center: bool,
) -> StftData {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);

    let mut padded: Vec<f32> = if center {
        let pad = n_fft / 2;
        let mut v = vec![0.0; pad];
        v.extend_from_slice(y);
        v.extend(std::iter::repeat(0.0).take(pad));
        v
    } else {
        y.to_vec()
    };
    if padded.len() < n_fft {
        padded.resize(n_fft, 0.0);
    }

    let n_frames = (padded.len() - n_fft) / hop_length + 1;
    let n_bins = n_fft / 2 + 1;
    let mut s = Array2::<Complex32>::zeros((n_bins, n_frames));

    let window_fn = generate_window(window, n_fft);

    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length;

        let mut frame: Vec<Complex32> = padded[start..start + n_fft]
            .iter()
            .zip(&window_fn)
            .map(|(&sample, &win)| Complex32::new(sample * win, 0.0))
            .collect();

        fft.process(&mut frame);

        for (i, &val) in frame[..n_bins].iter().enumerate() {
            s[[i, frame_idx]] = val;
        }
    }

    let freqs = fft_frequencies(sample_rate, n_fft);

    let times: Vec<f32> = (0..n_frames)
        .map(|i| i as f32 * hop_length as f32 / sample_rate as f32)
        .collect();

    StftData { s, freqs, times }
}

/// Center frequency of every non-negative FFT bin
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    (0..n_fft / 2 + 1)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// Generate window function (periodic Hann, as used for spectral analysis)
fn generate_window(window_type: &str, size: usize) -> Vec<f32> {
    match window_type {
        "hann" => (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
            .collect(),
        _ => vec![1.0; size],
    }
}

/// Compute magnitude spectrogram
pub fn magnitude_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm())
}

/// Compute power spectrogram
pub fn power_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm_sqr())
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank, shape (n_mels, n_fft / 2 + 1), area-normalized per filter
pub fn mel_filter_bank(n_mels: usize, n_fft: usize, sample_rate: u32, fmin: f32, fmax: f32) -> Array2<f32> {
    let freqs = fft_frequencies(sample_rate, n_fft);
    let low_mel = hz_to_mel(fmin);
    let high_mel = hz_to_mel(fmax);
    let step = (high_mel - low_mel) / (n_mels + 1) as f32;
    let hz_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(low_mel + i as f32 * step))
        .collect();

    let mut bank = Array2::<f32>::zeros((n_mels, freqs.len()));
    for m in 0..n_mels {
        let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        let enorm = 2.0 / (right - left);
        for (k, &f) in freqs.iter().enumerate() {
            let lower = (f - left) / (center - left);
            let upper = (right - f) / (right - center);
            let w = lower.min(upper).max(0.0);
            bank[[m, k]] = w * enorm;
        }
    }
    bank
}

/// Mel spectrogram from a power spectrogram
pub fn mel_spectrogram(power: &Array2<f32>, mel_bank: &Array2<f32>) -> Array2<f32> {
    mel_bank.dot(power)
}

/// Convert power values to decibels (ref = 1.0), clipped to `top_db` below the peak
pub fn power_to_db(power: &Array2<f32>, top_db: Option<f32>) -> Array2<f32> {
    let mut db = power.map(|&p| 10.0 * p.max(AMIN).log10());
    if let Some(top_db) = top_db {
        let peak = db.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - top_db;
        db.mapv_inplace(|v| v.max(floor));
    }
    db
}

/// Orthonormal DCT-II along the first axis, keeping the first `n_coeffs` rows
pub fn mfcc_from_db(mel_db: &Array2<f32>, n_coeffs: usize) -> Array2<f32> {
    let n = mel_db.nrows();
    let n_frames = mel_db.ncols();
    let mut basis = Array2::<f32>::zeros((n_coeffs, n));
    for k in 0..n_coeffs {
        let scale = if k == 0 {
            (1.0 / n as f32).sqrt()
        } else {
            (2.0 / n as f32).sqrt()
        };
        for i in 0..n {
            basis[[k, i]] = scale * (PI * k as f32 * (2 * i + 1) as f32 / (2 * n) as f32).cos();
        }
    }
    if n_frames == 0 {
        return Array2::zeros((n_coeffs, 0));
    }
    basis.dot(mel_db)
}

/// Regression delta along time (axis 1) over a `width`-frame window, edges replicated
pub fn delta(data: &Array2<f32>, width: usize) -> Array2<f32> {
    let half = (width / 2).max(1) as isize;
    let n_frames = data.ncols() as isize;
    let denom: f32 = 2.0 * (1..=half).map(|n| (n * n) as f32).sum::<f32>();
    let mut out = Array2::<f32>::zeros(data.raw_dim());
    if n_frames == 0 {
        return out;
    }

    for row in 0..data.nrows() {
        for t in 0..n_frames {
            let mut acc = 0.0;
            for n in 1..=half {
                let ahead = (t + n).min(n_frames - 1) as usize;
                let behind = (t - n).max(0) as usize;
                acc += n as f32 * (data[[row, ahead]] - data[[row, behind]]);
            }
            out[[row, t as usize]] = acc / denom;
        }
    }
    out
}

/// Magnitude-weighted mean frequency per frame
pub fn spectral_centroid(mag: &Array2<f32>, freqs: &[f32]) -> Vec<f32> {
    mag.axis_iter(Axis(1))
        .map(|frame| {
            let total: f32 = frame.sum();
            if total <= 0.0 {
                return 0.0;
            }
            frame.iter().zip(freqs).map(|(&m, &f)| m * f).sum::<f32>() / total
        })
        .collect()
}

/// Magnitude-weighted spread around the centroid per frame
pub fn spectral_bandwidth(mag: &Array2<f32>, freqs: &[f32], centroid: &[f32]) -> Vec<f32> {
    mag.axis_iter(Axis(1))
        .zip(centroid)
        .map(|(frame, &c)| {
            let total: f32 = frame.sum();
            if total <= 0.0 {
                return 0.0;
            }
            let spread: f32 = frame
                .iter()
                .zip(freqs)
                .map(|(&m, &f)| m * (f - c).powi(2))
                .sum();
            (spread / total).sqrt()
        })
        .collect()
}

/// Frequency below which `percent` of the frame's magnitude lies
pub fn spectral_rolloff(mag: &Array2<f32>, freqs: &[f32], percent: f32) -> Vec<f32> {
    mag.axis_iter(Axis(1))
        .map(|frame| {
            let threshold = percent * frame.sum();
            let mut cumulative = 0.0;
            for (&m, &f) in frame.iter().zip(freqs) {
                cumulative += m;
                if cumulative >= threshold {
                    return f;
                }
            }
            freqs.last().copied().unwrap_or(0.0)
        })
        .collect()
}

/// Ratio of geometric to arithmetic mean of the power spectrum per frame
pub fn spectral_flatness(mag: &Array2<f32>) -> Vec<f32> {
    mag.axis_iter(Axis(1))
        .map(|frame| {
            let n = frame.len().max(1) as f32;
            let mut log_sum = 0.0f32;
            let mut sum = 0.0f32;
            for &m in frame.iter() {
                let p = (m * m).max(AMIN);
                log_sum += p.ln();
                sum += p;
            }
            (log_sum / n).exp() / (sum / n)
        })
        .collect()
}

/// Octave-band peak/valley contrast in dB, shape (n_bands + 1, n_frames)
pub fn spectral_contrast(
    mag: &Array2<f32>,
    freqs: &[f32],
    n_bands: usize,
    fmin: f32,
    quantile: f32,
) -> Array2<f32> {
    let n_frames = mag.ncols();
    let mut edges = vec![0.0f32];
    edges.extend((0..=n_bands).map(|i| fmin * 2.0f32.powi(i as i32)));

    let mut contrast = Array2::<f32>::zeros((n_bands + 1, n_frames));
    for k in 0..=n_bands {
        let (f_low, f_high) = (edges[k], edges[k + 1]);
        let in_band: Vec<usize> = freqs
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= f_low && f <= f_high)
            .map(|(i, _)| i)
            .collect();
        let (Some(&first), Some(&last)) = (in_band.first(), in_band.last()) else {
            continue;
        };
        let lo = if k > 0 { first.saturating_sub(1) } else { first };
        let hi = if k == n_bands {
            freqs.len() - 1
        } else {
            last.saturating_sub(1).max(lo)
        };
        let band_len = hi - lo + 1;
        let take = ((quantile * band_len as f32).round() as usize).clamp(1, band_len);

        for t in 0..n_frames {
            let mut band: Vec<f32> = (lo..=hi).map(|i| mag[[i, t]]).collect();
            band.sort_by(f32::total_cmp);
            let valley = band[..take].iter().sum::<f32>() / take as f32;
            let peak = band[band_len - take..].iter().sum::<f32>() / take as f32;
            contrast[[k, t]] =
                10.0 * peak.max(AMIN).log10() - 10.0 * valley.max(AMIN).log10();
        }
    }
    contrast
}

/// Pitch-class energy profile, shape (12, n_frames), each frame scaled to a max of 1
pub fn chroma(power: &Array2<f32>, freqs: &[f32]) -> Array2<f32> {
    let n_frames = power.ncols();
    let mut chroma = Array2::<f32>::zeros((12, n_frames));

    // Pitch class (C = 0) of every bin above the lowest piano key
    let classes: Vec<Option<usize>> = freqs
        .iter()
        .map(|&f| {
            if f < 27.5 {
                None
            } else {
                let midi = 69.0 + 12.0 * (f / 440.0).log2();
                Some((midi.round() as i64).rem_euclid(12) as usize)
            }
        })
        .collect();

    for (k, class) in classes.iter().enumerate() {
        if let Some(c) = *class {
            for t in 0..n_frames {
                chroma[[c, t]] += power[[k, t]];
            }
        }
    }

    for mut frame in chroma.axis_iter_mut(Axis(1)) {
        let peak = frame.iter().cloned().fold(0.0f32, f32::max);
        if peak > 0.0 {
            frame.mapv_inplace(|v| v / peak);
        }
    }
    chroma
}

/// Tonal centroid (fifths, minor thirds, major thirds), shape (6, n_frames)
pub fn tonnetz(chroma: &Array2<f32>) -> Array2<f32> {
    let scale = [7.0 / 6.0, 7.0 / 6.0, 3.0 / 2.0, 3.0 / 2.0, 2.0 / 3.0, 2.0 / 3.0];
    let radius = [1.0, 1.0, 1.0, 1.0, 0.5, 0.5];
    let mut phi = Array2::<f32>::zeros((6, 12));
    for i in 0..6 {
        let shift = if i % 2 == 0 { 0.5 } else { 0.0 };
        for l in 0..12 {
            phi[[i, l]] = radius[i] * (PI * (scale[i] * l as f32 - shift)).cos();
        }
    }

    let mut normalized = chroma.clone();
    for mut frame in normalized.axis_iter_mut(Axis(1)) {
        let total: f32 = frame.iter().map(|v| v.abs()).sum();
        if total > 0.0 {
            frame.mapv_inplace(|v| v / total);
        }
    }
    phi.dot(&normalized)
}

/// Positive log-mel flux averaged over bands; frame 0 is zero
pub fn onset_strength(mel_db: &Array2<f32>) -> Vec<f32> {
    let n_frames = mel_db.ncols();
    let n_bands = mel_db.nrows().max(1) as f32;
    let mut flux = vec![0.0; n_frames];

    for t in 1..n_frames {
        let mut frame_flux = 0.0;
        for f in 0..mel_db.nrows() {
            let diff = mel_db[[f, t]] - mel_db[[f, t - 1]];
            if diff > 0.0 {
                frame_flux += diff;
            }
        }
        flux[t] = frame_flux / n_bands;
    }

    flux
}

/// Estimate tempo (BPM) from an onset envelope by autocorrelation weighted with a
/// log-normal prior around `start_bpm`. A flat envelope yields 0.0.
pub fn estimate_tempo(
    onset_env: &[f32],
    sample_rate: u32,
    hop_length: usize,
    start_bpm: f32,
    min_bpm: f32,
    max_bpm: f32,
) -> f32 {
    let n = onset_env.len();
    if n < 3 {
        return 0.0;
    }
    let mean = onset_env.iter().sum::<f32>() / n as f32;
    let centered: Vec<f32> = onset_env.iter().map(|&v| v - mean).collect();
    let energy: f32 = centered.iter().map(|v| v * v).sum();
    if energy <= f32::EPSILON {
        return 0.0;
    }

    let fps = sample_rate as f32 / hop_length as f32;
    let min_lag = ((60.0 * fps / max_bpm).ceil() as usize).max(1);
    let max_lag = ((60.0 * fps / min_bpm).floor() as usize).min(n - 1);
    if min_lag > max_lag {
        return 0.0;
    }

    let mut best_bpm = 0.0;
    let mut best_score = 0.0f32;
    for lag in min_lag..=max_lag {
        let ac: f32 = centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum::<f32>()
            / energy;
        let bpm = 60.0 * fps / lag as f32;
        let prior = (-0.5 * (bpm.log2() - start_bpm.log2()).powi(2)).exp();
        let score = ac * prior;
        if score > best_score {
            best_score = score;
            best_bpm = bpm;
        }
    }
    best_bpm
}

/// Slice a signal into `frame_length` frames every `hop_length` samples, centered,
/// padding the edges by repeating the boundary samples
pub fn frame_signal_edge(y: &[f32], frame_length: usize, hop_length: usize) -> Vec<Vec<f32>> {
    if y.is_empty() {
        return Vec::new();
    }
    let pad = frame_length / 2;
    let first = y[0];
    let last = y[y.len() - 1];
    let mut padded = vec![first; pad];
    padded.extend_from_slice(y);
    padded.extend(std::iter::repeat(last).take(pad));
    split_frames(&padded, frame_length, hop_length)
}

/// Like [`frame_signal_edge`] but zero-padded
pub fn frame_signal_zero(y: &[f32], frame_length: usize, hop_length: usize) -> Vec<Vec<f32>> {
    if y.is_empty() {
        return Vec::new();
    }
    let pad = frame_length / 2;
    let mut padded = vec![0.0; pad];
    padded.extend_from_slice(y);
    padded.extend(std::iter::repeat(0.0).take(pad));
    split_frames(&padded, frame_length, hop_length)
}

fn split_frames(padded: &[f32], frame_length: usize, hop_length: usize) -> Vec<Vec<f32>> {
    let mut padded = padded.to_vec();
    if padded.len() < frame_length {
        padded.resize(frame_length, 0.0);
    }
    let n_frames = (padded.len() - frame_length) / hop_length + 1;
    (0..n_frames)
        .map(|i| padded[i * hop_length..i * hop_length + frame_length].to_vec())
        .collect()
}

/// Per-frame fraction of sign changes
pub fn zero_crossing_rate(y: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    frame_signal_edge(y, frame_length, hop_length)
        .iter()
        .map(|frame| crate::audio::zero_crossings(frame) as f32 / frame_length as f32)
        .collect()
}

/// Per-frame root-mean-square energy
pub fn rms_energy(y: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    frame_signal_zero(y, frame_length, hop_length)
        .iter()
        .map(|frame| (frame.iter().map(|&x| x * x).sum::<f32>() / frame_length as f32).sqrt())
        .collect()
}

/// Mean and population std over every element of a 2-D feature
pub fn global_mean_std(data: &Array2<f32>) -> (f32, f32) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let mean = data.mean().unwrap_or(0.0);
    let var = data.iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / data.len() as f32;
    (mean, var.sqrt())
}

/// Per-row (mean, std, max, min) summaries of a 2-D feature
pub fn row_stats(data: &Array2<f32>) -> Vec<[f32; 4]> {
    data.axis_iter(Axis(0))
        .map(|row| {
            let values: Array1<f32> = row.to_owned();
            let slice = values.as_slice().unwrap_or(&[]);
            [
                crate::audio::mean(slice),
                crate::audio::std_dev(slice),
                crate::audio::max(slice),
                crate::audio::min(slice),
            ]
        })
        .collect()
}
