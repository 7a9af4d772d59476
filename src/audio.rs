//! Audio I/O and clip normalization

use crate::config::AudioConfig;
use crate::error::{CryError, Result as CryResult};
use hound::WavReader;
use log::{debug, warn};
use rubato::{FftFixedInOut, Resampler};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// File extensions the loader can decode
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["wav", "wave", "flac", "mp3", "ogg", "oga"];

/// Extra source frames decoded past the clip window so the resampler has a tail
const DECODE_MARGIN_FRAMES: usize = 1024;

/// Window decoded when only checking that a file is readable
const VALIDATION_WINDOW_SEC: f32 = 10.0;

/// Mono audio signal with its sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Samples, mono, nominally within [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Load an audio file and normalize it to the configured rate and duration
    pub fn load<P: AsRef<Path>>(path: P, config: &AudioConfig) -> CryResult<Self> {
        let (samples, sr) = load_audio_head(path, Some(config.duration_sec))?;
        AudioClip::new(samples, sr).normalized(config)
    }

    /// Resample to `config.sample_rate`, then truncate or pad to `config.duration_sec`
    pub fn normalized(self, config: &AudioConfig) -> CryResult<Self> {
        if self.sample_rate == 0 {
            return Err(CryError::UnsupportedSampleRate(0));
        }
        let samples = if self.sample_rate == config.sample_rate {
            self.samples
        } else {
            resample(
                &self.samples,
                self.sample_rate,
                config.sample_rate,
                config.resample_chunk,
            )?
        };
        let samples = fit_to_duration(samples, config.clip_len(), config.pad_to_duration);
        Ok(AudioClip::new(samples, config.sample_rate))
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Load audio file and return mono samples with sample rate
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> CryResult<(Vec<f32>, u32)> {
    load_audio_head(path, None)
}

/// Load at most the first `max_duration_sec` seconds of an audio file (all of it for `None`)
pub fn load_audio_head<P: AsRef<Path>>(
    path: P,
    max_duration_sec: Option<f32>,
) -> CryResult<(Vec<f32>, u32)> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" | "wave" => load_wav_file(path, max_duration_sec),
        "flac" | "mp3" | "ogg" | "oga" => decode_compressed(path, max_duration_sec),
        _ => Err(CryError::InvalidAudioFormat(format!(
            "Unsupported audio format: {}",
            extension
        ))),
    }
}

/// Source frames to decode for a window, or `None` for the whole file
fn frame_limit(max_duration_sec: Option<f32>, sample_rate: u32) -> Option<usize> {
    max_duration_sec.map(|sec| {
        (sec.max(0.0) as f64 * sample_rate as f64).ceil() as usize + DECODE_MARGIN_FRAMES
    })
}

/// Average interleaved frames down to mono
fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Load WAV file, averaging channels down to mono
fn load_wav_file(path: &Path, max_duration_sec: Option<f32>) -> CryResult<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(CryError::InvalidAudioFormat(
            "WAV header declares zero channels".to_string(),
        ));
    }

    if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
        return Err(CryError::InvalidAudioFormat(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let sr = spec.sample_rate;
    let channels = spec.channels as usize;
    let limit = frame_limit(max_duration_sec, sr)
        .map(|frames| frames.saturating_mul(channels))
        .unwrap_or(usize::MAX);
    let mut interleaved: Vec<f32> = Vec::with_capacity((reader.len() as usize).min(limit));

    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>().take(limit) {
                interleaved.push(sample? as f32 / max_value);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>().take(limit) {
                interleaved.push(sample?);
            }
        }
    }

    Ok((downmix(interleaved, channels), sr))
}

/// Decode FLAC, MP3 or Ogg Vorbis through symphonia, averaging channels down to mono
fn decode_compressed(path: &Path, max_duration_sec: Option<f32>) -> CryResult<(Vec<f32>, u32)> {
    let file = File::open(path).map_err(|e| {
        CryError::AudioFileError(format!("Cannot open {}: {}", path.display(), e))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut format = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| CryError::InvalidAudioFormat(format!("{}: {}", path.display(), e)))?
        .format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            CryError::InvalidAudioFormat(format!("{}: no audio track", path.display()))
        })?;
    let track_id = track.id;
    let sr = track.codec_params.sample_rate.ok_or_else(|| {
        CryError::InvalidAudioFormat(format!("{}: unknown sample rate", path.display()))
    })?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CryError::InvalidAudioFormat(format!("{}: {}", path.display(), e)))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut channels = 0usize;
    let mut limit = usize::MAX;
    let mut sample_buf: Option<(usize, SampleBuffer<f32>)> = None;

    while interleaved.len() < limit {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                warn!("Stopped reading {}: {}", path.display(), e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => {
                return Err(CryError::InvalidAudioFormat(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count();
            limit = frame_limit(max_duration_sec, sr)
                .map(|frames| frames.saturating_mul(channels))
                .unwrap_or(usize::MAX);
        }
        let frames = decoded.capacity();
        if sample_buf.as_ref().map_or(true, |(cap, _)| *cap < frames) {
            sample_buf = Some((frames, SampleBuffer::<f32>::new(frames as u64, spec)));
        }
        if let Some((_, buf)) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    if channels == 0 {
        return Err(CryError::InvalidAudioFormat(format!(
            "{}: no decodable audio",
            path.display()
        )));
    }
    interleaved.truncate(limit);
    debug!(
        "Decoded {} frames at {} Hz from {}",
        interleaved.len() / channels,
        sr,
        path.display()
    );

    Ok((downmix(interleaved, channels), sr))
}

/// Write mono samples as a 32-bit float WAV file
pub fn write_wav_file<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> CryResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Validate audio file format and content
pub fn validate_audio_file<P: AsRef<Path>>(path: P) -> CryResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(CryError::AudioFileError(format!(
            "Audio file does not exist: {}",
            path.display()
        )));
    }

    let (samples, sr) = load_audio_head(path, Some(VALIDATION_WINDOW_SEC))?;

    if samples.is_empty() {
        return Err(CryError::ExtractionFailed(
            "Audio file contains no samples".to_string(),
        ));
    }

    if !(8000..=192000).contains(&sr) {
        return Err(CryError::UnsupportedSampleRate(sr));
    }

    let peak = samples.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
    if peak > 0.99 {
        warn!("{} may be clipped (peak = {:.3})", path.display(), peak);
    }

    Ok(())
}

/// Convert `samples` from `from_sr` to `to_sr` with an FFT resampler
pub fn resample(samples: &[f32], from_sr: u32, to_sr: u32, chunk: usize) -> CryResult<Vec<f32>> {
    if from_sr == to_sr || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedInOut::<f32>::new(from_sr as usize, to_sr as usize, chunk, 1)
        .map_err(|e| CryError::ResampleError(e.to_string()))?;

    let expected = (samples.len() as f64 * to_sr as f64 / from_sr as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(expected + delay + chunk);

    let mut pos = 0;
    // Keep feeding (zero-padded past the end) until the delayed tail is flushed
    while output.len() < expected + delay {
        let need = resampler.input_frames_next();
        let mut block = vec![0.0f32; need];
        if pos < samples.len() {
            let end = (pos + need).min(samples.len());
            block[..end - pos].copy_from_slice(&samples[pos..end]);
        }
        pos += need;

        let waves_in = vec![block];
        let out = resampler
            .process(&waves_in, None)
            .map_err(|e| CryError::ResampleError(e.to_string()))?;
        output.extend_from_slice(&out[0]);
    }

    Ok(output[delay..delay + expected].to_vec())
}

/// Truncate to `target_len`, zero-padding short clips when `pad` is set
pub fn fit_to_duration(mut samples: Vec<f32>, target_len: usize, pad: bool) -> Vec<f32> {
    if samples.len() > target_len {
        samples.truncate(target_len);
    } else if pad && !samples.is_empty() {
        samples.resize(target_len, 0.0);
    }
    samples
}

/// Apply gain to audio samples
pub fn apply_gain(samples: &[f32], gain_db: f32) -> Vec<f32> {
    let gain_linear = 10.0f32.powf(gain_db / 20.0);
    samples.iter().map(|&x| x * gain_linear).collect()
}

/// Scale so the absolute peak equals `target`; silent input is returned unchanged
pub fn peak_normalize(samples: &mut [f32], target: f32) {
    let peak = samples.iter().fold(0.0f32, |m, &x| m.max(x.abs()));
    if peak > 0.0 {
        let scale = target / peak;
        for s in samples.iter_mut() {
            *s *= scale;
        }
    }
}

/// Arithmetic mean; 0.0 for empty input
pub fn mean(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f32>() / data.len() as f32
}

/// Population standard deviation
pub fn std_dev(data: &[f32]) -> f32 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let var = data.iter().map(|&x| (x - m).powi(2)).sum::<f32>() / data.len() as f32;
    var.sqrt()
}

/// Maximum value; 0.0 for empty input
pub fn max(data: &[f32]) -> f32 {
    data.iter().cloned().reduce(f32::max).unwrap_or(0.0)
}

/// Minimum value; 0.0 for empty input
pub fn min(data: &[f32]) -> f32 {
    data.iter().cloned().reduce(f32::min).unwrap_or(0.0)
}

/// Zero crossing count
pub fn zero_crossings(samples: &[f32]) -> usize {
    if samples.len() < 2 {
        return 0;
    }

    samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count()
}
