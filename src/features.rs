//! Log-mel spectrogram features.
//!
//! Parameters:
//! - Mel bands: 128 (Slaney scale, Slaney area normalization)
//! - FFT size: 2048, hop length: 512, periodic Hann window
//! - Frames are centered (input zero-padded by `N_FFT / 2` on both sides)
//! - Power is converted to dB relative to the spectrogram maximum, floored
//!   80 dB below it
//! - Output is always `N_MELS x TARGET_FRAMES`; missing frames are filled
//!   with the floor value

use crate::audio::{AudioSource, load_mono};
use crate::error::{Error, Result};
use ndarray::{Array2, s};
use rustfft::{FftPlanner, num_complex::Complex};

/// Number of mel bands.
pub const N_MELS: usize = 128;
/// FFT window length in samples.
pub const N_FFT: usize = 2048;
/// Hop between frames in samples.
pub const HOP_LENGTH: usize = 512;
/// Fixed number of time frames in a [`FeatureTensor`].
pub const TARGET_FRAMES: usize = 512;
/// Dynamic range kept below the spectrogram maximum.
pub const TOP_DB: f32 = 80.0;
/// Value of silence in the dB-scaled output.
pub const DB_FLOOR: f32 = -TOP_DB;

const AMIN: f32 = 1e-10;

/// Log-mel spectrogram of fixed shape `N_MELS x TARGET_FRAMES`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    data: Array2<f32>,
}

impl FeatureTensor {
    /// Wrap an array, validating its shape.
    ///
    /// # Errors
    /// Returns [`Error::FeatureExtraction`] if the shape is not
    /// `N_MELS x TARGET_FRAMES`.
    pub fn new(data: Array2<f32>) -> Result<Self> {
        if data.dim() != (N_MELS, TARGET_FRAMES) {
            return Err(Error::FeatureExtraction {
                reason: format!(
                    "feature tensor must be {N_MELS}x{TARGET_FRAMES}, got {:?}",
                    data.dim()
                ),
            });
        }
        Ok(Self { data })
    }

    /// Tensor containing only silence.
    #[must_use]
    pub fn silence() -> Self {
        Self {
            data: Array2::from_elem((N_MELS, TARGET_FRAMES), DB_FLOOR),
        }
    }

    /// `(mel bins, frames)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Borrow the underlying array.
    #[must_use]
    pub const fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    /// Take the underlying array.
    #[must_use]
    pub fn into_array(self) -> Array2<f32> {
        self.data
    }
}

/// Decode `source` at `target_sample_rate` and compute its feature tensor.
///
/// # Errors
/// Returns [`Error::FeatureExtraction`] if the audio cannot be decoded.
pub fn extract(source: &AudioSource, target_sample_rate: u32) -> Result<FeatureTensor> {
    let samples = load_mono(source, target_sample_rate)?;
    Ok(features_from_samples(&samples, target_sample_rate))
}

/// Compute the feature tensor of mono samples at `sample_rate`.
#[must_use]
pub fn features_from_samples(samples: &[f32], sample_rate: u32) -> FeatureTensor {
    let mut mel = mel_spectrogram(samples, sample_rate, TARGET_FRAMES);
    power_to_db_inplace(&mut mel);

    let frames = mel.ncols();
    let mut data = Array2::from_elem((N_MELS, TARGET_FRAMES), DB_FLOOR);
    data.slice_mut(s![.., ..frames]).assign(&mel);
    FeatureTensor { data }
}

/// Number of centered frames for a signal of `len` samples.
#[must_use]
pub const fn frame_count(len: usize) -> usize {
    1 + len / HOP_LENGTH
}

/// Mel power spectrogram (`N_MELS x frames`), keeping at most `max_frames`
/// frames from the start of the signal.
#[must_use]
pub fn mel_spectrogram(samples: &[f32], sample_rate: u32, max_frames: usize) -> Array2<f32> {
    let n_bins = N_FFT / 2 + 1;
    let frames = frame_count(samples.len()).min(max_frames);
    let window = hann_window(N_FFT);
    let pad = N_FFT / 2;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(N_FFT);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); N_FFT];
    let mut power = Array2::<f32>::zeros((n_bins, frames));

    for frame in 0..frames {
        let start = frame * HOP_LENGTH;
        for (i, slot) in buffer.iter_mut().enumerate() {
            // Position in the unpadded signal.
            let sample = (start + i)
                .checked_sub(pad)
                .and_then(|idx| samples.get(idx))
                .copied()
                .unwrap_or(0.0);
            *slot = Complex::new(sample * window[i], 0.0);
        }
        fft.process(&mut buffer);
        for (k, value) in buffer.iter().take(n_bins).enumerate() {
            power[[k, frame]] = value.norm_sqr();
        }
    }

    mel_filterbank(sample_rate).dot(&power)
}

/// Convert power to dB relative to the maximum, clamped to `TOP_DB` below it.
pub fn power_to_db_inplace(spec: &mut Array2<f32>) {
    let reference = spec.iter().copied().fold(0.0f32, f32::max);
    let ref_db = 10.0 * reference.max(AMIN).log10();
    spec.mapv_inplace(|p| 10.0f32.mul_add(p.max(AMIN).log10(), -ref_db));
    let peak = spec.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - TOP_DB;
    spec.mapv_inplace(|db| db.max(floor));
}

/// Periodic Hann window.
#[allow(clippy::cast_precision_loss)]
fn hann_window(length: usize) -> Vec<f32> {
    (0..length)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * n as f32 / length as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Slaney-normalized triangular filterbank, shape `[N_MELS, N_FFT / 2 + 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn mel_filterbank(sample_rate: u32) -> Array2<f32> {
    let n_bins = N_FFT / 2 + 1;
    let sr = f64::from(sample_rate);
    let fft_freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * sr / N_FFT as f64).collect();

    let mel_max = hz_to_mel(sr / 2.0);
    let mel_freqs: Vec<f64> = (0..N_MELS + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (N_MELS + 1) as f64))
        .collect();

    let mut weights = Array2::<f32>::zeros((N_MELS, n_bins));
    for m in 0..N_MELS {
        let (left, center, right) = (mel_freqs[m], mel_freqs[m + 1], mel_freqs[m + 2]);
        let enorm = 2.0 / (right - left);
        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            let w = lower.min(upper).max(0.0);
            weights[[m, k]] = (w * enorm) as f32;
        }
    }
    weights
}
