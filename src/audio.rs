//! Audio decoding, downmixing and resampling.

use crate::error::{Error, Result};
use std::fmt;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Highest sample rate a model may declare.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Check that `rate` is a usable model sample rate.
pub(crate) fn check_sample_rate(rate: u32) -> std::result::Result<(), String> {
    if rate == 0 || rate > MAX_SAMPLE_RATE {
        return Err(format!(
            "sample rate {rate} Hz is outside 1..={MAX_SAMPLE_RATE} Hz"
        ));
    }
    Ok(())
}

/// Audio input: a file on disk or named in-memory bytes.
#[derive(Clone)]
pub enum AudioSource {
    /// File on disk.
    Path(PathBuf),
    /// Encoded audio held in memory. The name is used for format detection.
    Memory {
        /// Original file name.
        name: String,
        /// Encoded bytes.
        data: Vec<u8>,
    },
}

impl AudioSource {
    /// In-memory source.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Memory {
            name: name.into(),
            data,
        }
    }

    /// Name used in log lines and error messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Memory { name, .. } => name.clone(),
        }
    }

    fn extension(&self) -> Option<String> {
        let path = match self {
            Self::Path(path) => path.as_path(),
            Self::Memory { name, .. } => Path::new(name),
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    fn open(&self) -> Result<Box<dyn MediaSource>> {
        match self {
            Self::Path(path) => {
                let file = File::open(path).map_err(|e| Error::FeatureExtraction {
                    reason: format!("failed to open {}: {e}", path.display()),
                })?;
                Ok(Box::new(file))
            }
            Self::Memory { data, .. } => Ok(Box::new(Cursor::new(data.clone()))),
        }
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Memory { name, data } => f
                .debug_struct("Memory")
                .field("name", name)
                .field("bytes", &data.len())
                .finish(),
        }
    }
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for AudioSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Decoded interleaved samples.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved `f32` samples.
    pub samples: Vec<f32>,
    /// Source sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: usize,
}

impl DecodedAudio {
    /// Average all channels into one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        let scale = 1.0 / self.channels as f32;
        self.samples
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }
}

/// Decode the whole source into interleaved samples.
///
/// # Errors
/// Returns [`Error::FeatureExtraction`] carrying the decoder message if the
/// source cannot be opened, probed or decoded, or yields no samples.
pub fn decode(source: &AudioSource) -> Result<DecodedAudio> {
    decode_inner(source).map_err(|reason| Error::FeatureExtraction {
        reason: format!("could not decode {}: {reason}", source.display_name()),
    })
}

fn decode_inner(source: &AudioSource) -> std::result::Result<DecodedAudio, String> {
    let media = source.open().map_err(|e| e.to_string())?;
    let mss = MediaSourceStream::new(media, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = source.extension() {
        hint.with_extension(&ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("probe failed: {e}"))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| "no default audio track".to_string())?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| format!("no decoder: {e}"))?;

    let mut samples = Vec::new();
    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count());

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(format!("packet read failed: {e}")),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frame; skip it like other decoders do.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(format!("decode failed: {e}")),
        };
        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count());

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() {
        return Err("decoded 0 samples".to_string());
    }
    let sample_rate = sample_rate.ok_or_else(|| "missing sample rate".to_string())?;

    Ok(DecodedAudio {
        samples,
        sample_rate: sample_rate.max(1),
        channels: channels.unwrap_or(1).max(1),
    })
}

/// Linear-interpolation resampler.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample_linear(samples: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    let input_rate = input_rate.max(1);
    let output_rate = output_rate.max(1);
    if samples.is_empty() || input_rate == output_rate {
        return samples.to_vec();
    }
    let ratio = f64::from(input_rate) / f64::from(output_rate);
    let out_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx0 = (pos.floor() as usize).min(last);
            let idx1 = (idx0 + 1).min(last);
            let frac = (pos - idx0 as f64).clamp(0.0, 1.0) as f32;
            let a = samples[idx0];
            let b = samples[idx1];
            (b - a).mul_add(frac, a)
        })
        .collect()
}

/// Decode, downmix to mono and resample to `target_sample_rate`.
///
/// # Errors
/// Returns [`Error::FeatureExtraction`] if the source cannot be decoded.
pub fn load_mono(source: &AudioSource, target_sample_rate: u32) -> Result<Vec<f32>> {
    let decoded = decode(source)?;
    let mono = decoded.to_mono();
    tracing::debug!(
        source = %source.display_name(),
        sample_rate = decoded.sample_rate,
        channels = decoded.channels,
        frames = mono.len(),
        "decoded audio"
    );
    Ok(resample_linear(&mono, decoded.sample_rate, target_sample_rate))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::testutil::{sine_wave, wav_bytes, write_wav};

    #[test]
    fn test_decode_wav_from_memory() {
        let samples = sine_wave(440.0, 16_000, 8_000);
        let source = AudioSource::from_bytes("tone.wav", wav_bytes(&samples, 16_000, 1));

        let decoded = decode(&source).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), 8_000);
    }

    #[test]
    fn test_decode_wav_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, &sine_wave(220.0, 22_050, 4_410), 22_050, 1);

        let decoded = decode(&AudioSource::from(path.as_path())).unwrap();
        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.samples.len(), 4_410);
    }

    #[test]
    fn test_decode_garbage_fails_with_feature_extraction() {
        let source = AudioSource::from_bytes("noise.wav", b"definitely not audio".to_vec());
        let err = decode(&source).unwrap_err();
        assert!(matches!(err, Error::FeatureExtraction { .. }));
        assert!(err.to_string().contains("noise.wav"));
    }

    #[test]
    fn test_decode_missing_file_fails() {
        let source = AudioSource::Path(PathBuf::from("/nonexistent/clip.wav"));
        assert!(matches!(
            decode(&source),
            Err(Error::FeatureExtraction { .. })
        ));
    }

    #[test]
    fn test_stereo_downmix_averages_channels() {
        let decoded = DecodedAudio {
            samples: vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0],
            sample_rate: 8_000,
            channels: 2,
        };
        assert_eq!(decoded.to_mono(), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_load_mono_resamples_stereo_wav() {
        let mono = sine_wave(440.0, 32_000, 32_000);
        let interleaved: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
        let source = AudioSource::from_bytes("stereo.wav", wav_bytes(&interleaved, 32_000, 2));

        let out = load_mono(&source, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn test_resample_identity() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn test_resample_upsample_interpolates() {
        let out = resample_linear(&[0.0, 1.0], 1, 2);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_downsample_length() {
        let input = vec![0.0f32; 48_000];
        assert_eq!(resample_linear(&input, 48_000, 16_000).len(), 16_000);
    }

    #[test]
    fn test_check_sample_rate_bounds() {
        assert!(check_sample_rate(16_000).is_ok());
        assert!(check_sample_rate(MAX_SAMPLE_RATE).is_ok());
        assert!(check_sample_rate(0).is_err());
        assert!(check_sample_rate(MAX_SAMPLE_RATE + 1).is_err());
        assert!(check_sample_rate(u32::MAX).is_err());
    }

    #[test]
    fn test_audio_source_debug_hides_bytes() {
        let source = AudioSource::from_bytes("clip.flac", vec![0u8; 64]);
        let debug = format!("{source:?}");
        assert!(debug.contains("clip.flac"));
        assert!(debug.contains("64"));
    }
}
