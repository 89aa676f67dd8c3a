//! Test utilities for creating mock audio, models and archives
//!
//! This module is only compiled in test builds.

#![allow(clippy::unwrap_used)] // Tests can use unwrap
#![allow(clippy::cast_precision_loss)] // Sample index casts are fine for test utilities
#![allow(clippy::cast_possible_truncation)]

use crate::checkpoint::{
    CONV1_BIAS, CONV1_WEIGHT, CONV2_BIAS, CONV2_WEIGHT, CheckpointDocument, FLATTENED_FEATURES,
    LINEAR_BIAS, LINEAR_WEIGHT, TensorEntry,
};
use crate::error::{Error, Result};
use crate::features::{FeatureTensor, N_MELS};
use crate::model::SceneModel;
use crate::types::{ConfidenceLevel, ModelMetadata};
use ndarray::s;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;

/// Sine wave at `frequency` Hz with amplitude 0.5.
pub fn sine_wave(frequency: f32, sample_rate: u32, len: usize) -> Vec<f32> {
    let sr = sample_rate as f32;
    (0..len)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / sr).sin())
        .collect()
}

fn wav_spec(sample_rate: u32, channels: u16) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Encode interleaved samples as a 16-bit PCM WAV file in memory.
pub fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(sample_rate, channels)).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Write interleaved samples to a WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
    std::fs::write(path, wav_bytes(samples, sample_rate, channels)).unwrap();
}

/// Metadata for a model with the given labels.
pub fn mock_metadata(labels: &[&str]) -> ModelMetadata {
    ModelMetadata {
        model_type_and_architecture: "StubModel".to_string(),
        num_classes: labels.len(),
        class_labels: Some(labels.iter().map(ToString::to_string).collect()),
        sample_rate: 16_000,
        num_trainable_parameters: 0,
        model_loading_timestamp: "2024-01-01T00:00:00Z".to_string(),
        confidence_level: ConfidenceLevel::High,
    }
}

type Forward = Box<dyn Fn(&FeatureTensor) -> Result<Vec<f32>> + Send + Sync>;

/// Model whose forward pass is a closure.
pub struct StubModel {
    labels: Option<Vec<String>>,
    num_classes: usize,
    sample_rate: Option<u32>,
    forward: Forward,
}

impl StubModel {
    /// Model with explicit labels and a custom forward pass.
    pub fn new(
        labels: &[&str],
        forward: impl Fn(&FeatureTensor) -> Result<Vec<f32>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            labels: (!labels.is_empty()).then(|| labels.iter().map(ToString::to_string).collect()),
            num_classes: labels.len(),
            sample_rate: None,
            forward: Box::new(forward),
        }
    }

    /// Override the reported class count.
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Declare a sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Model that always returns `logits`.
    pub fn fixed(labels: &[&str], logits: Vec<f32>) -> Self {
        Self::new(labels, move |_| Ok(logits.clone()))
    }

    /// Model with no declared labels, only a class count.
    pub fn unlabeled(num_classes: usize) -> Self {
        Self {
            labels: None,
            num_classes,
            sample_rate: None,
            forward: Box::new(move |_| Ok(vec![0.0; num_classes])),
        }
    }

    /// Model whose forward pass always fails.
    pub fn failing(labels: &[&str]) -> Self {
        Self::new(labels, |_| Err(Error::ForwardPass("stub failure".to_string())))
    }

    /// Two-class model: index 0 when low mel bands dominate, 1 otherwise.
    pub fn low_high(labels: &[&str]) -> Self {
        Self::new(labels, |features| {
            let (low, high) = band_energy(features);
            Ok(if low >= high {
                vec![4.0, 0.0]
            } else {
                vec![0.0, 4.0]
            })
        })
    }
}

impl SceneModel for StubModel {
    fn forward(&self, features: &FeatureTensor) -> Result<Vec<f32>> {
        (self.forward)(features)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn class_labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn architecture(&self) -> String {
        "StubModel".to_string()
    }
}

/// Mean dB of the lowest and highest quarter of mel bands over the first frames.
pub fn band_energy(features: &FeatureTensor) -> (f32, f32) {
    let data = features.as_array();
    let quarter = N_MELS / 4;
    let low = data.slice(s![..quarter, ..8]).mean().unwrap();
    let high = data.slice(s![N_MELS - quarter.., ..8]).mean().unwrap();
    (low, high)
}

fn zeros(shape: &[usize]) -> TensorEntry {
    TensorEntry {
        shape: shape.to_vec(),
        data: vec![0.0; shape.iter().product()],
    }
}

/// Checkpoint with all-zero weights; the logits equal `bias`.
pub fn checkpoint_document(num_classes: usize, bias: &[f32]) -> CheckpointDocument {
    let mut dict = BTreeMap::new();
    dict.insert(CONV1_WEIGHT.to_string(), zeros(&[8, 1, 5, 5]));
    dict.insert(CONV1_BIAS.to_string(), zeros(&[8]));
    dict.insert(CONV2_WEIGHT.to_string(), zeros(&[16, 8, 5, 5]));
    dict.insert(CONV2_BIAS.to_string(), zeros(&[16]));
    dict.insert(
        LINEAR_WEIGHT.to_string(),
        zeros(&[num_classes, FLATTENED_FEATURES]),
    );
    dict.insert(
        LINEAR_BIAS.to_string(),
        TensorEntry {
            shape: vec![num_classes],
            data: bias.to_vec(),
        },
    );
    CheckpointDocument {
        model_state_dict: Some(dict),
        num_classes: Some(num_classes),
        class_labels: None,
        sample_rate: None,
    }
}

/// Serialize a checkpoint document.
pub fn checkpoint_bytes(doc: &CheckpointDocument) -> Vec<u8> {
    serde_json::to_vec(doc).unwrap()
}

/// Build a zip archive in memory. Names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
