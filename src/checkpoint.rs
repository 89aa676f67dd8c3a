//! Checkpoint artifacts: named weights loaded into the scene CNN.
//!
//! A checkpoint is a JSON document:
//!
//! ```json
//! {
//!   "model_state_dict": {
//!     "features.0.weight": { "shape": [8, 1, 5, 5], "data": [...] },
//!     ...
//!   },
//!   "num_classes": 10,
//!   "class_labels": ["Airport", "Bus", ...],
//!   "sample_rate": 16000
//! }
//! ```
//!
//! The network is `Conv2d(1, 8, 5) -> ReLU -> MaxPool2d(2) -> Conv2d(8, 16, 5)
//! -> ReLU -> MaxPool2d(2) -> Flatten -> Linear(58000, num_classes)` over a
//! single-channel `128 x 512` input.

use crate::audio::check_sample_rate;
use crate::error::{Error, Result};
use crate::features::{FeatureTensor, N_MELS, TARGET_FRAMES};
use crate::labels::check_class_labels;
use crate::model::SceneModel;
use crate::types::ConfidenceLevel;
use ndarray::{Array1, Array2, Array3, ArrayView3, s};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const KERNEL: usize = 5;
const POOL: usize = 2;
const CONV1_OUT: usize = 8;
const CONV2_OUT: usize = 16;

/// Parameter names in the state dict.
pub const CONV1_WEIGHT: &str = "features.0.weight";
/// Parameter name of the first convolution bias.
pub const CONV1_BIAS: &str = "features.0.bias";
/// Parameter name of the second convolution weight.
pub const CONV2_WEIGHT: &str = "features.3.weight";
/// Parameter name of the second convolution bias.
pub const CONV2_BIAS: &str = "features.3.bias";
/// Parameter name of the classifier weight.
pub const LINEAR_WEIGHT: &str = "classifier.1.weight";
/// Parameter name of the classifier bias.
pub const LINEAR_BIAS: &str = "classifier.1.bias";

const fn conv_pool(size: usize) -> usize {
    (size - KERNEL + 1) / POOL
}

/// Spatial height after both conv/pool stages.
const FLAT_HEIGHT: usize = conv_pool(conv_pool(N_MELS));
/// Spatial width after both conv/pool stages.
const FLAT_WIDTH: usize = conv_pool(conv_pool(TARGET_FRAMES));
/// Input width of the classifier layer.
pub const FLATTENED_FEATURES: usize = CONV2_OUT * FLAT_HEIGHT * FLAT_WIDTH;

/// One named tensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorEntry {
    /// Dimensions, outermost first.
    pub shape: Vec<usize>,
    /// Row-major values.
    pub data: Vec<f32>,
}

/// Checkpoint document as stored on disk.
///
/// Every field is optional here so that missing metadata can be reported
/// precisely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointDocument {
    /// Named parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_state_dict: Option<BTreeMap<String, TensorEntry>>,
    /// Declared class count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_classes: Option<usize>,
    /// Declared labels, ordered by output position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_labels: Option<Vec<String>>,
    /// Declared sample rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

/// Validated checkpoint: weights plus declared metadata.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    state_dict: BTreeMap<String, TensorEntry>,
    num_classes: usize,
    class_labels: Option<Vec<String>>,
    sample_rate: Option<u32>,
}

impl Checkpoint {
    /// Validate a parsed document.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedFormat`] if the document has no state dict
    /// and [`Error::InvalidCheckpoint`] if `num_classes` is missing or zero,
    /// `class_labels` are repeated or do not match `num_classes`, or
    /// `sample_rate` is out of range.
    pub fn from_document(doc: CheckpointDocument) -> Result<Self> {
        let state_dict = doc.model_state_dict.ok_or_else(|| Error::UnsupportedFormat {
            reason: "JSON document has no 'model_state_dict'".to_string(),
        })?;
        let num_classes = doc.num_classes.ok_or_else(|| Error::InvalidCheckpoint {
            reason: "dictionary must contain 'num_classes'".to_string(),
        })?;
        if num_classes == 0 {
            return Err(Error::InvalidCheckpoint {
                reason: "'num_classes' must be positive".to_string(),
            });
        }
        if let Some(labels) = &doc.class_labels {
            check_class_labels(labels, num_classes)
                .map_err(|reason| Error::InvalidCheckpoint { reason })?;
        }
        if let Some(rate) = doc.sample_rate {
            check_sample_rate(rate).map_err(|reason| Error::InvalidCheckpoint { reason })?;
        }
        Ok(Self {
            state_dict,
            num_classes,
            class_labels: doc.class_labels,
            sample_rate: doc.sample_rate,
        })
    }

    /// Declared class count.
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Rebuild the network and load the weights into it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCheckpoint`] if a parameter is missing or has
    /// the wrong shape.
    pub fn into_model(mut self) -> Result<SceneCnn> {
        let n = self.num_classes;
        let conv1_w = self.take(CONV1_WEIGHT, &[CONV1_OUT, 1, KERNEL, KERNEL])?;
        let conv1_b = self.take(CONV1_BIAS, &[CONV1_OUT])?;
        let conv2_w = self.take(CONV2_WEIGHT, &[CONV2_OUT, CONV1_OUT, KERNEL, KERNEL])?;
        let conv2_b = self.take(CONV2_BIAS, &[CONV2_OUT])?;
        let linear_w = self.take(LINEAR_WEIGHT, &[n, FLATTENED_FEATURES])?;
        let linear_b = self.take(LINEAR_BIAS, &[n])?;

        Ok(SceneCnn {
            conv1: Conv2d::new(conv1_w, conv1_b, CONV1_OUT, KERNEL * KERNEL)?,
            conv2: Conv2d::new(conv2_w, conv2_b, CONV2_OUT, CONV1_OUT * KERNEL * KERNEL)?,
            linear_weight: to_matrix(linear_w, n, FLATTENED_FEATURES)?,
            linear_bias: Array1::from(linear_b),
            num_classes: n,
            class_labels: self.class_labels,
            sample_rate: self.sample_rate,
        })
    }

    fn take(&mut self, name: &str, expected: &[usize]) -> Result<Vec<f32>> {
        let entry = self
            .state_dict
            .remove(name)
            .ok_or_else(|| Error::InvalidCheckpoint {
                reason: format!("missing parameter '{name}'"),
            })?;
        if entry.shape != expected {
            return Err(Error::InvalidCheckpoint {
                reason: format!(
                    "parameter '{name}' has shape {:?}, expected {expected:?}",
                    entry.shape
                ),
            });
        }
        let len: usize = expected.iter().product();
        if entry.data.len() != len {
            return Err(Error::InvalidCheckpoint {
                reason: format!(
                    "parameter '{name}' has {} values, shape {expected:?} needs {len}",
                    entry.data.len()
                ),
            });
        }
        Ok(entry.data)
    }
}

fn to_matrix(data: Vec<f32>, rows: usize, cols: usize) -> Result<Array2<f32>> {
    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::InvalidCheckpoint {
        reason: format!("failed to shape weights: {e}"),
    })
}

/// Valid (unpadded) 2-D convolution, weights flattened to `[out, in * k * k]`.
#[derive(Debug, Clone)]
struct Conv2d {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Conv2d {
    fn new(weight: Vec<f32>, bias: Vec<f32>, out_channels: usize, fan_in: usize) -> Result<Self> {
        Ok(Self {
            weight: to_matrix(weight, out_channels, fan_in)?,
            bias: Array1::from(bias),
        })
    }

    fn parameter_count(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// im2col followed by one matrix product.
    fn forward(&self, input: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let (channels, height, width) = input.dim();
        let out_h = height + 1 - KERNEL;
        let out_w = width + 1 - KERNEL;

        let mut cols = Array2::<f32>::zeros((channels * KERNEL * KERNEL, out_h * out_w));
        for c in 0..channels {
            for ki in 0..KERNEL {
                for kj in 0..KERNEL {
                    let row = (c * KERNEL + ki) * KERNEL + kj;
                    let patch = input.slice(s![c, ki..ki + out_h, kj..kj + out_w]);
                    cols.row_mut(row)
                        .into_shape_with_order((out_h, out_w))
                        .map_err(|e| Error::ForwardPass(format!("im2col reshape: {e}")))?
                        .assign(&patch);
                }
            }
        }

        let mut out = self.weight.dot(&cols);
        for (mut row, &b) in out.rows_mut().into_iter().zip(self.bias.iter()) {
            row += b;
        }
        let out_channels = self.weight.nrows();
        out.into_shape_with_order((out_channels, out_h, out_w))
            .map_err(|e| Error::ForwardPass(format!("conv output reshape: {e}")))
    }
}

fn relu_inplace(x: &mut Array3<f32>) {
    x.mapv_inplace(|v| v.max(0.0));
}

/// 2x2 max pooling with stride 2, dropping odd edges.
fn max_pool(input: &Array3<f32>) -> Array3<f32> {
    let (channels, height, width) = input.dim();
    let (out_h, out_w) = (height / POOL, width / POOL);
    Array3::from_shape_fn((channels, out_h, out_w), |(c, y, x)| {
        let (y0, x0) = (y * POOL, x * POOL);
        input
            .slice(s![c, y0..y0 + POOL, x0..x0 + POOL])
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max)
    })
}

/// The scene CNN with loaded weights. Inference only.
#[derive(Debug, Clone)]
pub struct SceneCnn {
    conv1: Conv2d,
    conv2: Conv2d,
    linear_weight: Array2<f32>,
    linear_bias: Array1<f32>,
    num_classes: usize,
    class_labels: Option<Vec<String>>,
    sample_rate: Option<u32>,
}

impl SceneModel for SceneCnn {
    fn forward(&self, features: &FeatureTensor) -> Result<Vec<f32>> {
        let input = features.as_array().view().insert_axis(ndarray::Axis(0));

        let mut x = self.conv1.forward(input)?;
        relu_inplace(&mut x);
        let x = max_pool(&x);

        let mut x = self.conv2.forward(x.view())?;
        relu_inplace(&mut x);
        let x = max_pool(&x);

        let flat: Array1<f32> = x.iter().copied().collect();
        if flat.len() != FLATTENED_FEATURES {
            return Err(Error::ForwardPass(format!(
                "flattened {} features, classifier expects {FLATTENED_FEATURES}",
                flat.len()
            )));
        }
        let logits = self.linear_weight.dot(&flat) + &self.linear_bias;
        Ok(logits.to_vec())
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn class_labels(&self) -> Option<&[String]> {
        self.class_labels.as_deref()
    }

    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn architecture(&self) -> String {
        format!(
            "SceneCnn(\n  (features): Sequential(\n    (0): Conv2d(1, {CONV1_OUT}, kernel_size=({KERNEL}, {KERNEL}))\n    (1): ReLU()\n    (2): MaxPool2d(kernel_size={POOL})\n    (3): Conv2d({CONV1_OUT}, {CONV2_OUT}, kernel_size=({KERNEL}, {KERNEL}))\n    (4): ReLU()\n    (5): MaxPool2d(kernel_size={POOL})\n  )\n  (classifier): Sequential(\n    (0): Flatten()\n    (1): Linear(in_features={FLATTENED_FEATURES}, out_features={})\n  )\n)",
            self.num_classes
        )
    }

    fn trainable_parameters(&self) -> u64 {
        let total = self.conv1.parameter_count()
            + self.conv2.parameter_count()
            + self.linear_weight.len()
            + self.linear_bias.len();
        total as u64
    }

    fn confidence_level(&self) -> ConfidenceLevel {
        if self.class_labels.is_some() {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Medium
        }
    }
}
