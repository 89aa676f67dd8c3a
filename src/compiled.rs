//! Compiled-module artifacts: self-contained ONNX graphs run through ONNX Runtime.

use crate::error::{Error, Result};
use crate::features::{FeatureTensor, N_MELS, TARGET_FRAMES};
use crate::labels::synthesize_labels;
use crate::model::SceneModel;
use crate::types::ConfidenceLevel;
use ndarray::{ArrayD, IxDyn};
use ort::session::Session;
use ort::value::Value;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

/// Layout of the graph input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputLayout {
    /// `[batch, 1, mels, frames]`
    Nchw,
    /// `[batch, mels, frames]`
    Nhw,
}

impl InputLayout {
    fn dims(self) -> Vec<usize> {
        match self {
            Self::Nchw => vec![1, 1, N_MELS, TARGET_FRAMES],
            Self::Nhw => vec![1, N_MELS, TARGET_FRAMES],
        }
    }
}

/// An ONNX module with its class count read from the first output.
pub struct CompiledModule {
    session: Mutex<Session>,
    layout: InputLayout,
    num_classes: usize,
    class_labels: Vec<String>,
    description: String,
}

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModule")
            .field("layout", &self.layout)
            .field("num_classes", &self.num_classes)
            .finish_non_exhaustive()
    }
}

impl CompiledModule {
    /// Load a module from serialized ONNX bytes.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedFormat`] if ONNX Runtime rejects the bytes
    /// and [`Error::UnsupportedArchitecture`] if the output width or input
    /// layout cannot be determined.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| Error::UnsupportedFormat {
                reason: format!("failed to initialize ONNX Runtime: {e}"),
            })?
            .commit_from_memory(bytes)
            .map_err(|e| Error::UnsupportedFormat {
                reason: format!("not a loadable compiled module: {e}"),
            })?;
        Self::from_session(session)
    }

    /// Load a module from an ONNX file.
    ///
    /// # Errors
    /// Same as [`CompiledModule::from_bytes`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let session = Session::builder()
            .map_err(|e| Error::UnsupportedFormat {
                reason: format!("failed to initialize ONNX Runtime: {e}"),
            })?
            .commit_from_file(path)
            .map_err(|e| Error::UnsupportedFormat {
                reason: format!("{} is not a loadable compiled module: {e}", path.display()),
            })?;
        Self::from_session(session)
    }

    fn from_session(session: Session) -> Result<Self> {
        let input_shape = extract_input_shape(&session)?;
        let output_shapes = extract_output_shapes(&session)?;

        let layout = detect_layout(&input_shape)?;
        let first_output = output_shapes
            .first()
            .ok_or_else(|| Error::UnsupportedArchitecture {
                reason: "module has no outputs".to_string(),
            })?;
        let num_classes = extract_last_dim(first_output)?;

        let description = describe(&session, &input_shape, &output_shapes);
        tracing::debug!(num_classes, ?layout, "compiled module introspected");

        Ok(Self {
            session: Mutex::new(session),
            layout,
            num_classes,
            class_labels: synthesize_labels(num_classes),
            description,
        })
    }
}

impl SceneModel for CompiledModule {
    #[allow(clippy::significant_drop_tightening)]
    fn forward(&self, features: &FeatureTensor) -> Result<Vec<f32>> {
        let data = features.as_array().iter().copied().collect::<Vec<f32>>();
        let input_array = ArrayD::from_shape_vec(IxDyn(&self.layout.dims()), data)
            .map_err(|e| Error::ForwardPass(format!("failed to create input array: {e}")))?;
        let input_value = Value::from_array(input_array)
            .map_err(|e| Error::ForwardPass(format!("failed to create input tensor: {e}")))?;

        // Outputs borrow from the session, keep the guard until they are copied.
        let mut session = self
            .session
            .lock()
            .map_err(|e| Error::ForwardPass(format!("session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![input_value.view()])
            .map_err(|e| Error::ForwardPass(e.to_string()))?;
        let logits = extract_tensor_data(&outputs, 0)?;

        if logits.len() != self.num_classes {
            return Err(Error::ForwardPass(format!(
                "module produced {} logits, expected {}",
                logits.len(),
                self.num_classes
            )));
        }
        Ok(logits)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn class_labels(&self) -> Option<&[String]> {
        Some(&self.class_labels)
    }

    fn architecture(&self) -> String {
        self.description.clone()
    }

    fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::Medium
    }
}

fn extract_input_shape(session: &Session) -> Result<Vec<i64>> {
    let input = session
        .inputs
        .first()
        .ok_or_else(|| Error::UnsupportedArchitecture {
            reason: "module has no inputs".to_string(),
        })?;
    let shape = input
        .input_type
        .tensor_shape()
        .ok_or_else(|| Error::UnsupportedArchitecture {
            reason: "input is not a tensor".to_string(),
        })?;
    Ok(shape.iter().copied().collect())
}

fn extract_output_shapes(session: &Session) -> Result<Vec<Vec<i64>>> {
    session
        .outputs
        .iter()
        .map(|output| {
            let shape = output
                .output_type
                .tensor_shape()
                .ok_or_else(|| Error::UnsupportedArchitecture {
                    reason: "output is not a tensor".to_string(),
                })?;
            Ok(shape.iter().copied().collect())
        })
        .collect()
}

/// Accepts `[b, 1, 128, 512]` or `[b, 128, 512]`; negative dims are dynamic.
fn detect_layout(shape: &[i64]) -> Result<InputLayout> {
    let fits = |dim: i64, expected: usize| dim < 0 || usize::try_from(dim) == Ok(expected);
    match shape {
        [_, c, h, w] if fits(*c, 1) && fits(*h, N_MELS) && fits(*w, TARGET_FRAMES) => {
            Ok(InputLayout::Nchw)
        }
        [_, h, w] if fits(*h, N_MELS) && fits(*w, TARGET_FRAMES) => Ok(InputLayout::Nhw),
        _ => Err(Error::UnsupportedArchitecture {
            reason: format!(
                "unexpected input shape {shape:?}, expected [batch, 1, {N_MELS}, {TARGET_FRAMES}] \
                 or [batch, {N_MELS}, {TARGET_FRAMES}]"
            ),
        }),
    }
}

/// Class count from the trailing output dimension.
fn extract_last_dim(shape: &[i64]) -> Result<usize> {
    let value = shape
        .last()
        .copied()
        .ok_or_else(|| Error::UnsupportedArchitecture {
            reason: "could not determine number of classes: empty output shape".to_string(),
        })?;
    match usize::try_from(value) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::UnsupportedArchitecture {
            reason: format!("could not determine number of classes: output dimension {value}"),
        }),
    }
}

fn describe(session: &Session, input_shape: &[i64], output_shapes: &[Vec<i64>]) -> String {
    let input_name = session.inputs.first().map_or("input", |i| i.name.as_str());
    let outputs = session
        .outputs
        .iter()
        .zip(output_shapes)
        .map(|(output, shape)| format!("{}{shape:?}", output.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("ONNX module (input: {input_name}{input_shape:?}; outputs: {outputs})")
}

fn extract_tensor_data(outputs: &ort::session::SessionOutputs, index: usize) -> Result<Vec<f32>> {
    let output_names: Vec<_> = outputs.keys().collect();
    let name = output_names
        .get(index)
        .ok_or_else(|| Error::ForwardPass(format!("missing output tensor at index {index}")))?;

    let tensor = outputs
        .get(*name)
        .ok_or_else(|| Error::ForwardPass(format!("missing output tensor '{name}'")))?;

    let (_, data) = tensor
        .try_extract_tensor::<f32>()
        .map_err(|e| Error::ForwardPass(e.to_string()))?;

    Ok(data.to_vec())
}
