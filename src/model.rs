use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::checkpoint::CheckpointError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    EmptyBatch,
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::ShapeMismatch { expected, got } => {
                write!(f, "Shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            ModelError::EmptyBatch => write!(f, "Batch contains no examples"),
        }
    }
}

impl std::error::Error for ModelError {}

/// The network that maps a window of vectors to the next vector.
///
/// Training and generation only talk to the model through this trait.
pub trait SequenceModel {
    /// Predicts the vector following `window` (`maxlen x D`).
    fn predict(&self, window: ArrayView2<f32>) -> Result<Array1<f32>, ModelError>;

    /// One optimization step on a batch; returns the batch loss before the step.
    fn train_batch(&mut self, inputs: ArrayView3<f32>, targets: ArrayView2<f32>) -> Result<f32, ModelError>;

    /// Mean squared error over a batch, without updating the model.
    fn evaluate(&self, inputs: ArrayView3<f32>, targets: ArrayView2<f32>) -> Result<f32, ModelError>;

    /// Writes the full model state so a run can be resumed from `path`.
    fn save(&self, path: &Path) -> Result<(), CheckpointError>;
}

/// Affine map from the flattened window to the next vector, trained by
/// gradient descent on mean squared error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearBaseline {
    weights: Array2<f32>, // [maxlen * D, D]
    bias: Array1<f32>,    // [D]
    maxlen: usize,
    dim: usize,
    learning_rate: f32,
}

impl LinearBaseline {
    pub fn new(maxlen: usize, dim: usize, learning_rate: f32) -> Self {
        Self {
            weights: Array2::zeros((maxlen * dim, dim)),
            bias: Array1::zeros(dim),
            maxlen,
            dim,
            learning_rate,
        }
    }

    /// Reads a model written by [`SequenceModel::save`], checking it fits
    /// windows of `maxlen` vectors of length `dim`.
    pub fn load(path: &Path, maxlen: usize, dim: usize) -> Result<Self, CheckpointError> {
        let reader = BufReader::new(File::open(path)?);
        let model: LinearBaseline = serde_json::from_reader(reader)?;

        let expected = vec![maxlen * dim, dim];
        if model.maxlen != maxlen || model.dim != dim || model.weights.shape() != expected.as_slice() {
            return Err(CheckpointError::ShapeMismatch {
                expected,
                got: model.weights.shape().to_vec(),
            });
        }
        if model.bias.len() != dim {
            return Err(CheckpointError::ShapeMismatch {
                expected: vec![dim],
                got: vec![model.bias.len()],
            });
        }
        log::info!("Loaded model from {}", path.display());
        Ok(model)
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn flatten_batch(&self, inputs: &ArrayView3<f32>, targets: &ArrayView2<f32>) -> Result<Array2<f32>, ModelError> {
        let (n, maxlen, dim) = inputs.dim();
        if maxlen != self.maxlen || dim != self.dim {
            return Err(ModelError::ShapeMismatch {
                expected: vec![n, self.maxlen, self.dim],
                got: inputs.shape().to_vec(),
            });
        }
        if targets.dim() != (n, self.dim) {
            return Err(ModelError::ShapeMismatch {
                expected: vec![n, self.dim],
                got: targets.shape().to_vec(),
            });
        }
        if n == 0 {
            return Err(ModelError::EmptyBatch);
        }
        Array2::from_shape_vec((n, maxlen * dim), inputs.iter().copied().collect()).map_err(|_| {
            ModelError::ShapeMismatch {
                expected: vec![n, maxlen * dim],
                got: inputs.shape().to_vec(),
            }
        })
    }

    fn forward(&self, flat: &Array2<f32>) -> Array2<f32> {
        flat.dot(&self.weights) + &self.bias
    }
}

fn mean_squared_error(predictions: &Array2<f32>, targets: &ArrayView2<f32>) -> f32 {
    let diff = predictions - targets;
    diff.mapv(|d| d * d).mean().unwrap_or(0.0)
}

impl SequenceModel for LinearBaseline {
    fn predict(&self, window: ArrayView2<f32>) -> Result<Array1<f32>, ModelError> {
        if window.dim() != (self.maxlen, self.dim) {
            return Err(ModelError::ShapeMismatch {
                expected: vec![self.maxlen, self.dim],
                got: window.shape().to_vec(),
            });
        }
        let flat: Array1<f32> = window.iter().copied().collect();
        Ok(flat.dot(&self.weights) + &self.bias)
    }

    fn train_batch(&mut self, inputs: ArrayView3<f32>, targets: ArrayView2<f32>) -> Result<f32, ModelError> {
        let flat = self.flatten_batch(&inputs, &targets)?;
        let predictions = self.forward(&flat);
        let loss = mean_squared_error(&predictions, &targets);

        let error = &predictions - &targets;
        let scale = 2.0 / error.len() as f32;
        let grad_weights = flat.t().dot(&error) * scale;
        let grad_bias = error.sum_axis(Axis(0)) * scale;

        self.weights.scaled_add(-self.learning_rate, &grad_weights);
        self.bias.scaled_add(-self.learning_rate, &grad_bias);
        Ok(loss)
    }

    fn evaluate(&self, inputs: ArrayView3<f32>, targets: ArrayView2<f32>) -> Result<f32, ModelError> {
        let flat = self.flatten_batch(&inputs, &targets)?;
        Ok(mean_squared_error(&self.forward(&flat), &targets))
    }

    fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
