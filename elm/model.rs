use crate::data::Normalization;
use crate::error::ElmError;
use crate::hidden::{Activation, hidden};
use ndarray::{Array2, ArrayView2, CowArray, Ix2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

// --- Public Data Structures ---
// These structs define the on-disk layout of a trained network when
// serialized to TOML: every weight matrix by name, plus the target
// normalization needed to report predictions in thickness units.

/// What a stage does to its input before the activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Linear random mapping (`rm`), no nonlinearity.
    Projection,
    /// Random linear map followed by the configured activation.
    Hidden,
}

/// One fixed, never-retrained layer of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub kind: StageKind,
    pub activation: Activation,
    /// Shape: [input_width, output_width].
    pub weights: Array2<f64>,
}

impl Stage {
    pub fn input_width(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_width(&self) -> usize {
        self.weights.ncols()
    }

    /// The single transform used for training, testing and inference alike.
    pub fn forward(&self, signal: ArrayView2<f64>) -> Result<Array2<f64>, ElmError> {
        hidden(signal, self.weights.view(), self.activation)
    }
}

/// Closed-form fitted output weights, shape `[last_width, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLayer {
    pub name: String,
    pub weights: Array2<f64>,
}

/// A trained network: the exact stage sequence recorded during training and
/// the fitted output layer. Prediction never samples or fits anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<Normalization>,
    pub stages: Vec<Stage>,
    pub output: OutputLayer,
}

impl TrainedNetwork {
    /// Width of the (bias-augmented) signal the first stage expects.
    pub fn input_width(&self) -> usize {
        self.stages.first().map_or(self.output.weights.nrows(), Stage::input_width)
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = Some(normalization);
        self
    }

    /// Replays every stage, in training order, on `signal`.
    pub fn transform(&self, signal: ArrayView2<f64>) -> Result<Array2<f64>, ElmError> {
        if signal.ncols() != self.input_width() {
            return Err(ElmError::ShapeMismatch {
                operation: "network inference (signal width)",
                expected: self.input_width(),
                found: signal.ncols(),
            });
        }

        let mut current: CowArray<'_, f64, Ix2> = CowArray::from(signal);
        for stage in &self.stages {
            let next = stage.forward(current.view())?;
            current = CowArray::from(next);
        }
        Ok(current.into_owned())
    }

    /// Predictions in the normalized target space, shape `[n_samples, 1]`.
    pub fn predict(&self, signal: ArrayView2<f64>) -> Result<Array2<f64>, ElmError> {
        let h = self.transform(signal)?;
        if h.ncols() != self.output.weights.nrows() {
            return Err(ElmError::ShapeMismatch {
                operation: "network inference (output weights)",
                expected: self.output.weights.nrows(),
                found: h.ncols(),
            });
        }
        Ok(h.dot(&self.output.weights))
    }

    /// Predictions mapped back to thickness units when the network carries
    /// its normalization; otherwise identical to `predict`.
    pub fn predict_thickness(&self, signal: ArrayView2<f64>) -> Result<Array2<f64>, ElmError> {
        let approx = self.predict(signal)?;
        Ok(match &self.normalization {
            Some(normalization) => normalization.denormalize(approx.view()),
            None => approx,
        })
    }

    /// Checks that consecutive weight matrices chain together, that
    /// projection stages stay linear and that the normalization can be undone.
    pub fn validate(&self) -> Result<(), ElmError> {
        if let Some(stage) = self.stages.iter().find(|stage| {
            stage.kind == StageKind::Projection && stage.activation != Activation::Identity
        }) {
            return Err(ElmError::invalid(
                "network structure",
                format!(
                    "projection stage '{}' must use the identity activation, found {:?}",
                    stage.name, stage.activation
                ),
            ));
        }
        if let Some(normalization) = &self.normalization {
            if !normalization.mean.is_finite()
                || !normalization.range.is_finite()
                || normalization.range == 0.0
            {
                return Err(ElmError::invalid(
                    "network structure",
                    format!(
                        "normalization needs a finite mean and a finite non-zero range, found mean {} and range {}",
                        normalization.mean, normalization.range
                    ),
                ));
            }
        }
        for pair in self.stages.windows(2) {
            if pair[1].input_width() != pair[0].output_width() {
                return Err(ElmError::ShapeMismatch {
                    operation: "network structure (stage input)",
                    expected: pair[0].output_width(),
                    found: pair[1].input_width(),
                });
            }
        }
        let last_width = self
            .stages
            .last()
            .map_or(self.output.weights.nrows(), Stage::output_width);
        if self.output.weights.nrows() != last_width {
            return Err(ElmError::ShapeMismatch {
                operation: "network structure (output rows)",
                expected: last_width,
                found: self.output.weights.nrows(),
            });
        }
        if self.output.weights.ncols() != 1 {
            return Err(ElmError::ShapeMismatch {
                operation: "network structure (output columns)",
                expected: 1,
                found: self.output.weights.ncols(),
            });
        }
        Ok(())
    }

    /// Saves the network to a file in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ElmError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads a network from a TOML file and checks its structure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ElmError> {
        let toml_string = fs::read_to_string(path)?;
        let network: Self = toml::from_str(&toml_string)?;
        network.validate()?;
        Ok(network)
    }
}
