//! # Hidden Projection Unit
//!
//! A stage of the network is a fixed linear map followed by an elementwise
//! activation: `activation(signal · W)`. The weights are drawn once from a
//! standard normal distribution, optionally orthogonalized with a reduced QR
//! decomposition, and never touched again. Training and inference both go
//! through `hidden`, so the two passes cannot diverge.

use crate::error::ElmError;
use ndarray::{Array2, ArrayView2};
use ndarray_linalg::QR;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Elementwise nonlinearity applied after the linear map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Logistic sigmoid `1 / (1 + exp(-z))`, mapping the real line into (0, 1).
    #[default]
    Sigmoid,
    /// No nonlinearity; used by the linear random-mapping stage.
    Identity,
}

impl Activation {
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Sigmoid => sigmoid(z),
            Activation::Identity => z,
        }
    }

    /// Maps an activation value back to the pre-activation `z`.
    pub fn inverse(self, p: f64) -> Result<f64, ElmError> {
        match self {
            Activation::Sigmoid => {
                if !(p > 0.0 && p < 1.0) {
                    return Err(ElmError::invalid(
                        "sigmoid inverse",
                        format!("{p} lies outside the open interval (0, 1)"),
                    ));
                }
                Ok(p.ln() - (1.0 - p).ln())
            }
            Activation::Identity => Ok(p),
        }
    }

    pub fn inverse_all(self, values: ArrayView2<f64>) -> Result<Array2<f64>, ElmError> {
        let mut out = Array2::zeros(values.raw_dim());
        for (dst, &p) in out.iter_mut().zip(values.iter()) {
            *dst = self.inverse(p)?;
        }
        Ok(out)
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Computes `activation(signal · w_in)`.
pub fn hidden(
    signal: ArrayView2<f64>,
    w_in: ArrayView2<f64>,
    activation: Activation,
) -> Result<Array2<f64>, ElmError> {
    if signal.ncols() != w_in.nrows() {
        return Err(ElmError::ShapeMismatch {
            operation: "hidden projection (signal width)",
            expected: w_in.nrows(),
            found: signal.ncols(),
        });
    }

    let mut h = signal.dot(&w_in);
    if activation != Activation::Identity {
        h.par_mapv_inplace(|z| activation.apply(z));
    }
    Ok(h)
}

/// Draws a `rows x cols` matrix of i.i.d. standard normal entries.
pub fn random_weights<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_simple_fn((rows, cols), || rng.sample(StandardNormal))
}

/// Replaces `weights` by the `Q` factor of its reduced QR decomposition.
///
/// `Q` has `min(rows, cols)` orthonormal columns, so a request wider than the
/// input is capped at the input width.
pub fn orthogonalize(weights: &Array2<f64>) -> Result<Array2<f64>, ElmError> {
    if weights.is_empty() {
        return Err(ElmError::invalid(
            "orthogonalize",
            format!(
                "cannot orthogonalize a {}x{} matrix",
                weights.nrows(),
                weights.ncols()
            ),
        ));
    }
    let (q, _r) = weights
        .qr()
        .map_err(|e| ElmError::unstable("orthogonalize", format!("QR decomposition failed: {e}")))?;
    Ok(q)
}
