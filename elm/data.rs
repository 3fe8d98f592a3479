//! # Data Preparation Module
//!
//! Turns the raw `signal` / `thickness` arrays into the datasets the network
//! is trained and evaluated on:
//!
//! - Targets are mean-normalized once, over the full target vector, before
//!   any splitting. The same `Normalization` maps predictions back to
//!   thickness units later on.
//! - The split is deterministic and order-preserving: the first
//!   `round(N * fraction)` rows train, the rest test.
//! - Every signal matrix gets a constant bias column prepended, after the
//!   split, through the single `bias` function.

use crate::error::ElmError;
use ndarray::{Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};

/// A row-aligned pair of signal and target matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Shape: [n_samples, n_features]. Column 0 is the bias once prepared.
    pub signal: Array2<f64>,
    /// Shape: [n_samples, 1].
    pub thickness: Array2<f64>,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.signal.nrows()
    }

    pub fn width(&self) -> usize {
        self.signal.ncols()
    }
}

/// Raw arrays as they come out of the input archive, samples as rows.
#[derive(Debug, Clone)]
pub struct RawData {
    pub signal: Array2<f64>,
    pub thickness: Array2<f64>,
}

/// Everything the training run needs from the data preparer.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub training: Dataset,
    pub testing: Dataset,
    pub normalization: Normalization,
}

/// Mean normalization of the target: `(raw - mean) / range`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: f64,
    pub range: f64,
}

impl Normalization {
    /// Computes the mean and the `max - min` range over every entry of `raw`.
    pub fn from_targets(raw: ArrayView2<f64>) -> Result<Self, ElmError> {
        if raw.is_empty() {
            return Err(ElmError::invalid("normalize", "the target array is empty"));
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(ElmError::invalid(
                "normalize",
                "the target array contains NaN or infinite values",
            ));
        }

        let mean = raw.sum() / raw.len() as f64;
        let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let range = max - min;
        if range == 0.0 {
            return Err(ElmError::invalid(
                "normalize",
                format!("all {} target values equal {min}; the range is zero", raw.len()),
            ));
        }

        Ok(Self { mean, range })
    }

    pub fn normalize(&self, raw: ArrayView2<f64>) -> Array2<f64> {
        raw.mapv(|v| (v - self.mean) / self.range)
    }

    pub fn denormalize(&self, values: ArrayView2<f64>) -> Array2<f64> {
        values.mapv(|v| v * self.range + self.mean)
    }
}

/// Normalizes `raw` and returns the parameters needed to undo it.
pub fn normalize(raw: ArrayView2<f64>) -> Result<(Array2<f64>, Normalization), ElmError> {
    let params = Normalization::from_targets(raw)?;
    Ok((params.normalize(raw), params))
}

/// Splits rows into a training prefix and a testing suffix.
///
/// The boundary is `round(N * fraction)`, with ties rounded to even. Both
/// sides must end up non-empty.
pub fn split(
    signal: ArrayView2<f64>,
    thickness: ArrayView2<f64>,
    fraction: f64,
) -> Result<(Dataset, Dataset), ElmError> {
    check_rows("split", signal, thickness)?;
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(ElmError::invalid(
            "split",
            format!("train fraction must lie strictly between 0 and 1, got {fraction}"),
        ));
    }

    let n = signal.nrows();
    let pos = (n as f64 * fraction).round_ties_even() as usize;
    if pos == 0 || pos >= n {
        return Err(ElmError::invalid(
            "split",
            format!("{n} rows with fraction {fraction} leave the training or testing set empty"),
        ));
    }

    let training = Dataset {
        signal: signal.slice(s![..pos, ..]).to_owned(),
        thickness: thickness.slice(s![..pos, ..]).to_owned(),
    };
    let testing = Dataset {
        signal: signal.slice(s![pos.., ..]).to_owned(),
        thickness: thickness.slice(s![pos.., ..]).to_owned(),
    };
    Ok((training, testing))
}

/// Prepends a column of ones.
pub fn bias(signal: ArrayView2<f64>) -> Array2<f64> {
    let mut augmented = Array2::ones((signal.nrows(), signal.ncols() + 1));
    augmented.slice_mut(s![.., 1..]).assign(&signal);
    augmented
}

/// Normalize, split, then bias-augment both sides.
pub fn prepare(raw: &RawData, fraction: f64) -> Result<PreparedData, ElmError> {
    check_rows("prepare", raw.signal.view(), raw.thickness.view())?;
    if raw.thickness.ncols() != 1 {
        return Err(ElmError::invalid(
            "prepare",
            format!(
                "thickness must be a single column, found {} columns",
                raw.thickness.ncols()
            ),
        ));
    }

    let (thickness, normalization) = normalize(raw.thickness.view())?;
    let (mut training, mut testing) = split(raw.signal.view(), thickness.view(), fraction)?;
    training.signal = bias(training.signal.view());
    testing.signal = bias(testing.signal.view());

    log::info!(
        "Prepared {} training and {} testing samples with {} features (bias included); target mean {:.6}, range {:.6}",
        training.n_samples(),
        testing.n_samples(),
        training.width(),
        normalization.mean,
        normalization.range
    );

    Ok(PreparedData {
        training,
        testing,
        normalization,
    })
}

fn check_rows(
    operation: &'static str,
    signal: ArrayView2<f64>,
    thickness: ArrayView2<f64>,
) -> Result<(), ElmError> {
    if signal.nrows() == 0 {
        return Err(ElmError::invalid(operation, "the dataset has no rows"));
    }
    if signal.nrows() != thickness.nrows() {
        return Err(ElmError::invalid(
            operation,
            format!(
                "signal has {} rows but thickness has {}",
                signal.nrows(),
                thickness.nrows()
            ),
        ));
    }
    Ok(())
}
