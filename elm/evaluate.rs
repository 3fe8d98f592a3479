//! Error metrics and the data behind the comparison chart.

use crate::data::Dataset;
use crate::error::ElmError;
use crate::model::TrainedNetwork;
use ndarray::{Array2, ArrayView2};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Mean of the squared elementwise differences over the sample axis.
pub fn mse(approx: ArrayView2<f64>, expected: ArrayView2<f64>) -> Result<f64, ElmError> {
    check_same_shape(("mse (sample count)", "mse (columns)"), approx, expected)?;
    if expected.is_empty() {
        return Err(ElmError::invalid("mse", "no samples to compare"));
    }

    let sum: f64 = approx
        .iter()
        .zip(expected.iter())
        .map(|(a, e)| (a - e).powi(2))
        .sum();
    Ok(sum / expected.len() as f64)
}

/// Reports the first axis on which `approx` and `expected` disagree.
fn check_same_shape(
    (rows_operation, cols_operation): (&'static str, &'static str),
    approx: ArrayView2<f64>,
    expected: ArrayView2<f64>,
) -> Result<(), ElmError> {
    if approx.nrows() != expected.nrows() {
        return Err(ElmError::ShapeMismatch {
            operation: rows_operation,
            expected: expected.nrows(),
            found: approx.nrows(),
        });
    }
    if approx.ncols() != expected.ncols() {
        return Err(ElmError::ShapeMismatch {
            operation: cols_operation,
            expected: expected.ncols(),
            found: approx.ncols(),
        });
    }
    Ok(())
}

/// Held-out predictions of a trained network.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Predictions, normalized space. Shape: [n_samples, 1].
    pub approx: Array2<f64>,
    /// Targets, normalized space. Shape: [n_samples, 1].
    pub expected: Array2<f64>,
    /// MSE in the normalized space the network was fitted in.
    pub mse: f64,
}

impl Evaluation {
    /// Predictions and targets mapped back to thickness units.
    pub fn denormalized(&self, network: &TrainedNetwork) -> (Array2<f64>, Array2<f64>) {
        match &network.normalization {
            Some(normalization) => (
                normalization.denormalize(self.approx.view()),
                normalization.denormalize(self.expected.view()),
            ),
            None => (self.approx.clone(), self.expected.clone()),
        }
    }
}

/// Runs the stored stages over the testing split and scores the result.
pub fn evaluate(network: &TrainedNetwork, testing: &Dataset) -> Result<Evaluation, ElmError> {
    let approx = network.predict(testing.signal.view())?;
    let mse = mse(approx.view(), testing.thickness.view())?;
    Ok(Evaluation {
        approx,
        expected: testing.thickness.clone(),
        mse,
    })
}

/// Predictions sorted ascending, with the matching targets alongside.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSeries {
    /// `(index, prediction)` for the first `n_points` sorted predictions.
    pub line: Vec<(f64, f64)>,
    /// `(index, expected)` reordered by the same permutation.
    pub scatter: Vec<(f64, f64)>,
}

impl ComparisonSeries {
    pub fn new(
        approx: ArrayView2<f64>,
        expected: ArrayView2<f64>,
        n_points: usize,
    ) -> Result<Self, ElmError> {
        check_same_shape(
            ("comparison plot (sample count)", "comparison plot (columns)"),
            approx,
            expected,
        )?;
        if approx.ncols() != 1 {
            return Err(ElmError::ShapeMismatch {
                operation: "comparison plot (columns)",
                expected: 1,
                found: approx.ncols(),
            });
        }

        let predictions = approx.column(0);
        let targets = expected.column(0);
        let mut order: Vec<usize> = (0..predictions.len()).collect();
        order.sort_by(|&a, &b| predictions[a].total_cmp(&predictions[b]));

        let shown = n_points.min(order.len());
        let mut line = Vec::with_capacity(shown);
        let mut scatter = Vec::with_capacity(shown);
        for (x, &idx) in order.iter().take(shown).enumerate() {
            line.push((x as f64, predictions[idx]));
            scatter.push((x as f64, targets[idx]));
        }
        Ok(Self { line, scatter })
    }

    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// `(min, max)` over both series; `(0, 1)` when empty.
    pub fn value_bounds(&self) -> (f64, f64) {
        if self.is_empty() {
            return (0.0, 1.0);
        }
        let values = self.line.iter().chain(self.scatter.iter()).map(|&(_, y)| y);
        let min = values.clone().fold(f64::INFINITY, f64::min);
        let max = values.fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    }
}

/// Writes predictions (and targets, when known) as a TSV file.
pub fn save_predictions(
    path: impl AsRef<Path>,
    predictions: ArrayView2<f64>,
    expected: Option<ArrayView2<f64>>,
) -> Result<(), ElmError> {
    if let Some(expected) = &expected {
        if expected.nrows() != predictions.nrows() {
            return Err(ElmError::ShapeMismatch {
                operation: "save predictions (sample count)",
                expected: predictions.nrows(),
                found: expected.nrows(),
            });
        }
    }

    let mut file = BufWriter::new(fs::File::create(path)?);
    match &expected {
        Some(expected) => {
            writeln!(file, "prediction\texpected")?;
            for (pred, target) in predictions.column(0).iter().zip(expected.column(0).iter()) {
                writeln!(file, "{:.6}\t{:.6}", pred, target)?;
            }
        }
        None => {
            writeln!(file, "prediction")?;
            for pred in predictions.column(0).iter() {
                writeln!(file, "{:.6}", pred)?;
            }
        }
    }
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use tempfile::NamedTempFile;

    #[test]
    fn mse_averages_squared_errors() {
        let approx = array![[1.0], [2.0], [4.0]];
        let expected = array![[1.5], [2.0], [3.0]];
        assert_abs_diff_eq!(
            mse(approx.view(), expected.view()).unwrap(),
            (0.25 + 0.0 + 1.0) / 3.0,
            epsilon = 1e-15
        );
    }

    #[test]
    fn mse_rejects_mismatched_or_empty_input() {
        let a = array![[1.0], [2.0]];
        let b = array![[1.0]];
        assert!(matches!(
            mse(a.view(), b.view()),
            Err(ElmError::ShapeMismatch { .. })
        ));

        let empty = Array2::<f64>::zeros((0, 1));
        assert!(matches!(
            mse(empty.view(), empty.view()),
            Err(ElmError::InvalidInput { .. })
        ));
    }

    #[test]
    fn column_mismatch_reports_column_counts() {
        let approx = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let expected = array![[1.0], [2.0], [3.0]];
        match mse(approx.view(), expected.view()) {
            Err(ElmError::ShapeMismatch {
                operation,
                expected,
                found,
            }) => {
                assert_eq!(operation, "mse (columns)");
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }

        match ComparisonSeries::new(approx.view(), expected.view(), 3) {
            Err(ElmError::ShapeMismatch {
                operation,
                expected,
                found,
            }) => {
                assert_eq!(operation, "comparison plot (columns)");
                assert_eq!((expected, found), (1, 2));
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn comparison_series_sorts_by_prediction() {
        let approx = array![[0.3], [0.1], [0.9], [0.5]];
        let expected = array![[3.0], [1.0], [9.0], [5.0]];
        let series = ComparisonSeries::new(approx.view(), expected.view(), 3).unwrap();

        assert_eq!(series.line, vec![(0.0, 0.1), (1.0, 0.3), (2.0, 0.5)]);
        assert_eq!(series.scatter, vec![(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]);
        assert_eq!(series.value_bounds(), (0.1, 5.0));
    }

    #[test]
    fn comparison_series_caps_points_at_sample_count() {
        let approx = array![[2.0], [1.0]];
        let expected = array![[2.5], [0.5]];
        let series = ComparisonSeries::new(approx.view(), expected.view(), 100).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.scatter[0], (0.0, 0.5));
    }

    #[test]
    fn predictions_are_written_as_tsv() {
        let predictions = array![[1.0], [2.5]];
        let expected = array![[1.25], [2.0]];
        let file = NamedTempFile::new().unwrap();
        save_predictions(file.path(), predictions.view(), Some(expected.view())).unwrap();

        let text = fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, "prediction\texpected\n1.000000\t1.250000\n2.500000\t2.000000\n");
    }
}
