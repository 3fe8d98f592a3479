use approx::assert_abs_diff_eq;
use ndarray::{Array2, array};
use tempfile::tempdir;
use thickness_elm::ElmError;
use thickness_elm::archive::{
    DEFAULT_SIGNAL_KEY, DEFAULT_THICKNESS_KEY, MatrixArchive, load_raw, load_signal,
};
use thickness_elm::data::{RawData, bias, prepare};
use thickness_elm::evaluate::{ComparisonSeries, evaluate, mse};
use thickness_elm::fit::FitMethod;
use thickness_elm::model::TrainedNetwork;
use thickness_elm::pipeline::{Elm, PipelineConfig};

/// Smooth nonlinear target of the first three signal features. Rows visit the
/// underlying parameter in a scrambled order so the held-out tail interpolates.
fn synthetic_raw(n: usize, d: usize) -> RawData {
    let signal = Array2::from_shape_fn((n, d), |(i, j)| {
        let t = ((i * 37) % n) as f64 / n as f64;
        ((j + 1) as f64 * 3.1 * t).sin() * 1.5
    });
    let thickness = Array2::from_shape_fn((n, 1), |(i, _)| {
        let row = signal.row(i);
        2.0 + row[0] - 0.5 * row[1] + 0.25 * row[2] * row[2]
    });
    RawData { signal, thickness }
}

#[test]
fn four_row_scenario_produces_finite_mse() {
    let raw = RawData {
        signal: array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]],
        thickness: array![[1.0], [2.0], [3.0], [4.0]],
    };
    let prepared = prepare(&raw, 0.75).unwrap();

    assert_eq!(prepared.training.signal.dim(), (3, 3));
    assert_eq!(prepared.testing.signal.dim(), (1, 3));
    assert_eq!(prepared.training.signal.column(1).to_vec(), vec![1.0, 3.0, 5.0]);
    assert_eq!(prepared.testing.signal.row(0).to_vec(), vec![1.0, 7.0, 8.0]);

    let elm = Elm::new(PipelineConfig::single_stage(2).with_seed(2024)).unwrap();
    let network = elm.train(&prepared.training).unwrap();
    assert_eq!(network.stages[0].weights.dim(), (3, 2));

    let evaluation = evaluate(&network, &prepared.testing).unwrap();
    assert!(evaluation.mse.is_finite());
    assert!(evaluation.mse >= 0.0);
}

#[test]
fn single_stage_network_learns_smooth_target() {
    let prepared = prepare(&synthetic_raw(200, 4), 0.75).unwrap();
    let elm = Elm::new(PipelineConfig::single_stage(15).with_seed(7)).unwrap();
    let network = elm
        .train(&prepared.training)
        .unwrap()
        .with_normalization(prepared.normalization);

    let evaluation = evaluate(&network, &prepared.testing).unwrap();

    // Predicting the mean of the normalized target would score its variance.
    let targets = &prepared.testing.thickness;
    let mean = targets.mean().unwrap();
    let baseline = targets.mapv(|t| (t - mean).powi(2)).mean().unwrap();
    assert!(
        evaluation.mse < baseline,
        "ELM mse {} should beat the constant baseline {}",
        evaluation.mse,
        baseline
    );
}

#[test]
fn stacked_network_round_trips_through_disk() {
    let dir = tempdir().unwrap();
    let raw = synthetic_raw(120, 5);

    // Measurement archives are stored one column per sample.
    let mut archive = MatrixArchive::new();
    archive.insert(DEFAULT_SIGNAL_KEY, raw.signal.t().to_owned());
    archive.insert(DEFAULT_THICKNESS_KEY, raw.thickness.t().to_owned());
    let data_path = dir.path().join("data.toml");
    archive.save(&data_path).unwrap();

    let loaded = load_raw(&data_path, DEFAULT_SIGNAL_KEY, DEFAULT_THICKNESS_KEY).unwrap();
    assert_eq!(loaded.signal, raw.signal);
    let prepared = prepare(&loaded, 0.7).unwrap();

    let config = PipelineConfig::stacked(20, 6, 30)
        .with_seed(31)
        .with_fit_method(FitMethod::LeastSquares);
    let network = Elm::new(config)
        .unwrap()
        .train(&prepared.training)
        .unwrap()
        .with_normalization(prepared.normalization);
    let evaluation = evaluate(&network, &prepared.testing).unwrap();

    let network_path = dir.path().join("network.toml");
    network.save(&network_path).unwrap();
    let reloaded = TrainedNetwork::load(&network_path).unwrap();
    assert_eq!(reloaded, network);

    // Reloaded inference on raw signal reproduces the held-out predictions.
    let (signal, thickness) =
        load_signal(&data_path, DEFAULT_SIGNAL_KEY, DEFAULT_THICKNESS_KEY).unwrap();
    let predictions = reloaded.predict_thickness(bias(signal.view()).view()).unwrap();
    let n_train = prepared.training.n_samples();
    let (approx, expected) = evaluation.denormalized(&network);
    for (i, value) in approx.column(0).iter().enumerate() {
        assert_abs_diff_eq!(predictions[[n_train + i, 0]], *value, epsilon = 1e-6);
    }
    let thickness = thickness.unwrap();
    for (i, value) in expected.column(0).iter().enumerate() {
        assert_abs_diff_eq!(thickness[[n_train + i, 0]], *value, epsilon = 1e-10);
    }

    let series = ComparisonSeries::new(approx.view(), expected.view(), 10).unwrap();
    assert_eq!(series.len(), 10);
    assert!(series.line.windows(2).all(|w| w[0].1 <= w[1].1));
}

#[test]
fn reloaded_network_rejects_wrong_signal_width() {
    let prepared = prepare(&synthetic_raw(40, 3), 0.75).unwrap();
    let network = Elm::new(PipelineConfig::single_stage(8).with_seed(3))
        .unwrap()
        .train(&prepared.training)
        .unwrap();

    let too_wide = Array2::ones((5, 6));
    match network.predict(too_wide.view()) {
        Err(ElmError::ShapeMismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, 4);
            assert_eq!(found, 6);
        }
        other => panic!("Expected ShapeMismatch, got {:?}", other),
    }
}

#[test]
fn zero_range_targets_fail_before_training() {
    let raw = RawData {
        signal: Array2::ones((10, 2)),
        thickness: Array2::from_elem((10, 1), 0.8),
    };
    assert!(matches!(
        prepare(&raw, 0.75),
        Err(ElmError::InvalidInput { .. })
    ));
}

#[test]
fn mse_on_identical_predictions_is_zero() {
    let values = array![[0.1], [0.2], [0.3]];
    assert_eq!(mse(values.view(), values.view()).unwrap(), 0.0);
}
