//! # Multi-Stage Pipeline Composer
//!
//! Chains any number of random stages and fits the output layer against the
//! last one. Two shapes are in common use:
//!
//! - single stage: `signal → hidden(W_in) → fit`
//! - stacked: `signal → rm → hidden(W0_in) → hidden(W1_in) → fit`, where the
//!   random mapping and the autoencoder-style first hidden layer are
//!   orthogonalized and the last hidden layer is plain.
//!
//! Every matrix drawn during training is recorded in the `TrainedNetwork`,
//! and the network replays exactly those matrices through `Stage::forward`
//! for testing and inference.

use crate::data::Dataset;
use crate::error::ElmError;
use crate::fit::{FitMethod, fit};
use crate::hidden::{Activation, orthogonalize, random_weights};
use crate::model::{OutputLayer, Stage, StageKind, TrainedNetwork};
use ndarray::{CowArray, Ix2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub kind: StageKind,
    pub width: usize,
    #[serde(default)]
    pub orthogonalize: bool,
}

impl StageConfig {
    pub fn projection(width: usize) -> Self {
        Self {
            kind: StageKind::Projection,
            width,
            orthogonalize: true,
        }
    }

    pub fn hidden(width: usize, orthogonalize: bool) -> Self {
        Self {
            kind: StageKind::Hidden,
            width,
            orthogonalize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default)]
    pub fit_method: FitMethod,
    /// Master switch for the per-stage `orthogonalize` flags.
    #[serde(default = "default_orthogonalize")]
    pub orthogonalize: bool,
    /// Fixed seed for reproducible weights; drawn at random when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_orthogonalize() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::single_stage(4700)
    }
}

impl PipelineConfig {
    /// One plain hidden layer.
    pub fn single_stage(width: usize) -> Self {
        Self {
            stages: vec![StageConfig::hidden(width, false)],
            activation: Activation::Sigmoid,
            fit_method: FitMethod::PseudoInverse,
            orthogonalize: true,
            seed: None,
        }
    }

    /// Orthogonal random mapping, orthogonal autoencoder-style layer, plain hidden layer.
    pub fn stacked(projection: usize, autoencoder: usize, hidden: usize) -> Self {
        Self {
            stages: vec![
                StageConfig::projection(projection),
                StageConfig::hidden(autoencoder, true),
                StageConfig::hidden(hidden, false),
            ],
            ..Self::single_stage(hidden)
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_fit_method(mut self, fit_method: FitMethod) -> Self {
        self.fit_method = fit_method;
        self
    }

    pub fn validate(&self) -> Result<(), ElmError> {
        let Some(last) = self.stages.last() else {
            return Err(ElmError::invalid(
                "pipeline configuration",
                "at least one stage is required",
            ));
        };
        if last.kind != StageKind::Hidden {
            return Err(ElmError::invalid(
                "pipeline configuration",
                "the last stage must be a hidden layer",
            ));
        }
        if let Some(pos) = self.stages.iter().position(|stage| stage.width == 0) {
            return Err(ElmError::invalid(
                "pipeline configuration",
                format!("stage {pos} has zero width"),
            ));
        }
        Ok(())
    }
}

/// The ELM trainer for one configuration.
#[derive(Debug, Clone)]
pub struct Elm {
    config: PipelineConfig,
}

impl Elm {
    pub fn new(config: PipelineConfig) -> Result<Self, ElmError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Trains with weights drawn from the configured seed (or a fresh one).
    pub fn train(&self, training: &Dataset) -> Result<TrainedNetwork, ElmError> {
        let seed = self.config.seed.unwrap_or_else(|| rand::thread_rng().r#gen());
        log::info!("Sampling stage weights with seed {}", seed);
        let mut rng = StdRng::seed_from_u64(seed);
        self.train_with_rng(training, &mut rng)
    }

    pub fn train_with_rng<R: Rng + ?Sized>(
        &self,
        training: &Dataset,
        rng: &mut R,
    ) -> Result<TrainedNetwork, ElmError> {
        if training.n_samples() == 0 {
            return Err(ElmError::invalid("train", "the training set is empty"));
        }

        let names = internal::stage_names(&self.config.stages);
        let mut stages = Vec::with_capacity(self.config.stages.len());
        let mut current: CowArray<'_, f64, Ix2> = CowArray::from(training.signal.view());

        for (stage_config, name) in self.config.stages.iter().zip(names.stage_names) {
            let stage = self.sample_stage(stage_config, name, current.ncols(), rng)?;
            let next = stage.forward(current.view())?;
            log::debug!(
                "Stage '{}' ({:?}): {}x{} -> {}x{}",
                stage.name,
                stage.kind,
                current.nrows(),
                current.ncols(),
                next.nrows(),
                next.ncols()
            );
            current = CowArray::from(next);
            stages.push(stage);
        }

        let weights = fit(
            current.view(),
            training.thickness.view(),
            self.config.fit_method,
        )?;

        let network = TrainedNetwork {
            normalization: None,
            stages,
            output: OutputLayer {
                name: names.output_name,
                weights,
            },
        };
        log::info!(
            "Trained network with {} stage(s) on {} samples; output layer {}x{}",
            network.stages.len(),
            training.n_samples(),
            network.output.weights.nrows(),
            network.output.weights.ncols()
        );
        Ok(network)
    }

    fn sample_stage<R: Rng + ?Sized>(
        &self,
        stage_config: &StageConfig,
        name: String,
        input_width: usize,
        rng: &mut R,
    ) -> Result<Stage, ElmError> {
        let mut weights = random_weights(rng, input_width, stage_config.width);
        if self.config.orthogonalize && stage_config.orthogonalize {
            weights = orthogonalize(&weights)?;
            if weights.ncols() < stage_config.width {
                log::warn!(
                    "Stage '{}' asked for {} orthogonal columns but its input has width {}; using {}",
                    name,
                    stage_config.width,
                    input_width,
                    weights.ncols()
                );
            }
        }

        let activation = match stage_config.kind {
            StageKind::Projection => Activation::Identity,
            StageKind::Hidden => self.config.activation,
        };
        Ok(Stage {
            name,
            kind: stage_config.kind,
            activation,
            weights,
        })
    }
}

mod internal {
    use super::*;

    pub(super) struct Names {
        pub stage_names: Vec<String>,
        pub output_name: String,
    }

    /// `rm` for a lone projection (`rm0`, `rm1`, ... otherwise), `w{i}_in` for
    /// hidden layers, `w{last}_out` for the fitted output.
    pub(super) fn stage_names(stages: &[StageConfig]) -> Names {
        let projections = stages
            .iter()
            .filter(|stage| stage.kind == StageKind::Projection)
            .count();
        let mut projection_idx = 0;
        let mut hidden_idx = 0;
        let mut stage_names = Vec::with_capacity(stages.len());

        for stage in stages {
            match stage.kind {
                StageKind::Projection => {
                    if projections == 1 {
                        stage_names.push("rm".to_string());
                    } else {
                        stage_names.push(format!("rm{projection_idx}"));
                    }
                    projection_idx += 1;
                }
                StageKind::Hidden => {
                    stage_names.push(format!("w{hidden_idx}_in"));
                    hidden_idx += 1;
                }
            }
        }

        Names {
            stage_names,
            output_name: format!("w{}_out", hidden_idx.saturating_sub(1)),
        }
    }
}
