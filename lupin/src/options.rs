use crate::error::{LupinError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Relative ELBO change thresholds
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceMode {
    #[default]
    Fast,
    Medium,
    Slow,
}

impl ConvergenceMode {
    pub fn epsilon(&self) -> f64 {
        match self {
            ConvergenceMode::Fast => 5e-6,
            ConvergenceMode::Medium => 1e-6,
            ConvergenceMode::Slow => 1e-7,
        }
    }
}

/// Accelerator used when `gpu_mode` is on
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GpuDevice {
    #[default]
    Cuda,
    Metal,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InitMethod {
    /// factors and loadings drawn from N(0,1)
    #[default]
    Random,
    /// factors from a randomized SVD of each group's concatenated views
    Pca,
}

/// Preprocessing applied once when the data container is built
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataOptions {
    /// subtract the per-group, per-feature mean of observed entries
    pub center_groups: bool,
    /// divide each view by its pooled observed standard deviation
    pub scale_views: bool,
    /// divide each (view, group) block by its observed standard deviation
    pub scale_groups: bool,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            center_groups: true,
            scale_views: false,
            scale_groups: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelOptions {
    /// number of latent factors K
    pub factors: usize,
    /// ARD prior on the loadings of each (view, factor)
    pub ard_weights: bool,
    /// spike-and-slab prior on the loadings
    pub spikeslab_weights: bool,
    /// ARD prior on the factors of each (group, factor)
    pub ard_factors: bool,
    /// one noise precision per feature rather than per (view, group)
    pub noise_per_feature: bool,
    /// restrict the data to these views
    pub views: Option<Vec<Box<str>>>,
    /// restrict the data to these groups
    pub groups: Option<Vec<Box<str>>>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            factors: 10,
            ard_weights: true,
            spikeslab_weights: true,
            ard_factors: false,
            noise_per_feature: true,
            views: None,
            groups: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainOptions {
    /// maximum number of iterations
    pub iter: usize,
    /// evaluate the ELBO every `freq_elbo` iterations (0: never)
    pub freq_elbo: usize,
    /// drop factors explaining less variance than this in every block
    pub drop_r2: Option<f64>,
    /// first iteration at which convergence is tested
    pub start_elbo: usize,
    pub verbose: bool,
    pub seed: u64,
    pub convergence_mode: ConvergenceMode,
    pub gpu_mode: bool,
    pub gpu_device: GpuDevice,
    /// run on the CPU if the accelerator can't be opened
    pub gpu_fallback: bool,
    pub init: InitMethod,
    /// wall-clock budget in seconds, checked between iterations
    pub timeout: Option<f64>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            iter: 1000,
            freq_elbo: 1,
            drop_r2: None,
            start_elbo: 1,
            verbose: false,
            seed: 42,
            convergence_mode: ConvergenceMode::Fast,
            gpu_mode: false,
            gpu_device: GpuDevice::Cuda,
            gpu_fallback: false,
            init: InitMethod::Random,
            timeout: None,
        }
    }
}

impl TrainOptions {
    pub fn validate(&self) -> Result<()> {
        if self.iter == 0 {
            return Err(LupinError::Configuration(
                "the iteration budget must be positive".into(),
            ));
        }
        if let Some(r2) = self.drop_r2 {
            if !(0.0..1.0).contains(&r2) {
                return Err(LupinError::Configuration(format!(
                    "drop_r2 = {} is outside [0, 1)",
                    r2
                )));
            }
        }
        if let Some(timeout) = self.timeout {
            if !(timeout > 0.0) {
                return Err(LupinError::Configuration(format!(
                    "timeout = {} must be positive",
                    timeout
                )));
            }
        }
        Ok(())
    }
}
