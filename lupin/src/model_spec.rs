use crate::data::DataContainer;
use crate::error::{LupinError, Result};
use crate::options::ModelOptions;
use serde::{Deserialize, Serialize};

/// Gamma(a0, b0) prior of the noise and ARD precisions
pub const PRECISION_A0: f64 = 1e-3;
pub const PRECISION_B0: f64 = 1e-3;

/// Beta(a0, b0) prior of the spike-and-slab inclusion probabilities
pub const THETA_A0: f64 = 1.0;
pub const THETA_B0: f64 = 1.0;

/// Dimensions and prior families of a model, derived from the data
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSpec {
    pub num_factors: usize,
    /// D_m
    pub view_dims: Vec<usize>,
    /// N_g
    pub group_dims: Vec<usize>,
    pub ard_weights: bool,
    pub spikeslab_weights: bool,
    pub ard_factors: bool,
    pub noise_per_feature: bool,
}

impl ModelSpec {
    pub fn new(data: &DataContainer, opts: &ModelOptions) -> Result<Self> {
        let total = data.total_samples();
        if opts.factors == 0 {
            return Err(LupinError::Configuration(
                "the number of factors must be positive".into(),
            ));
        }
        if opts.factors > total {
            return Err(LupinError::Configuration(format!(
                "{} factors for {} samples",
                opts.factors, total
            )));
        }

        Ok(Self {
            num_factors: opts.factors,
            view_dims: (0..data.num_views()).map(|m| data.num_features(m)).collect(),
            group_dims: (0..data.num_groups()).map(|g| data.num_samples(g)).collect(),
            ard_weights: opts.ard_weights,
            spikeslab_weights: opts.spikeslab_weights,
            ard_factors: opts.ard_factors,
            noise_per_feature: opts.noise_per_feature,
        })
    }

    pub fn num_views(&self) -> usize {
        self.view_dims.len()
    }

    pub fn num_groups(&self) -> usize {
        self.group_dims.len()
    }

    /// columns of a precision node of view `m`
    pub fn noise_dim(&self, m: usize) -> usize {
        if self.noise_per_feature {
            self.view_dims[m]
        } else {
            1
        }
    }
}
