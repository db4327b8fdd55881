use crate::data::{DataContainer, LongRecord};
use crate::error::{LupinError, Result};
use crate::options::DataOptions;
use matrix_util::traits::SampleOps;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

#[derive(Clone, Debug)]
pub struct SimOptions {
    /// features per view
    pub view_dims: Vec<usize>,
    /// samples per group
    pub group_dims: Vec<usize>,
    /// true number of factors
    pub factors: usize,
    /// fraction of non-zero loadings
    pub loading_density: f64,
    pub noise_precision: f64,
    /// fraction of entries set to missing
    pub missing_fraction: f64,
    pub seed: u64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            view_dims: vec![20],
            group_dims: vec![100],
            factors: 3,
            loading_density: 0.5,
            noise_precision: 4.0,
            missing_fraction: 0.0,
            seed: 42,
        }
    }
}

/// Data blocks `y[m][g]` (`N_g x D_m`, NaN for missing) with the
/// ground truth that generated them
pub struct SimulatedData {
    pub blocks: Vec<Vec<DMatrix<f64>>>,
    pub view_names: Vec<Box<str>>,
    pub group_names: Vec<Box<str>>,
    /// `N_g x K`
    pub factors: Vec<DMatrix<f64>>,
    /// `D_m x K`
    pub loadings: Vec<DMatrix<f64>>,
}

/// y[m][g] = Z_g W_m' + eps, eps ~ N(0, 1/tau), with sparse W_m
pub fn simulate_multiview(opts: &SimOptions) -> Result<SimulatedData> {
    if opts.view_dims.is_empty() || opts.group_dims.is_empty() || opts.factors == 0 {
        return Err(LupinError::Configuration(
            "need at least one view, one group and one factor".into(),
        ));
    }
    if !(opts.noise_precision > 0.0) || !(0.0..1.0).contains(&opts.missing_fraction) {
        return Err(LupinError::Configuration(format!(
            "noise precision {} must be positive and missing fraction {} in [0, 1)",
            opts.noise_precision, opts.missing_fraction
        )));
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let kk = opts.factors;

    let noise = Normal::new(0.0, 1.0 / opts.noise_precision.sqrt())
        .map_err(|e| LupinError::Configuration(e.to_string()))?;

    let factors: Vec<DMatrix<f64>> = opts
        .group_dims
        .iter()
        .map(|&n| DMatrix::rnorm(n, kk, &mut rng))
        .collect();

    let loadings: Vec<DMatrix<f64>> = opts
        .view_dims
        .iter()
        .map(|&d| {
            let w = DMatrix::rnorm(d, kk, &mut rng);
            let s = DMatrix::runif(d, kk, &mut rng);
            w.zip_map(&s, |w, u| if u < opts.loading_density { w } else { 0.0 })
        })
        .collect();

    let blocks = loadings
        .iter()
        .map(|w| {
            factors
                .iter()
                .map(|z| {
                    let mut y = z * w.transpose();
                    for y_ij in y.iter_mut() {
                        *y_ij += noise.sample(&mut rng);
                        if rng.random::<f64>() < opts.missing_fraction {
                            *y_ij = f64::NAN;
                        }
                    }
                    y
                })
                .collect()
        })
        .collect();

    Ok(SimulatedData {
        blocks,
        view_names: (0..opts.view_dims.len())
            .map(|m| format!("view_{}", m).into_boxed_str())
            .collect(),
        group_names: (0..opts.group_dims.len())
            .map(|g| format!("group_{}", g).into_boxed_str())
            .collect(),
        factors,
        loadings,
    })
}

impl SimulatedData {
    pub fn to_container(&self, opts: &DataOptions) -> Result<DataContainer> {
        DataContainer::from_matrices(&self.blocks, &self.view_names, &self.group_names, opts)
    }

    /// Observed entries as long-form records
    pub fn to_long_records(&self) -> Vec<LongRecord> {
        let mut ret = vec![];
        for (m, row) in self.blocks.iter().enumerate() {
            for (g, y) in row.iter().enumerate() {
                for i in 0..y.nrows() {
                    for j in 0..y.ncols() {
                        if y[(i, j)].is_finite() {
                            ret.push(LongRecord {
                                view: self.view_names[m].clone(),
                                group: self.group_names[g].clone(),
                                sample: format!("{}_{}", self.group_names[g], i).into(),
                                feature: format!("{}_{}", self.view_names[m], j).into(),
                                value: y[(i, j)],
                            });
                        }
                    }
                }
            }
        }
        ret
    }
}
