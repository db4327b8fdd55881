//! Variational posterior nodes and their closed-form updates.
//!
//! Every node kind has an update function in the dispatch table
//! below; the scheduler calls them in [`NodeKind::SCHEDULE`] order.
//! The graph also carries the masked residuals
//! `R[m][g] = O .* (Y - E[Z] E[W]')` that the factor and loading
//! updates keep in sync as they change one factor at a time.

pub mod ard;
pub mod factors;
pub mod loadings;
pub mod precision;
pub mod sparsity;

pub use loadings::LoadingNode;

use crate::backend::MatrixBackend;
use crate::data::DataContainer;
use crate::error::{LupinError, Result};
use crate::model_spec::*;
use crate::options::InitMethod;
use crate::variance::variance_explained;

use log::debug;
use matrix_param::dmatrix_beta::BetaMatrix;
use matrix_param::dmatrix_gamma::GammaMatrix;
use matrix_param::dmatrix_gaussian::GaussianMatrix;
use matrix_param::traits::*;
use matrix_util::traits::{RandomizedAlgs, SampleOps};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

pub type Mat = DMatrix<f64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Factors,
    Loadings,
    Precision,
    FactorArd,
    LoadingArd,
    LoadingSparsity,
}

pub type UpdateFn = fn(&mut NodeGraph, &DataContainer, &dyn MatrixBackend) -> Result<()>;

/// indexed by `NodeKind as usize`
const DISPATCH: [(NodeKind, UpdateFn); 6] = [
    (NodeKind::Factors, factors::update_factors as UpdateFn),
    (NodeKind::Loadings, loadings::update_loadings as UpdateFn),
    (NodeKind::Precision, precision::update_precision as UpdateFn),
    (NodeKind::FactorArd, ard::update_factor_ard as UpdateFn),
    (NodeKind::LoadingArd, ard::update_loading_ard as UpdateFn),
    (NodeKind::LoadingSparsity, sparsity::update_sparsity as UpdateFn),
];

impl NodeKind {
    /// the fixed order of one coordinate ascent sweep
    pub const SCHEDULE: [NodeKind; 6] = [
        NodeKind::Factors,
        NodeKind::Loadings,
        NodeKind::Precision,
        NodeKind::FactorArd,
        NodeKind::LoadingArd,
        NodeKind::LoadingSparsity,
    ];

    pub fn update_fn(self) -> UpdateFn {
        let (kind, func) = DISPATCH[self as usize];
        debug_assert_eq!(kind, self);
        func
    }

    /// whether the model carries this node
    pub fn is_present(self, spec: &ModelSpec) -> bool {
        match self {
            NodeKind::Factors | NodeKind::Loadings | NodeKind::Precision => true,
            NodeKind::FactorArd => spec.ard_factors,
            NodeKind::LoadingArd => spec.ard_weights,
            NodeKind::LoadingSparsity => spec.spikeslab_weights,
        }
    }
}

pub struct NodeGraph {
    /// q(Z_g), `N_g x K`
    pub(crate) factors: Vec<GaussianMatrix>,
    /// q(W_m), `D_m x K`
    pub(crate) loadings: Vec<LoadingNode>,
    /// q(tau_mg), `1 x D_m` or `1 x 1`, indexed `[m][g]`
    pub(crate) precision: Vec<Vec<GammaMatrix>>,
    /// q(alpha^W), `M x K`
    pub(crate) loading_ard: Option<GammaMatrix>,
    /// q(theta), `M x K`
    pub(crate) sparsity: Option<BetaMatrix>,
    /// q(alpha^Z), `G x K`
    pub(crate) factor_ard: Option<GammaMatrix>,
    /// masked residuals, indexed `[m][g]`
    pub(crate) residuals: Vec<Vec<Mat>>,
    /// original indices of the factors still in the model
    active: Vec<usize>,
}

/// `x[:, k]` as a column matrix
pub(crate) fn column_of(x: &Mat, k: usize) -> Mat {
    x.columns(k, 1).into_owned()
}

/// Posterior mean of a precision node as a `D x 1` column, expanding
/// a shared scalar
pub(crate) fn expected_tau_column(tau: &GammaMatrix, dim: usize) -> Mat {
    expand_row(tau.posterior_mean(), dim)
}

pub(crate) fn expand_row(x: &Mat, dim: usize) -> Mat {
    if x.ncols() == dim {
        x.transpose()
    } else {
        Mat::from_element(dim, 1, x[(0, 0)])
    }
}

/// Move `x[i][j]` to `out[j][i]` without copying the elements
pub(crate) fn transpose_blocks<T>(x: Vec<Vec<T>>) -> Vec<Vec<T>> {
    let ncols = x.first().map(|r| r.len()).unwrap_or(0);
    let mut out: Vec<Vec<T>> = (0..ncols).map(|_| Vec::with_capacity(x.len())).collect();
    for row in x {
        for (j, v) in row.into_iter().enumerate() {
            out[j].push(v);
        }
    }
    out
}

impl NodeGraph {
    /// Initialise every node with the seeded random stream `rng`
    pub fn initialize(
        data: &DataContainer,
        spec: &ModelSpec,
        init: InitMethod,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let kk = spec.num_factors;

        let factors = spec
            .group_dims
            .iter()
            .enumerate()
            .map(|(g, &n)| -> Result<GaussianMatrix> {
                let mean = match init {
                    InitMethod::Random => Mat::rnorm(n, kk, rng),
                    InitMethod::Pca => pca_factors(data, g, kk, rng)?,
                };
                let mut z = GaussianMatrix::new((n, kk), 0.0, 0.0);
                z.set_moments(&mean, &Mat::from_element(n, kk, 1.0));
                Ok(z)
            })
            .collect::<Result<Vec<_>>>()?;

        let loadings = spec
            .view_dims
            .iter()
            .map(|&d| LoadingNode::new(&Mat::rnorm(d, kk, rng), spec.spikeslab_weights))
            .collect::<Vec<_>>();

        let precision = (0..spec.num_views())
            .map(|m| {
                (0..spec.num_groups())
                    .map(|g| init_precision(data, spec, m, g))
                    .collect()
            })
            .collect();

        let (nv, ng) = (spec.num_views(), spec.num_groups());

        let loading_ard = spec.ard_weights.then(|| {
            let shape = Mat::from_fn(nv, kk, |m, _| {
                PRECISION_A0 + 0.5 * spec.view_dims[m] as f64
            });
            let mut ard = GammaMatrix::new((nv, kk), PRECISION_A0, PRECISION_B0);
            ard.set_stat(&shape, &shape);
            ard.calibrate();
            ard
        });

        let sparsity = spec.spikeslab_weights.then(|| {
            let half = Mat::from_fn(nv, kk, |m, _| 0.5 * spec.view_dims[m] as f64);
            let mut theta = BetaMatrix::new((nv, kk), THETA_A0, THETA_B0);
            theta.add_stat(&half, &half);
            theta.calibrate();
            theta
        });

        let factor_ard = spec.ard_factors.then(|| {
            let shape = Mat::from_fn(ng, kk, |g, _| {
                PRECISION_A0 + 0.5 * spec.group_dims[g] as f64
            });
            let mut ard = GammaMatrix::new((ng, kk), PRECISION_A0, PRECISION_B0);
            ard.set_stat(&shape, &shape);
            ard.calibrate();
            ard
        });

        let mut ret = Self {
            factors,
            loadings,
            precision,
            loading_ard,
            sparsity,
            factor_ard,
            residuals: vec![],
            active: (0..kk).collect(),
        };
        ret.recompute_residuals(data);
        Ok(ret)
    }

    pub fn num_factors(&self) -> usize {
        self.active.len()
    }

    /// original indices of the remaining factors
    pub fn active_factors(&self) -> &[usize] {
        &self.active
    }

    pub fn factors(&self, g: usize) -> &GaussianMatrix {
        &self.factors[g]
    }

    pub fn loadings(&self, m: usize) -> &LoadingNode {
        &self.loadings[m]
    }

    pub fn precision(&self, m: usize, g: usize) -> &GammaMatrix {
        &self.precision[m][g]
    }

    pub fn loading_ard(&self) -> Option<&GammaMatrix> {
        self.loading_ard.as_ref()
    }

    pub fn sparsity(&self) -> Option<&BetaMatrix> {
        self.sparsity.as_ref()
    }

    pub fn factor_ard(&self) -> Option<&GammaMatrix> {
        self.factor_ard.as_ref()
    }

    pub fn residual(&self, m: usize, g: usize) -> &Mat {
        &self.residuals[m][g]
    }

    /// `R[m][g] = O .* (Y - E[Z] E[W]')` from scratch
    ///
    /// The residual cache stays in host `f64` whatever the backend's
    /// precision, since every factor update subtracts from it.
    pub fn recompute_residuals(&mut self, data: &DataContainer) {
        self.residuals = (0..self.loadings.len())
            .map(|m| {
                (0..self.factors.len())
                    .map(|g| {
                        let block = data.block(m, g);
                        let fit = self.factors[g].posterior_mean()
                            * self.loadings[m].posterior_mean().transpose();
                        (block.data() - fit).component_mul(block.mask())
                    })
                    .collect()
            })
            .collect();
    }

    /// Keep the factors at positions `keep` (relative to the current
    /// set) in every factor-indexed node
    pub fn keep_factors(&mut self, keep: &[usize], data: &DataContainer) {
        self.factors.iter_mut().for_each(|z| z.keep_columns(keep));
        self.loadings.iter_mut().for_each(|w| w.keep_columns(keep));
        if let Some(ard) = self.loading_ard.as_mut() {
            ard.keep_columns(keep);
        }
        if let Some(theta) = self.sparsity.as_mut() {
            theta.keep_columns(keep);
        }
        if let Some(ard) = self.factor_ard.as_mut() {
            ard.keep_columns(keep);
        }
        self.active = keep.iter().map(|&k| self.active[k]).collect();
        self.recompute_residuals(data);
    }

    /// Remove every factor whose largest fraction of explained
    /// variance over all (view, group) blocks falls below `min_r2`;
    /// returns the original indices of the removed factors
    pub fn drop_factors_below(
        &mut self,
        min_r2: f64,
        data: &DataContainer,
        backend: &dyn MatrixBackend,
    ) -> Result<Vec<usize>> {
        let r2 = variance_explained(self, data, backend)?;
        let max_r2 = r2.max_per_factor();

        let (keep, drop): (Vec<usize>, Vec<usize>) =
            (0..self.num_factors()).partition(|&k| max_r2[k] >= min_r2);

        if drop.is_empty() {
            return Ok(vec![]);
        }

        let dropped: Vec<usize> = drop.iter().map(|&k| self.active[k]).collect();
        debug!(
            "dropping factor(s) {:?} with max R2 {:?}",
            dropped,
            drop.iter().map(|&k| max_r2[k]).collect::<Vec<_>>()
        );
        self.keep_factors(&keep, data);
        Ok(dropped)
    }

    /// Every posterior parameter is finite
    pub fn check_finite(&self) -> Result<()> {
        let bad = |what: &str| Err(LupinError::Numerical(format!("non-finite {}", what)));

        if !self.factors.iter().all(|z| z.is_finite()) {
            return bad("factors");
        }
        if !self.loadings.iter().all(|w| w.is_finite()) {
            return bad("loadings");
        }
        if !self.precision.iter().flatten().all(|t| t.is_finite()) {
            return bad("noise precision");
        }
        if !self.loading_ard.as_ref().is_none_or(|a| a.is_finite()) {
            return bad("loading ARD precision");
        }
        if !self.sparsity.as_ref().is_none_or(|t| t.is_finite()) {
            return bad("loading sparsity");
        }
        if !self.factor_ard.as_ref().is_none_or(|a| a.is_finite()) {
            return bad("factor ARD precision");
        }
        Ok(())
    }
}

/// `E[tau] = 1 / var` of the observed entries, with the shape already
/// at its posterior value `a0 + n/2`
fn init_precision(data: &DataContainer, spec: &ModelSpec, m: usize, g: usize) -> GammaMatrix {
    let block = data.block(m, g);
    let dim = spec.noise_dim(m);

    let (nobs, vars): (Vec<f64>, Vec<Option<f64>>) = if spec.noise_per_feature {
        (
            block
                .observed_per_feature()
                .into_iter()
                .map(|n| n as f64)
                .collect(),
            block.observed_feature_variances(),
        )
    } else {
        (
            vec![block.num_observed() as f64],
            vec![block.observed_variance()],
        )
    };

    let shape = Mat::from_iterator(1, dim, nobs.iter().map(|n| PRECISION_A0 + 0.5 * n));
    let rate = Mat::from_iterator(
        1,
        dim,
        shape.iter().zip(vars.iter()).map(|(a, v)| {
            let v = (*v).filter(|v| *v > 0.0).unwrap_or(1.0);
            a * v
        }),
    );

    let mut tau = GammaMatrix::new((1, dim), PRECISION_A0, PRECISION_B0);
    tau.set_stat(&shape, &rate);
    tau.calibrate();
    tau
}

/// Leading left singular vectors of the group's concatenated views,
/// standardised; columns beyond the recovered rank are random
fn pca_factors(data: &DataContainer, g: usize, kk: usize, rng: &mut StdRng) -> Result<Mat> {
    let n = data.num_samples(g);
    let total_dim: usize = (0..data.num_views()).map(|m| data.num_features(m)).sum();

    let mut ymat = Mat::zeros(n, total_dim);
    let mut offset = 0;
    for m in 0..data.num_views() {
        let y = data.block(m, g).data();
        ymat.columns_mut(offset, y.ncols()).copy_from(y);
        offset += y.ncols();
    }

    let (u, _, _) = ymat
        .rsvd(kk, rng)
        .map_err(|e| LupinError::Numerical(format!("PCA initialisation: {}", e)))?;

    let mut z = Mat::rnorm(n, kk, rng);
    for k in 0..u.ncols().min(kk) {
        let u_k = u.column(k);
        let mu = u_k.mean();
        let sd = (u_k.map(|x| (x - mu) * (x - mu)).sum() / (n.max(2) - 1) as f64).sqrt();
        if sd > 0.0 && sd.is_finite() {
            z.set_column(k, &u_k.map(|x| (x - mu) / sd));
        }
    }
    Ok(z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_table_matches_kinds() {
        for kind in NodeKind::SCHEDULE {
            assert_eq!(DISPATCH[kind as usize].0, kind);
        }
    }

    #[test]
    fn transpose_moves_blocks() {
        let x = vec![vec![1, 2, 3], vec![4, 5, 6]];
        assert_eq!(
            transpose_blocks(x),
            vec![vec![1, 4], vec![2, 5], vec![3, 6]]
        );
    }
}
