use crate::backend::MatrixBackend;
use crate::data::DataContainer;
use crate::error::Result;
use crate::nodes::precision::expected_ssr;
use crate::nodes::{expand_row, NodeGraph};
use matrix_param::traits::Inference;
use serde::{Deserialize, Serialize};

/// Evidence lower bound and its parts
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElboTerms {
    /// E[log p(Y | Z, W, tau)] over the observed entries
    pub likelihood: f64,
    /// -KL(q(tau) || p(tau))
    pub precision: f64,
    /// E[log p(Z | alpha^Z)] + H[q(Z)]
    pub factors: f64,
    /// E[log p(what, s | alpha^W, theta)] + H[q(what, s)]
    pub loadings: f64,
    /// -KL of the loading ARD precisions
    pub loading_ard: f64,
    /// -KL of the inclusion probabilities
    pub sparsity: f64,
    /// -KL of the factor ARD precisions
    pub factor_ard: f64,
    pub total: f64,
}

fn xlogx(x: f64) -> f64 {
    if x > 0.0 {
        x * x.ln()
    } else {
        0.0
    }
}

/// Evaluate every term on the current state of `graph`
///
/// A model without factors contributes zero to every factor-indexed
/// term.
pub fn evaluate(
    graph: &NodeGraph,
    data: &DataContainer,
    backend: &dyn MatrixBackend,
) -> Result<ElboTerms> {
    let ln_2pi = (2.0 * std::f64::consts::PI).ln();
    let (nv, ng, kk) = (data.num_views(), data.num_groups(), graph.num_factors());

    let mut likelihood = 0.0;
    let mut precision = 0.0;

    for m in 0..nv {
        let dd = data.num_features(m);
        for g in 0..ng {
            let block = data.block(m, g);
            let tau = graph.precision(m, g);
            let ssr = expected_ssr(
                block.mask(),
                graph.residual(m, g),
                graph.factors(g),
                graph.loadings(m),
                backend,
            )?;
            let e_tau = expand_row(tau.posterior_mean(), dd);
            let e_log_tau = expand_row(tau.posterior_log_mean(), dd);

            likelihood += block
                .observed_per_feature()
                .into_iter()
                .enumerate()
                .map(|(d, n)| {
                    let n = n as f64;
                    0.5 * n * (e_log_tau[d] - ln_2pi) - 0.5 * e_tau[d] * ssr[(0, d)]
                })
                .sum::<f64>();

            precision -= tau.kl_divergence();
        }
    }

    let mut factors = 0.0;
    for g in 0..ng {
        let z = graph.factors(g);
        let ez2 = z.posterior_second_moment();
        for k in 0..kk {
            let (e_alpha, e_log_alpha) = match graph.factor_ard() {
                Some(ard) => (ard.posterior_mean()[(g, k)], ard.posterior_log_mean()[(g, k)]),
                None => (1.0, 0.0),
            };
            factors += ez2
                .column(k)
                .iter()
                .map(|&z2| 0.5 * (e_log_alpha - ln_2pi) - 0.5 * e_alpha * z2)
                .sum::<f64>();
        }
        factors += z.entropy();
    }

    let mut loadings = 0.0;
    for m in 0..nv {
        let w = graph.loadings(m);
        let mu = w.slab().posterior_mean();
        let var = w.slab().posterior_var();
        let gamma = w.inclusion();
        for k in 0..kk {
            let (e_alpha, e_log_alpha) = match graph.loading_ard() {
                Some(ard) => (ard.posterior_mean()[(m, k)], ard.posterior_log_mean()[(m, k)]),
                None => (1.0, 0.0),
            };
            let v0 = w.null_var()[(0, k)];
            let null = 0.5 * e_log_alpha - 0.5 * e_alpha * v0 + 0.5 * v0.ln() + 0.5;

            let (e_log_theta, e_log_1m_theta) = match graph.sparsity() {
                Some(theta) => (
                    theta.posterior_log_mean()[(m, k)],
                    theta.posterior_log_complement_mean()[(m, k)],
                ),
                None => (0.0, 0.0),
            };

            for d in 0..w.nrows() {
                let (mu, v, p) = (mu[(d, k)], var[(d, k)], gamma[(d, k)]);
                let slab = 0.5 * e_log_alpha - 0.5 * e_alpha * (mu * mu + v) + 0.5 * v.ln() + 0.5;
                loadings += p * slab;
                if graph.sparsity().is_some() {
                    loadings += (1.0 - p) * null
                        + p * e_log_theta
                        + (1.0 - p) * e_log_1m_theta
                        - xlogx(p)
                        - xlogx(1.0 - p);
                }
            }
        }
    }

    let loading_ard = -graph.loading_ard().map_or(0.0, |a| a.kl_divergence());
    let sparsity = -graph.sparsity().map_or(0.0, |t| t.kl_divergence());
    let factor_ard = -graph.factor_ard().map_or(0.0, |a| a.kl_divergence());

    let total = likelihood + precision + factors + loadings + loading_ard + sparsity + factor_ard;

    Ok(ElboTerms {
        likelihood,
        precision,
        factors,
        loadings,
        loading_ard,
        sparsity,
        factor_ard,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn xlogx_at_zero() {
        assert_abs_diff_eq!(xlogx(0.0), 0.0);
        assert_abs_diff_eq!(xlogx(1.0), 0.0);
        assert_abs_diff_eq!(xlogx(0.5), 0.5 * 0.5_f64.ln());
    }
}
