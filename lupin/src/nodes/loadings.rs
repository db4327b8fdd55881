use super::*;
use rayon::prelude::*;

/// Spike-and-slab loadings `w = s * what` of one view, `D x K`
///
/// q(what, s) = q(s) q(what | s) with q(s = 1) = gamma,
/// q(what | s = 1) = N(mu, sigma^2) and the prior-matching
/// q(what | s = 0) = N(0, v0). Without the sparsity prior gamma = 1.
#[derive(Clone, Debug)]
pub struct LoadingNode {
    slab: GaussianMatrix,
    gamma: Mat,
    /// v0 of each factor, `1 x K`
    null_var: Mat,
    mean: Mat,
    second_moment: Mat,
    sd: Mat,
}

impl LoadingNode {
    pub fn new(slab_mean: &Mat, spikeslab: bool) -> Self {
        let (dd, kk) = slab_mean.shape();
        let mut slab = GaussianMatrix::new((dd, kk), 0.0, 0.0);
        slab.set_moments(slab_mean, &Mat::from_element(dd, kk, 1.0));
        let gamma0 = if spikeslab { 0.5 } else { 1.0 };
        let mut ret = Self {
            slab,
            gamma: Mat::from_element(dd, kk, gamma0),
            null_var: Mat::from_element(1, kk, 1.0),
            mean: Mat::zeros(dd, kk),
            second_moment: Mat::zeros(dd, kk),
            sd: Mat::zeros(dd, kk),
        };
        ret.refresh_moments();
        ret
    }

    /// q(what | s = 1)
    pub fn slab(&self) -> &GaussianMatrix {
        &self.slab
    }

    /// q(s = 1)
    pub fn inclusion(&self) -> &Mat {
        &self.gamma
    }

    pub fn null_var(&self) -> &Mat {
        &self.null_var
    }

    /// E[w^2] = gamma (mu^2 + sigma^2)
    pub fn second_moment(&self) -> &Mat {
        &self.second_moment
    }

    /// E[what^2] = gamma (mu^2 + sigma^2) + (1 - gamma) v0
    pub fn slab_second_moment(&self) -> Mat {
        let mut ret = self.slab.posterior_second_moment();
        for k in 0..ret.ncols() {
            let v0 = self.null_var[(0, k)];
            for d in 0..ret.nrows() {
                let g = self.gamma[(d, k)];
                ret[(d, k)] = g * ret[(d, k)] + (1.0 - g) * v0;
            }
        }
        ret
    }

    fn refresh_moments(&mut self) {
        let slab2 = self.slab.posterior_second_moment();
        self.mean = self.gamma.component_mul(self.slab.posterior_mean());
        self.second_moment = self.gamma.component_mul(&slab2);
        self.sd = self
            .second_moment
            .zip_map(&self.mean, |s, m| (s - m * m).max(0.0).sqrt());
    }

    fn set_column(&mut self, k: usize, num: &Mat, prec: &Mat, gamma: &Mat, null_var: f64) {
        self.slab.update_stat_col(num, prec, k);
        self.slab.calibrate_col(k);
        self.gamma.set_column(k, &gamma.column(0));
        self.null_var[(0, k)] = null_var;

        let mu = self.slab.posterior_mean().column(k);
        let var = self.slab.posterior_var().column(k);
        for d in 0..self.gamma.nrows() {
            let g = self.gamma[(d, k)];
            let m = g * mu[d];
            let s = g * (mu[d] * mu[d] + var[d]);
            self.mean[(d, k)] = m;
            self.second_moment[(d, k)] = s;
            self.sd[(d, k)] = (s - m * m).max(0.0).sqrt();
        }
    }

    pub(crate) fn keep_columns(&mut self, keep: &[usize]) {
        self.slab.keep_columns(keep);
        self.gamma = self.gamma.select_columns(keep);
        self.null_var = self.null_var.select_columns(keep);
        self.refresh_moments();
    }
}

impl Inference for LoadingNode {
    type Mat = Mat;
    type Scalar = f64;

    /// E[w] = gamma * mu
    fn posterior_mean(&self) -> &Mat {
        &self.mean
    }

    fn posterior_sd(&self) -> &Mat {
        &self.sd
    }

    fn is_finite(&self) -> bool {
        self.slab.is_finite()
            && self.gamma.iter().all(|g| g.is_finite())
            && self.null_var.iter().all(|v| v.is_finite() && *v > 0.0)
    }

    fn nrows(&self) -> usize {
        self.mean.nrows()
    }

    fn ncols(&self) -> usize {
        self.mean.ncols()
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Loadings of every view, one factor at a time, pooling the
/// sufficient statistics of all groups
///
/// lambda = E[alpha] + sum_g tau_g .* (O_g' E[z_k^2])
/// mu = lambda^-1 sum_g tau_g .* (R_g' E[z_k] + E[w_k] .* O_g' E[z_k]^2)
/// logit gamma = E ln theta - E ln(1 - theta)
///               - ln(lambda)/2 + lambda mu^2/2 + ln(E[alpha])/2
pub fn update_loadings(
    graph: &mut NodeGraph,
    data: &DataContainer,
    backend: &dyn MatrixBackend,
) -> Result<()> {
    let NodeGraph {
        factors,
        loadings,
        precision,
        loading_ard,
        sparsity,
        residuals,
        ..
    } = graph;

    let factors: &[GaussianMatrix] = factors;
    let precision: &[Vec<GammaMatrix>] = precision;
    let loading_ard = loading_ard.as_ref();
    let sparsity = sparsity.as_ref();

    loadings
        .par_iter_mut()
        .zip(residuals.par_iter_mut())
        .enumerate()
        .map(|(m, (w, r_m))| -> Result<()> {
            let dd = data.num_features(m);
            let taus: Vec<Mat> = precision[m]
                .iter()
                .map(|t| expected_tau_column(t, dd))
                .collect();

            for k in 0..w.ncols() {
                let alpha = loading_ard.map_or(1.0, |a| a.posterior_mean()[(m, k)]);

                let mut lambda = Mat::from_element(dd, 1, alpha);
                let mut num = Mat::zeros(dd, 1);
                let ew_old = column_of(w.posterior_mean(), k);

                for (g, z) in factors.iter().enumerate() {
                    let mask = data.block(m, g).mask();
                    let ez = column_of(z.posterior_mean(), k);
                    let ez2 = ez.zip_map(&column_of(z.posterior_var(), k), |e, v| e * e + v);
                    let ez_sq = ez.map(|e| e * e);

                    let o_ez2 = backend.matmul_tn(mask, &ez2)?;
                    let r_ez = backend.matmul_tn(&r_m[g], &ez)?;
                    let o_ez_sq = backend.matmul_tn(mask, &ez_sq)?;

                    lambda += taus[g].component_mul(&o_ez2);
                    num += taus[g].component_mul(&(r_ez + ew_old.component_mul(&o_ez_sq)));
                }

                let gamma = match sparsity {
                    Some(theta) => {
                        let prior_logit = theta.posterior_log_mean()[(m, k)]
                            - theta.posterior_log_complement_mean()[(m, k)]
                            + 0.5 * alpha.ln();
                        num.zip_map(&lambda, |b, l| {
                            sigmoid(prior_logit - 0.5 * l.ln() + 0.5 * b * b / l)
                        })
                    }
                    None => Mat::from_element(dd, 1, 1.0),
                };

                w.set_column(k, &num, &lambda, &gamma, 1.0 / alpha);

                let delta = column_of(w.posterior_mean(), k) - ew_old;
                for (g, z) in factors.iter().enumerate() {
                    let mask = data.block(m, g).mask();
                    let ez = column_of(z.posterior_mean(), k);
                    r_m[g] -= (&ez * delta.transpose()).component_mul(mask);
                }
            }
            Ok(())
        })
        .collect::<Result<Vec<()>>>()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn spike_slab_moments() {
        let mu = Mat::from_row_slice(2, 1, &[2.0, -1.0]);
        let mut w = LoadingNode::new(&mu, true);

        // gamma = 0.5, var = 1
        assert_abs_diff_eq!(w.posterior_mean()[(0, 0)], 1.0);
        assert_abs_diff_eq!(w.second_moment()[(0, 0)], 2.5);
        assert_abs_diff_eq!(w.slab_second_moment()[(1, 0)], 0.5 * 2.0 + 0.5);

        // slab N(1, 1/4) with inclusion 0.2, v0 = 2
        let num = Mat::from_element(2, 1, 4.0);
        let prec = Mat::from_element(2, 1, 4.0);
        let gamma = Mat::from_element(2, 1, 0.2);
        w.set_column(0, &num, &prec, &gamma, 2.0);
        assert_abs_diff_eq!(w.posterior_mean()[(1, 0)], 0.2);
        assert_abs_diff_eq!(w.second_moment()[(1, 0)], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(
            w.slab_second_moment()[(1, 0)],
            0.25 + 0.8 * 2.0,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(w.posterior_sd()[(1, 0)], (0.25_f64 - 0.04).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn dense_loadings_have_full_inclusion() {
        let w = LoadingNode::new(&Mat::from_element(3, 2, 0.5), false);
        assert_abs_diff_eq!(w.posterior_mean()[(2, 1)], 0.5);
        assert!(w.inclusion().iter().all(|&g| g == 1.0));
    }

    #[test]
    fn stable_sigmoid() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0) >= 0.0);
        assert_abs_diff_eq!(sigmoid(800.0), 1.0);
    }
}
