extern crate special;

use crate::traits::*;
use nalgebra::DMatrix;
use special::Gamma as SpecialGamma;

/// Gamma-distributed parameter matrix
///
/// x[i,j] ~ Gamma(a[i,j], b[i,j]) with shape `a` and rate `b`, under
/// the prior Gamma(a0, b0)
#[derive(Debug, Clone)]
pub struct GammaMatrix {
    num_rows: usize,
    num_columns: usize,
    //////////////////////
    // hyper parameters //
    //////////////////////
    a0: f64,
    b0: f64,
    ///////////////////////////
    // sufficient statistics //
    ///////////////////////////
    a_stat: DMatrix<f64>,
    b_stat: DMatrix<f64>,
    //////////////////////////
    // estimated parameters //
    //////////////////////////
    estimated_mean: DMatrix<f64>,
    estimated_sd: DMatrix<f64>,
    estimated_log_mean: DMatrix<f64>,
}

impl GammaMatrix {
    /// E[log x] = digamma(a) - log(b)
    pub fn posterior_log_mean(&self) -> &DMatrix<f64> {
        &self.estimated_log_mean
    }

    /// Sum of KL(q || p) over all the elements
    ///
    /// KL = (a - a0) digamma(a) - lgamma(a) + lgamma(a0)
    ///      + a0 (log b - log b0) + a (b0 - b) / b
    pub fn kl_divergence(&self) -> f64 {
        let (a0, b0) = (self.a0, self.b0);
        let lgamma_a0 = SpecialGamma::ln_gamma(a0).0;
        self.a_stat
            .iter()
            .zip(self.b_stat.iter())
            .map(|(&a, &b)| {
                (a - a0) * a.digamma() - SpecialGamma::ln_gamma(a).0
                    + lgamma_a0
                    + a0 * (b.ln() - b0.ln())
                    + a * (b0 - b) / b
            })
            .sum()
    }
}

impl TwoStatParam for GammaMatrix {
    type Mat = DMatrix<f64>;
    type Scalar = f64;

    fn new(dims: (usize, usize), a: Self::Scalar, b: Self::Scalar) -> Self {
        let mut ret = Self {
            num_rows: dims.0,
            num_columns: dims.1,
            a0: a,
            b0: b,
            a_stat: DMatrix::from_element(dims.0, dims.1, a),
            b_stat: DMatrix::from_element(dims.0, dims.1, b),
            estimated_mean: DMatrix::zeros(dims.0, dims.1),
            estimated_sd: DMatrix::zeros(dims.0, dims.1),
            estimated_log_mean: DMatrix::zeros(dims.0, dims.1),
        };
        ret.calibrate();
        ret
    }

    fn add_stat(&mut self, add_a: &Self::Mat, add_b: &Self::Mat) {
        self.a_stat += add_a;
        self.b_stat += add_b;
    }

    fn update_stat(&mut self, update_a: &Self::Mat, update_b: &Self::Mat) {
        self.reset_stat();
        self.add_stat(update_a, update_b);
    }

    fn update_stat_col(&mut self, update_a: &Self::Mat, update_b: &Self::Mat, k: usize) {
        self.a_stat
            .column_mut(k)
            .copy_from(&update_a.map(|x| x + self.a0));
        self.b_stat
            .column_mut(k)
            .copy_from(&update_b.map(|x| x + self.b0));
    }

    fn set_stat(&mut self, a: &Self::Mat, b: &Self::Mat) {
        self.a_stat.copy_from(a);
        self.b_stat.copy_from(b);
    }

    fn reset_stat(&mut self) {
        self.a_stat.fill(self.a0);
        self.b_stat.fill(self.b0);
    }

    fn calibrate(&mut self) {
        self.estimated_mean = self.a_stat.zip_map(&self.b_stat, |a, b| a / b);
        self.estimated_sd = self.a_stat.zip_map(&self.b_stat, |a, b| a.sqrt() / b);
        self.estimated_log_mean = self
            .a_stat
            .zip_map(&self.b_stat, |a, b| a.digamma() - b.ln());
    }

    fn keep_columns(&mut self, keep: &[usize]) {
        self.a_stat = self.a_stat.select_columns(keep);
        self.b_stat = self.b_stat.select_columns(keep);
        self.num_columns = keep.len();
        self.calibrate();
    }
}

impl Inference for GammaMatrix {
    type Mat = DMatrix<f64>;
    type Scalar = f64;

    fn posterior_mean(&self) -> &Self::Mat {
        &self.estimated_mean
    }

    fn posterior_sd(&self) -> &Self::Mat {
        &self.estimated_sd
    }

    fn is_finite(&self) -> bool {
        self.estimated_mean.iter().all(|x| x.is_finite())
            && self.estimated_log_mean.iter().all(|x| x.is_finite())
    }

    fn nrows(&self) -> usize {
        self.num_rows
    }

    fn ncols(&self) -> usize {
        self.num_columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gamma_moments() {
        let mut param = GammaMatrix::new((2, 3), 1.0, 1.0);
        param.update_stat(
            &DMatrix::from_element(2, 3, 9.0),
            &DMatrix::from_element(2, 3, 4.0),
        );
        param.calibrate();

        assert_abs_diff_eq!(param.posterior_mean()[(0, 0)], 2.0);
        assert_abs_diff_eq!(param.posterior_sd()[(1, 2)], 10_f64.sqrt() / 5.0);
        assert_abs_diff_eq!(
            param.posterior_log_mean()[(0, 1)],
            10_f64.digamma() - 5_f64.ln()
        );
    }

    #[test]
    fn gamma_kl_vanishes_at_prior() {
        let param = GammaMatrix::new((4, 2), 2.0, 3.0);
        assert_abs_diff_eq!(param.kl_divergence(), 0.0, epsilon = 1e-12);

        let mut moved = param.clone();
        moved.add_stat(
            &DMatrix::from_element(4, 2, 1.5),
            &DMatrix::from_element(4, 2, 0.5),
        );
        moved.calibrate();
        assert!(moved.kl_divergence() > 0.0);
    }

    #[test]
    fn gamma_keep_columns() {
        let mut param = GammaMatrix::new((1, 3), 1.0, 1.0);
        param.update_stat_col(
            &DMatrix::from_element(1, 1, 2.0),
            &DMatrix::from_element(1, 1, 0.0),
            2,
        );
        param.keep_columns(&[2, 0]);
        assert_eq!(param.ncols(), 2);
        assert_abs_diff_eq!(param.posterior_mean()[(0, 0)], 3.0);
        assert_abs_diff_eq!(param.posterior_mean()[(0, 1)], 1.0);
    }
}
