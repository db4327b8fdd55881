use crate::traits::*;
use nalgebra::DMatrix;

/// Gaussian parameter matrix in natural parameters
///
/// x[i,j] ~ N(a[i,j] / b[i,j], 1 / b[i,j]) where `a` accumulates
/// precision-weighted means and `b` precisions on top of the prior
/// `a0` (precision times prior mean) and `b0` (prior precision)
#[derive(Debug, Clone)]
pub struct GaussianMatrix {
    num_rows: usize,
    num_columns: usize,
    a0: f64,
    b0: f64,
    a_stat: DMatrix<f64>,
    b_stat: DMatrix<f64>,
    estimated_mean: DMatrix<f64>,
    estimated_var: DMatrix<f64>,
    estimated_sd: DMatrix<f64>,
}

impl GaussianMatrix {
    /// Overwrite the posterior moments directly, e.g., from an
    /// initial guess; variances must be positive
    pub fn set_moments(&mut self, mean: &DMatrix<f64>, var: &DMatrix<f64>) {
        self.b_stat = var.map(|v| 1.0 / v);
        self.a_stat = mean.component_div(var);
        self.calibrate();
    }

    /// Recompute the moments of column `k` only
    pub fn calibrate_col(&mut self, k: usize) {
        for i in 0..self.num_rows {
            let (a, b) = (self.a_stat[(i, k)], self.b_stat[(i, k)]);
            self.estimated_mean[(i, k)] = a / b;
            self.estimated_var[(i, k)] = 1.0 / b;
            self.estimated_sd[(i, k)] = (1.0 / b).sqrt();
        }
    }

    pub fn posterior_var(&self) -> &DMatrix<f64> {
        &self.estimated_var
    }

    /// E[x^2] = mean^2 + var
    pub fn posterior_second_moment(&self) -> DMatrix<f64> {
        self.estimated_mean
            .zip_map(&self.estimated_var, |m, v| m * m + v)
    }

    /// Sum of the differential entropies, 0.5 * ln(2 pi e var)
    pub fn entropy(&self) -> f64 {
        let ln_2pi_e = (2.0 * std::f64::consts::PI).ln() + 1.0;
        self.estimated_var
            .iter()
            .map(|v| 0.5 * (ln_2pi_e + v.ln()))
            .sum()
    }
}

impl TwoStatParam for GaussianMatrix {
    type Mat = DMatrix<f64>;
    type Scalar = f64;

    fn new(dims: (usize, usize), a0: Self::Scalar, b0: Self::Scalar) -> Self {
        // an improper prior (b0 = 0) still starts from unit variance
        let b_init = if b0 > 0.0 { b0 } else { 1.0 };
        let mut ret = Self {
            num_rows: dims.0,
            num_columns: dims.1,
            a0,
            b0,
            a_stat: DMatrix::from_element(dims.0, dims.1, a0),
            b_stat: DMatrix::from_element(dims.0, dims.1, b_init),
            estimated_mean: DMatrix::zeros(dims.0, dims.1),
            estimated_var: DMatrix::zeros(dims.0, dims.1),
            estimated_sd: DMatrix::zeros(dims.0, dims.1),
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
        self.estimated_var = self.b_stat.map(|b| 1.0 / b);
        self.estimated_sd = self.estimated_var.map(|v| v.sqrt());
    }

    fn keep_columns(&mut self, keep: &[usize]) {
        self.a_stat = self.a_stat.select_columns(keep);
        self.b_stat = self.b_stat.select_columns(keep);
        self.num_columns = keep.len();
        self.calibrate();
    }
}

impl Inference for GaussianMatrix {
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
            && self.estimated_var.iter().all(|x| x.is_finite() && *x > 0.0)
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
    fn gaussian_natural_parameters() {
        let mut param = GaussianMatrix::new((3, 2), 0.0, 1.0);
        assert_abs_diff_eq!(param.posterior_var()[(0, 0)], 1.0);

        // precision 1 + 3 = 4, precision-weighted mean 0 + 2
        param.update_stat_col(
            &DMatrix::from_element(3, 1, 2.0),
            &DMatrix::from_element(3, 1, 3.0),
            1,
        );
        param.calibrate_col(1);
        assert_abs_diff_eq!(param.posterior_mean()[(2, 1)], 0.5);
        assert_abs_diff_eq!(param.posterior_var()[(2, 1)], 0.25);
        assert_abs_diff_eq!(param.posterior_sd()[(2, 1)], 0.5);
        assert_abs_diff_eq!(param.posterior_second_moment()[(2, 1)], 0.5);
        assert_abs_diff_eq!(param.posterior_mean()[(0, 0)], 0.0);
    }

    #[test]
    fn gaussian_set_moments_and_entropy() {
        let mut param = GaussianMatrix::new((2, 2), 0.0, 0.0);
        let mean = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, 2.0, 0.0]);
        let var = DMatrix::from_element(2, 2, 2.0);
        param.set_moments(&mean, &var);

        assert_abs_diff_eq!(param.posterior_mean(), &mean, epsilon = 1e-12);
        let expected = 4.0 * 0.5 * ((2.0 * std::f64::consts::PI * 2.0).ln() + 1.0);
        assert_abs_diff_eq!(param.entropy(), expected, epsilon = 1e-12);
        assert!(param.is_finite());
    }
}
