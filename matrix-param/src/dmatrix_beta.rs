use crate::traits::*;
use nalgebra::DMatrix;
use special::Gamma as SpecialGamma;

/// Beta-distributed parameter matrix, x ~ Beta(a, b) under the prior
/// Beta(a0, b0)
#[derive(Debug, Clone)]
pub struct BetaMatrix {
    num_rows: usize,
    num_columns: usize,
    a0: f64,
    b0: f64,
    a_stat: DMatrix<f64>,
    b_stat: DMatrix<f64>,
    estimated_mean: DMatrix<f64>,
    estimated_sd: DMatrix<f64>,
    estimated_log_mean: DMatrix<f64>,
    estimated_log_complement_mean: DMatrix<f64>,
}

fn ln_beta(a: f64, b: f64) -> f64 {
    SpecialGamma::ln_gamma(a).0 + SpecialGamma::ln_gamma(b).0 - SpecialGamma::ln_gamma(a + b).0
}

impl BetaMatrix {
    /// E[log x] = digamma(a) - digamma(a + b)
    pub fn posterior_log_mean(&self) -> &DMatrix<f64> {
        &self.estimated_log_mean
    }

    /// E[log(1 - x)] = digamma(b) - digamma(a + b)
    pub fn posterior_log_complement_mean(&self) -> &DMatrix<f64> {
        &self.estimated_log_complement_mean
    }

    /// Sum of KL(q || p) over all the elements
    pub fn kl_divergence(&self) -> f64 {
        let (a0, b0) = (self.a0, self.b0);
        let ln_beta0 = ln_beta(a0, b0);
        self.a_stat
            .iter()
            .zip(self.b_stat.iter())
            .map(|(&a, &b)| {
                let psi_ab = (a + b).digamma();
                ln_beta0 - ln_beta(a, b)
                    + (a - a0) * a.digamma()
                    + (b - b0) * b.digamma()
                    + (a0 - a + b0 - b) * psi_ab
            })
            .sum()
    }
}

impl TwoStatParam for BetaMatrix {
    type Mat = DMatrix<f64>;
    type Scalar = f64;

    fn new(dims: (usize, usize), a0: Self::Scalar, b0: Self::Scalar) -> Self {
        let mut ret = Self {
            num_rows: dims.0,
            num_columns: dims.1,
            a0,
            b0,
            a_stat: DMatrix::from_element(dims.0, dims.1, a0),
            b_stat: DMatrix::from_element(dims.0, dims.1, b0),
            estimated_mean: DMatrix::zeros(dims.0, dims.1),
            estimated_sd: DMatrix::zeros(dims.0, dims.1),
            estimated_log_mean: DMatrix::zeros(dims.0, dims.1),
            estimated_log_complement_mean: DMatrix::zeros(dims.0, dims.1),
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
        self.estimated_mean = self.a_stat.zip_map(&self.b_stat, |a, b| a / (a + b));
        self.estimated_sd = self.a_stat.zip_map(&self.b_stat, |a, b| {
            let s = a + b;
            (a * b / (s * s * (s + 1.0))).sqrt()
        });
        self.estimated_log_mean = self
            .a_stat
            .zip_map(&self.b_stat, |a, b| a.digamma() - (a + b).digamma());
        self.estimated_log_complement_mean = self
            .a_stat
            .zip_map(&self.b_stat, |a, b| b.digamma() - (a + b).digamma());
    }

    fn keep_columns(&mut self, keep: &[usize]) {
        self.a_stat = self.a_stat.select_columns(keep);
        self.b_stat = self.b_stat.select_columns(keep);
        self.num_columns = keep.len();
        self.calibrate();
    }
}

impl Inference for BetaMatrix {
    type Mat = DMatrix<f64>;
    type Scalar = f64;

    fn posterior_mean(&self) -> &Self::Mat {
        &self.estimated_mean
    }

    fn posterior_sd(&self) -> &Self::Mat {
        &self.estimated_sd
    }

    fn is_finite(&self) -> bool {
        self.estimated_log_mean.iter().all(|x| x.is_finite())
            && self.estimated_log_complement_mean.iter().all(|x| x.is_finite())
    }

    fn nrows(&self) -> usize {
        self.num_rows
    }

    fn ncols(&self) -> usize {
        self.num_columns
    }
}
