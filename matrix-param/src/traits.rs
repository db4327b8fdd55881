pub trait Inference {
    type Mat;
    type Scalar;

    fn posterior_mean(&self) -> &Self::Mat;
    fn posterior_sd(&self) -> &Self::Mat;

    /// every estimated parameter is finite
    fn is_finite(&self) -> bool;

    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
}

/// A parameter matrix with two types of statistics
/// with hyper parameters a0 and b0
pub trait TwoStatParam {
    type Mat;
    type Scalar;

    fn new(dims: (usize, usize), a0: Self::Scalar, b0: Self::Scalar) -> Self;

    /// `stat += add`
    fn add_stat(&mut self, add_a: &Self::Mat, add_b: &Self::Mat);

    /// `stat = hyper + update`
    fn update_stat(&mut self, update_a: &Self::Mat, update_b: &Self::Mat);

    /// `stat[:,k] = hyper + update`
    fn update_stat_col(&mut self, update_a: &Self::Mat, update_b: &Self::Mat, k: usize);

    /// `stat = value`, ignoring the hyper parameters
    fn set_stat(&mut self, a: &Self::Mat, b: &Self::Mat);

    /// `stat = hyper`
    fn reset_stat(&mut self);

    /// recompute the estimated parameters from the statistics
    fn calibrate(&mut self);

    /// keep the selected columns (in the given order) and drop the rest
    fn keep_columns(&mut self, keep: &[usize]);
}
