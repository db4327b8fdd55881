use crate::traits::SampleOps;
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;

impl SampleOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    /// Sample d,n matrix from U(0,1), filled column by column
    fn runif<R: Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        DMatrix::from_iterator(dd, nn, (0..(dd * nn)).map(|_| rng.random::<f64>()))
    }

    /// Sample d,n matrix from N(0,1), filled column by column
    fn rnorm<R: Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        DMatrix::from_iterator(
            dd,
            nn,
            (0..(dd * nn)).map(|_| rng.sample::<f64, _>(StandardNormal)),
        )
    }
}
