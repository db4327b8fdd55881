use crate::traits::{RandomizedAlgs, SampleOps};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

type Mat = DMatrix<f64>;
type Vec = DVector<f64>;

const DEFAULT_POWER_ITER: usize = 5;
const DEFAULT_OVERSAMPLE: usize = 5;

impl RandomizedAlgs for Mat {
    type Mat = Mat;
    type DVec = Vec;

    fn rsvd<R: Rng>(&self, max_rank: usize, rng: &mut R) -> anyhow::Result<(Mat, Vec, Mat)> {
        let mut rsvd = RandomizedSVD::new(max_rank, DEFAULT_POWER_ITER);
        rsvd.compute(self, rng)?;
        Ok((
            rsvd.matrix_u().clone(),
            rsvd.singular_values().clone(),
            rsvd.matrix_v().clone(),
        ))
    }
}

/// Randomized SVD
///
/// Implement Alg 4.4 of Halko et al. (2009), randomized subspace
/// iteration with a QR step after every multiplication.
///
pub struct RandomizedSVD {
    max_rank: usize,
    iter: usize,
    u_vectors: Mat,
    singular_values: Vec,
    v_vectors: Mat,
}

impl RandomizedSVD {
    pub fn new(max_rank: usize, iter: usize) -> Self {
        Self {
            max_rank,
            iter,
            u_vectors: Mat::zeros(0, 0),
            singular_values: Vec::zeros(0),
            v_vectors: Mat::zeros(0, 0),
        }
    }

    pub fn matrix_u(&self) -> &Mat {
        &self.u_vectors
    }

    pub fn matrix_v(&self) -> &Mat {
        &self.v_vectors
    }

    pub fn singular_values(&self) -> &Vec {
        &self.singular_values
    }

    pub fn compute<R: Rng>(&mut self, xx: &Mat, rng: &mut R) -> anyhow::Result<()> {
        let nr = xx.nrows();
        let nc = xx.ncols();
        let full_rank = nr.min(nc);

        if full_rank == 0 {
            anyhow::bail!("empty matrix [{} x {}]", nr, nc);
        }

        let mut rank = full_rank;
        let mut oversample = 0;

        if self.max_rank > 0 && rank > self.max_rank {
            rank = self.max_rank;
            oversample = DEFAULT_OVERSAMPLE.min(full_rank - rank);
        }

        let qq = self.rand_subspace_iteration(xx, rank + oversample, rng);

        let bb = qq.transpose() * xx;

        let svd = bb.svd(true, true);

        let (Some(svd_u), Some(svd_vt)) = (svd.u, svd.v_t) else {
            anyhow::bail!("SVD failed");
        };

        // descending order of singular values
        let mut order: std::vec::Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let rank = rank.min(order.len());
        let top = &order[..rank];

        self.u_vectors = qq * svd_u.select_columns(top.iter());
        self.v_vectors = svd_vt.transpose().select_columns(top.iter());
        self.singular_values = Vec::from_iterator(rank, top.iter().map(|&k| svd.singular_values[k]));
        Ok(())
    }

    // Find an orthonormal matrix qq whose range approximates the range of xx
    fn rand_subspace_iteration<R: Rng>(
        &self,
        xx: &Mat,
        rank_and_oversample: usize,
        rng: &mut R,
    ) -> Mat {
        let nc = xx.ncols();

        let omega = Mat::rnorm(nc, rank_and_oversample, rng);
        let mut qq = (xx * omega).qr().q();

        for _ in 0..self.iter {
            let zz = (xx.transpose() * &qq).qr().q();
            qq = (xx * zz).qr().q();
        }

        qq
    }
}
