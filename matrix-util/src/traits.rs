use candle_core::{DType, Device, Tensor};
use rand::Rng;

/// some linear algebra routines
pub trait RandomizedAlgs {
    type Mat;
    type DVec;

    /// Randomized SVD with a caller-owned random stream so that the
    /// decomposition is reproducible under a fixed seed
    fn rsvd<R: Rng>(
        &self,
        max_rank: usize,
        rng: &mut R,
    ) -> anyhow::Result<(Self::Mat, Self::DVec, Self::Mat)>;
}

/// Reading off from `Tensor`
pub trait ConvertMatOps {
    type Mat;
    type Scalar;

    fn from_tensor(_: &Tensor) -> anyhow::Result<Self::Mat>;
    fn to_tensor(&self, dev: &Device) -> anyhow::Result<Tensor>;

    /// Build the tensor on the host, cast to `dtype`, and only then
    /// move it to `dev` (some devices lack double precision kernels)
    fn to_tensor_as(&self, dev: &Device, dtype: DType) -> anyhow::Result<Tensor>;
}

/// Operations to sample random matrices from a seeded stream
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif<R: Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm<R: Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(file: &str, delim: &str, has_header: bool) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", false)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }

    /// Write a wide table: one row-name column followed by one
    /// numeric column per matrix column
    fn to_parquet(
        &self,
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
        file_path: &str,
    ) -> anyhow::Result<()>;
}
