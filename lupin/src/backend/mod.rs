//! Dense matrix algebra behind a strategy interface, selected once
//! per run and shared by every node update.

mod candle;
mod cpu;

pub use self::candle::CandleBackend;
pub use self::cpu::CpuBackend;

use crate::error::{LupinError, Result};
use crate::options::TrainOptions;
use log::{info, warn};
use nalgebra::DMatrix;

pub type Mat = DMatrix<f64>;

pub trait MatrixBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `a * b`
    fn matmul(&self, a: &Mat, b: &Mat) -> Result<Mat>;

    /// `a' * b`
    fn matmul_tn(&self, a: &Mat, b: &Mat) -> Result<Mat>;

    /// `a * b'`
    fn matmul_nt(&self, a: &Mat, b: &Mat) -> Result<Mat>;

    /// element-wise product
    fn hadamard(&self, a: &Mat, b: &Mat) -> Result<Mat>;

    /// `a - b`
    fn sub(&self, a: &Mat, b: &Mat) -> Result<Mat>;

    /// element-wise square
    fn square(&self, a: &Mat) -> Result<Mat>;

    fn transpose(&self, a: &Mat) -> Result<Mat>;

    /// `1 x ncol` row of column sums
    fn column_sums(&self, a: &Mat) -> Result<Mat>;

    /// `nrow x 1` column of row sums
    fn row_sums(&self, a: &Mat) -> Result<Mat>;

    fn sum_all(&self, a: &Mat) -> Result<f64>;
}

/// Pick the backend requested by the training options
///
/// An accelerator that can't be opened is an error unless
/// `gpu_fallback` is set
pub fn select_backend(opts: &TrainOptions) -> Result<Box<dyn MatrixBackend>> {
    if !opts.gpu_mode {
        return Ok(Box::new(CpuBackend));
    }

    match CandleBackend::open(opts.gpu_device) {
        Ok(backend) => {
            info!("using {} backend", backend.name());
            Ok(Box::new(backend))
        }
        Err(LupinError::BackendUnavailable(msg)) if opts.gpu_fallback => {
            warn!("{}; falling back to the CPU", msg);
            Ok(Box::new(CpuBackend))
        }
        Err(e) => Err(e),
    }
}

fn check_same_shape(a: &Mat, b: &Mat, op: &str) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(LupinError::Backend(format!(
            "{}: {:?} vs {:?}",
            op,
            a.shape(),
            b.shape()
        )));
    }
    Ok(())
}

fn check_inner(a: (usize, usize), b: (usize, usize), op: &str) -> Result<()> {
    if a.1 != b.0 {
        return Err(LupinError::Backend(format!(
            "{}: {:?} x {:?}",
            op, a, b
        )));
    }
    Ok(())
}
