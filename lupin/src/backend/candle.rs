use super::*;
use crate::options::GpuDevice;
use candle_core::{DType, Device, Tensor};
use matrix_util::traits::ConvertMatOps;

/// candle tensors on an accelerator
///
/// Every call uploads its operands and blocks until the result is
/// copied back. Metal kernels lack double precision, so the Metal
/// device computes in `F32`; results then agree with the `f64` CPU
/// backend to about `1e-3` relative rather than `1e-4`.
pub struct CandleBackend {
    device: Device,
    dtype: DType,
    name: String,
}

impl CandleBackend {
    pub fn new(device: Device) -> Self {
        let dtype = if device.is_metal() {
            DType::F32
        } else {
            DType::F64
        };
        Self::with_dtype(device, dtype)
    }

    /// Compute on `device` in `dtype` (`F32` or `F64`)
    pub fn with_dtype(device: Device, dtype: DType) -> Self {
        let kind = if device.is_metal() {
            "metal"
        } else if device.is_cuda() {
            "cuda"
        } else {
            "candle-cpu"
        };
        let name = match (device.is_metal(), dtype) {
            (false, DType::F32) => format!("{}-f32", kind),
            _ => kind.to_string(),
        };
        Self {
            device,
            dtype,
            name,
        }
    }

    /// Open the first device of the requested kind
    pub fn open(gpu: GpuDevice) -> Result<Self> {
        let device = match gpu {
            GpuDevice::Cuda => Device::new_cuda(0),
            GpuDevice::Metal => Device::new_metal(0),
        }
        .map_err(|e| LupinError::BackendUnavailable(format!("{:?}: {}", gpu, e)))?;
        Ok(Self::new(device))
    }

    fn upload(&self, a: &Mat) -> Result<Tensor> {
        Ok(a.to_tensor_as(&self.device, self.dtype)?)
    }

    fn download(&self, t: &Tensor) -> Result<Mat> {
        Ok(Mat::from_tensor(t)?)
    }
}

fn is_empty(a: &Mat) -> bool {
    a.nrows() == 0 || a.ncols() == 0
}

impl MatrixBackend for CandleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn matmul(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_inner(a.shape(), b.shape(), "matmul")?;
        if is_empty(a) || is_empty(b) {
            return CpuBackend.matmul(a, b);
        }
        let c = self.upload(a)?.matmul(&self.upload(b)?)?;
        self.download(&c)
    }

    fn matmul_tn(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_inner((a.ncols(), a.nrows()), b.shape(), "matmul_tn")?;
        if is_empty(a) || is_empty(b) {
            return CpuBackend.matmul_tn(a, b);
        }
        let at = self.upload(a)?.t()?.contiguous()?;
        let c = at.matmul(&self.upload(b)?)?;
        self.download(&c)
    }

    fn matmul_nt(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_inner(a.shape(), (b.ncols(), b.nrows()), "matmul_nt")?;
        if is_empty(a) || is_empty(b) {
            return CpuBackend.matmul_nt(a, b);
        }
        let bt = self.upload(b)?.t()?.contiguous()?;
        let c = self.upload(a)?.matmul(&bt)?;
        self.download(&c)
    }

    fn hadamard(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_same_shape(a, b, "hadamard")?;
        if is_empty(a) {
            return CpuBackend.hadamard(a, b);
        }
        let c = self.upload(a)?.mul(&self.upload(b)?)?;
        self.download(&c)
    }

    fn sub(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_same_shape(a, b, "sub")?;
        if is_empty(a) {
            return CpuBackend.sub(a, b);
        }
        let c = self.upload(a)?.sub(&self.upload(b)?)?;
        self.download(&c)
    }

    fn square(&self, a: &Mat) -> Result<Mat> {
        if is_empty(a) {
            return CpuBackend.square(a);
        }
        let c = self.upload(a)?.sqr()?;
        self.download(&c)
    }

    fn transpose(&self, a: &Mat) -> Result<Mat> {
        if is_empty(a) {
            return CpuBackend.transpose(a);
        }
        let c = self.upload(a)?.t()?.contiguous()?;
        self.download(&c)
    }

    fn column_sums(&self, a: &Mat) -> Result<Mat> {
        if is_empty(a) {
            return CpuBackend.column_sums(a);
        }
        let c = self.upload(a)?.sum_keepdim(0)?;
        self.download(&c)
    }

    fn row_sums(&self, a: &Mat) -> Result<Mat> {
        if is_empty(a) {
            return CpuBackend.row_sums(a);
        }
        let c = self.upload(a)?.sum_keepdim(1)?;
        self.download(&c)
    }

    fn sum_all(&self, a: &Mat) -> Result<f64> {
        if is_empty(a) {
            return Ok(0.0);
        }
        let s = self
            .upload(a)?
            .sum_all()?
            .to_dtype(DType::F64)?
            .to_scalar::<f64>()?;
        Ok(s)
    }
}
