use crate::traits::ConvertMatOps;
use candle_core::{DType, Device, Tensor};
use nalgebra::DMatrix;

impl ConvertMatOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    /// Copy a 2D tensor (any float dtype, any device) back to the host
    fn from_tensor(tensor: &Tensor) -> anyhow::Result<Self::Mat> {
        let (nrows, ncols) = tensor.dims2()?;
        let data: Vec<f64> = tensor
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F64)?
            .flatten_all()?
            .to_vec1()?;
        Ok(DMatrix::from_row_slice(nrows, ncols, &data))
    }

    fn to_tensor(&self, dev: &Device) -> anyhow::Result<Tensor> {
        self.to_tensor_as(dev, DType::F64)
    }

    fn to_tensor_as(&self, dev: &Device, dtype: DType) -> anyhow::Result<Tensor> {
        // column-major storage of the transpose is the row-major
        // layout of `self`
        let row_major: Vec<f64> = self.transpose().as_slice().to_vec();
        let host = Tensor::from_vec(row_major, (self.nrows(), self.ncols()), &Device::Cpu)?;
        let host = if dtype == DType::F64 {
            host
        } else {
            host.to_dtype(dtype)?
        };
        Ok(host.to_device(dev)?)
    }
}
