use super::*;

/// nalgebra on the host
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl MatrixBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn matmul(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_inner(a.shape(), b.shape(), "matmul")?;
        Ok(a * b)
    }

    fn matmul_tn(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_inner((a.ncols(), a.nrows()), b.shape(), "matmul_tn")?;
        Ok(a.tr_mul(b))
    }

    fn matmul_nt(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_inner(a.shape(), (b.ncols(), b.nrows()), "matmul_nt")?;
        Ok(a * b.transpose())
    }

    fn hadamard(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_same_shape(a, b, "hadamard")?;
        Ok(a.component_mul(b))
    }

    fn sub(&self, a: &Mat, b: &Mat) -> Result<Mat> {
        check_same_shape(a, b, "sub")?;
        Ok(a - b)
    }

    fn square(&self, a: &Mat) -> Result<Mat> {
        Ok(a.map(|x| x * x))
    }

    fn transpose(&self, a: &Mat) -> Result<Mat> {
        Ok(a.transpose())
    }

    fn column_sums(&self, a: &Mat) -> Result<Mat> {
        Ok(Mat::from_fn(1, a.ncols(), |_, j| a.column(j).sum()))
    }

    fn row_sums(&self, a: &Mat) -> Result<Mat> {
        Ok(Mat::from_fn(a.nrows(), 1, |i, _| a.row(i).sum()))
    }

    fn sum_all(&self, a: &Mat) -> Result<f64> {
        Ok(a.sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn products_and_reductions() -> Result<()> {
        let cpu = CpuBackend;
        let a = Mat::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Mat::from_row_slice(2, 1, &[1.0, -1.0]);

        assert_eq!(
            cpu.matmul_tn(&a, &b)?,
            Mat::from_row_slice(3, 1, &[-3.0, -3.0, -3.0])
        );
        assert_eq!(cpu.matmul_nt(&b, &b)?, Mat::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]));
        assert_eq!(cpu.column_sums(&a)?, Mat::from_row_slice(1, 3, &[5.0, 7.0, 9.0]));
        assert_eq!(cpu.row_sums(&a)?, Mat::from_row_slice(2, 1, &[6.0, 15.0]));
        assert_abs_diff_eq!(cpu.sum_all(&cpu.square(&a)?)?, 91.0);

        assert!(matches!(cpu.matmul(&a, &a), Err(LupinError::Backend(_))));
        Ok(())
    }

    #[test]
    fn empty_factor_dimension() -> Result<()> {
        let cpu = CpuBackend;
        let z = Mat::zeros(4, 0);
        let w = Mat::zeros(3, 0);
        let zw = cpu.matmul_nt(&z, &w)?;
        assert_eq!(zw.shape(), (4, 3));
        assert_abs_diff_eq!(cpu.sum_all(&zw)?, 0.0);
        Ok(())
    }
}
