use crate::traits::*;
use matrix_util::traits::IoOps;
use nalgebra::DMatrix;

/// consolidated output of posterior summaries
pub trait ParamIo: Inference<Mat = DMatrix<f64>> {
    /// Write `{header}.mean.tsv.gz` and `{header}.sd.tsv.gz`
    fn to_tsv(&self, header: &str) -> anyhow::Result<()> {
        self.posterior_mean()
            .to_tsv(&(header.to_string() + ".mean.tsv.gz"))?;
        self.posterior_sd()
            .to_tsv(&(header.to_string() + ".sd.tsv.gz"))?;
        Ok(())
    }

    /// Write `{header}.mean.parquet` and `{header}.sd.parquet`
    fn to_parquet(
        &self,
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
        header: &str,
    ) -> anyhow::Result<()> {
        self.posterior_mean().to_parquet(
            row_names,
            column_names,
            &(header.to_string() + ".mean.parquet"),
        )?;
        self.posterior_sd().to_parquet(
            row_names,
            column_names,
            &(header.to_string() + ".sd.parquet"),
        )?;
        Ok(())
    }
}

impl<T> ParamIo for T where T: Inference<Mat = DMatrix<f64>> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmatrix_gamma::GammaMatrix;
    use matrix_util::common_io::{create_temp_dir_file, read_lines};

    #[test]
    fn gamma_to_tsv() -> anyhow::Result<()> {
        let param = GammaMatrix::new((3, 2), 2.0, 4.0);
        let tmp = create_temp_dir_file("out")?;
        let header = tmp.to_str().unwrap();
        param.to_tsv(header)?;

        let lines = read_lines(&(header.to_string() + ".mean.tsv.gz"))?;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].split('\t').count(), 2);
        Ok(())
    }
}
