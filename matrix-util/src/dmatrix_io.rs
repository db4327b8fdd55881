use crate::common_io::{read_delim_table, write_lines};
use crate::parquet::WideTable;
use crate::traits::*;
use nalgebra::DMatrix;

impl IoOps for DMatrix<f64> {
    type Scalar = f64;
    type Mat = Self;

    fn read_file_delim(file: &str, delim: &str, has_header: bool) -> anyhow::Result<Self> {
        let rows = read_delim_table::<f64>(file, delim, has_header)?.rows;

        let nrows = rows.len();
        let ncols = rows.first().map(|x| x.len()).unwrap_or(0);
        if nrows == 0 {
            return Err(anyhow::anyhow!("no data in {}", file));
        }
        if rows.iter().any(|x| x.len() != ncols) {
            return Err(anyhow::anyhow!("ragged rows in {}", file));
        }

        Ok(DMatrix::from_row_iterator(
            nrows,
            ncols,
            rows.into_iter().flatten(),
        ))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        let lines: Vec<String> = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| x.to_string())
                    .collect::<Vec<_>>()
                    .join(delim)
            })
            .collect();
        write_lines(&lines, file)
    }

    fn to_parquet(
        &self,
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
        file_path: &str,
    ) -> anyhow::Result<()> {
        // column-major storage: each column is a contiguous slice
        let nrows = self.nrows();
        let data = self.as_slice();
        let columns: Vec<&[f64]> = (0..self.ncols())
            .map(|j| &data[j * nrows..(j + 1) * nrows])
            .collect();
        WideTable::new(nrows, columns, row_names, column_names)?.write(file_path)
    }
}
