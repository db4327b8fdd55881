use matrix_util::common_io::{create_temp_dir_file, read_delim_table, read_lines, write_lines};
use matrix_util::traits::{IoOps, SampleOps};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn dmatrix_io_test() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let xx = DMatrix::<f64>::runif(50, 20, &mut rng);

    let tsv_file = create_temp_dir_file("txt.gz")?;
    let tsv_file = tsv_file.to_str().unwrap();
    xx.to_tsv(tsv_file)?;

    let yy = DMatrix::<f64>::from_tsv(tsv_file)?;

    approx::assert_abs_diff_eq!(xx, yy, epsilon = 1e-12);

    Ok(())
}

#[test]
fn dmatrix_parquet_test() -> anyhow::Result<()> {
    let xx = DMatrix::<f64>::rnorm(10, 3, &mut StdRng::seed_from_u64(5));

    let file = create_temp_dir_file("parquet")?;
    let file = file.to_str().unwrap();

    let cols: Vec<Box<str>> = vec!["a".into(), "b".into(), "c".into()];
    xx.to_parquet(None, Some(&cols), file)?;

    assert!(std::fs::metadata(file)?.len() > 0);

    let bad: Vec<Box<str>> = vec!["a".into()];
    assert!(xx.to_parquet(None, Some(&bad), file).is_err());

    // rows without numeric columns
    let rows: Vec<Box<str>> = (0..4).map(|i| i.to_string().into()).collect();
    DMatrix::<f64>::zeros(4, 0).to_parquet(Some(&rows), None, file)?;
    Ok(())
}

#[test]
fn delim_table_with_header() -> anyhow::Result<()> {
    let file = create_temp_dir_file("tsv")?;
    let file = file.to_str().unwrap();
    let lines = ["# comment", "x\ty", "1\t2", "", "3\t4"];
    write_lines(&lines, file)?;

    let table = read_delim_table::<f64>(file, "\t", true)?;
    assert_eq!(table.header, vec![Box::<str>::from("x"), "y".into()]);
    assert_eq!(table.rows, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

    write_lines(&["1\tNOPE"], file)?;
    assert!(read_delim_table::<f64>(file, "\t", false).is_err());

    DMatrix::from_row_slice(1, 2, &[1.5, 2.5]).to_tsv(file)?;
    assert_eq!(read_lines(file)?, vec![Box::<str>::from("1.5\t2.5")]);
    Ok(())
}
