use crate::data::LongRecord;
use matrix_util::common_io::read_delim_table;

/// group name used when the table has no `group` column
pub const DEFAULT_GROUP: &str = "group_0";

fn parse_value(x: &str) -> anyhow::Result<f64> {
    match x {
        "" | "NA" | "na" | "NaN" | "nan" => Ok(f64::NAN),
        _ => x
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("invalid value {:?}: {}", x, e)),
    }
}

///
/// Read a tab-separated long-form table (gzipped or not) with a header
/// line naming the columns `view`, `group` (optional), `sample`,
/// `feature` and `value`
///
/// * `input_file` - file name
///
pub fn read_long_table(input_file: &str) -> anyhow::Result<Vec<LongRecord>> {
    let out = read_delim_table::<String>(input_file, "\t", true)?;

    let column = |name: &str| -> Option<usize> {
        out.header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let missing = |name: &str| anyhow::anyhow!("{}: no `{}` column in the header", input_file, name);

    let view = column("view").ok_or_else(|| missing("view"))?;
    let sample = column("sample").ok_or_else(|| missing("sample"))?;
    let feature = column("feature").ok_or_else(|| missing("feature"))?;
    let value = column("value").ok_or_else(|| missing("value"))?;
    let group = column("group");

    let ncols = out.header.len();

    out.rows
        .iter()
        .enumerate()
        .map(|(i, words)| {
            if words.len() != ncols {
                return Err(anyhow::anyhow!(
                    "{}: record {} has {} columns, expected {}",
                    input_file,
                    i + 1,
                    words.len(),
                    ncols
                ));
            }
            Ok(LongRecord {
                view: words[view].as_str().into(),
                group: group
                    .map(|j| words[j].as_str())
                    .unwrap_or(DEFAULT_GROUP)
                    .into(),
                sample: words[sample].as_str().into(),
                feature: words[feature].as_str().into(),
                value: parse_value(&words[value])?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_util::common_io::{create_temp_dir_file, write_lines};

    #[test]
    fn read_without_group_column() -> anyhow::Result<()> {
        let file = create_temp_dir_file("tsv.gz")?;
        let file = file.to_str().unwrap();
        let lines: Vec<Box<str>> = vec![
            "sample\tfeature\tview\tvalue".into(),
            "s1\tf1\trna\t1.5".into(),
            "s2\tf1\trna\tNA".into(),
        ];
        write_lines(&lines, file)?;

        let records = read_long_table(file)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].group.as_ref(), DEFAULT_GROUP);
        assert_eq!(records[0].value, 1.5);
        assert!(records[1].value.is_nan());
        Ok(())
    }

    #[test]
    fn missing_column() -> anyhow::Result<()> {
        let file = create_temp_dir_file("tsv")?;
        let file = file.to_str().unwrap();
        let lines: Vec<Box<str>> = vec!["sample\tview\tvalue".into(), "s1\trna\t1".into()];
        write_lines(&lines, file)?;
        assert!(read_long_table(file).is_err());
        Ok(())
    }
}
