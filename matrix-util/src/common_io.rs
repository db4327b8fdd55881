use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

fn is_gzipped(file: &str) -> bool {
    Path::new(file).extension().and_then(|x| x.to_str()) == Some("gz")
}

///
/// Open a file for reading; `.gz` files are decompressed on the fly
///
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;
    if is_gzipped(input_file) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

///
/// Open a file for writing; `.gz` files are compressed, and `stdout`
/// writes to the standard output
///
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", output_file, e))?;
    if is_gzipped(output_file) {
        let encoder = GzEncoder::new(file, flate2::Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

///
/// Read every line of a (gzipped) file into memory
///
pub fn read_lines(input_file: &str) -> anyhow::Result<Vec<Box<str>>> {
    open_buf_reader(input_file)?
        .lines()
        .map(|x| Ok(x?.into_boxed_str()))
        .collect()
}

///
/// Write one line per item; a closed pipe ends the output quietly
///
pub fn write_lines<T: std::fmt::Display>(lines: &[T], output_file: &str) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        match writeln!(buf, "{}", line) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    buf.flush()?;
    Ok(())
}

/// A delimited text table parsed into `T`
pub struct DelimTable<T> {
    pub header: Vec<Box<str>>,
    pub rows: Vec<Vec<T>>,
}

///
/// Read a delimited table, skipping blank lines and `#` comments
///
/// * `input_file` - file name, gzipped or not
/// * `delim` - column separator
/// * `has_header` - the first line names the columns
///
pub fn read_delim_table<T>(
    input_file: &str,
    delim: &str,
    has_header: bool,
) -> anyhow::Result<DelimTable<T>>
where
    T: Send + std::str::FromStr,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    let lines: Vec<Box<str>> = read_lines(input_file)?
        .into_iter()
        .filter(|x| !x.trim().is_empty() && !x.starts_with('#'))
        .collect();

    let (header, body) = match (has_header, lines.split_first()) {
        (true, Some((hdr, body))) => (
            hdr.split(delim).map(|x| x.trim().into()).collect(),
            body,
        ),
        (true, None) => return Err(anyhow::anyhow!("{}: no header line", input_file)),
        (false, _) => (vec![], &lines[..]),
    };

    // parsing is the slow part; the indexed collect keeps line order
    let rows = body
        .par_iter()
        .enumerate()
        .map(|(i, line)| -> anyhow::Result<Vec<T>> {
            line.split(delim)
                .map(|x| {
                    x.trim().parse::<T>().map_err(|e| {
                        anyhow::anyhow!("{}: line {}: {:?}: {}", input_file, i + 1, x, e)
                    })
                })
                .collect()
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(DelimTable { header, rows })
}

///
/// Create the parent directory of `file` if needed
///
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(std::fs::create_dir_all(dir)?),
        _ => Ok(()),
    }
}

///
/// A fresh file path with the given extension under a directory that
/// outlives the call
///
pub fn create_temp_dir_file(suffix: &str) -> anyhow::Result<std::path::PathBuf> {
    let dir = tempfile::tempdir()?.keep();
    Ok(dir.join(format!("tmp.{}", suffix)))
}
