use parquet::basic::{Compression, ConvertedType, Repetition, Type as PhysicalType, ZstdLevel};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::Type;
use std::sync::Arc;

/// A table of one string column (`row`) followed by named numeric
/// columns, written as a single zstd-compressed row group
pub struct WideTable<'a> {
    row_names: Vec<ByteArray>,
    column_names: Vec<Box<str>>,
    columns: Vec<&'a [f64]>,
}

impl<'a> WideTable<'a> {
    ///
    /// * `nrows` - number of rows, also when there are no columns
    /// * `columns` - values of each numeric column
    /// * `row_names` - defaults to `0..nrows`
    /// * `column_names` - defaults to `0..ncols`
    ///
    pub fn new(
        nrows: usize,
        columns: Vec<&'a [f64]>,
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<Self> {
        if columns.iter().any(|x| x.len() != nrows) {
            return Err(anyhow::anyhow!("columns of different lengths"));
        }

        let row_names: Vec<ByteArray> = match row_names {
            Some(names) if names.len() == nrows => {
                names.iter().map(|r| ByteArray::from(r.as_ref())).collect()
            }
            Some(names) => {
                return Err(anyhow::anyhow!(
                    "{} row names for {} rows",
                    names.len(),
                    nrows
                ))
            }
            None => (0..nrows)
                .map(|i| ByteArray::from(i.to_string().as_str()))
                .collect(),
        };

        let column_names: Vec<Box<str>> = match column_names {
            Some(names) if names.len() == columns.len() => names.to_vec(),
            Some(names) => {
                return Err(anyhow::anyhow!(
                    "{} column names for {} columns",
                    names.len(),
                    columns.len()
                ))
            }
            None => (0..columns.len()).map(|j| j.to_string().into()).collect(),
        };

        Ok(Self {
            row_names,
            column_names,
            columns,
        })
    }

    fn schema(&self) -> anyhow::Result<Arc<Type>> {
        let mut fields = vec![Arc::new(
            Type::primitive_type_builder("row", PhysicalType::BYTE_ARRAY)
                .with_repetition(Repetition::REQUIRED)
                .with_converted_type(ConvertedType::UTF8)
                .build()?,
        )];
        for name in self.column_names.iter() {
            fields.push(Arc::new(
                Type::primitive_type_builder(name, PhysicalType::DOUBLE)
                    .with_repetition(Repetition::REQUIRED)
                    .build()?,
            ));
        }
        Ok(Arc::new(
            Type::group_type_builder("matrix")
                .with_fields(fields)
                .build()?,
        ))
    }

    pub fn write(&self, file_path: &str) -> anyhow::Result<()> {
        let props = Arc::new(
            WriterProperties::builder()
                .set_compression(Compression::ZSTD(ZstdLevel::try_new(5)?))
                .build(),
        );
        let file = std::fs::File::create(file_path)?;
        let mut writer = SerializedFileWriter::new(file, self.schema()?, props)?;
        let mut row_group = writer.next_row_group()?;

        if let Some(mut col) = row_group.next_column()? {
            col.typed::<ByteArrayType>()
                .write_batch(&self.row_names, None, None)?;
            col.close()?;
        }

        for x in self.columns.iter() {
            if let Some(mut col) = row_group.next_column()? {
                col.typed::<DoubleType>().write_batch(x, None, None)?;
                col.close()?;
            }
        }

        row_group.close()?;
        writer.close()?;
        Ok(())
    }
}
