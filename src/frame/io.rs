use std::fmt;
use std::fs::{self, File};
use std::path::Path;

use polars::prelude::*;

use crate::error::{Result, StemmaError};

/// File formats the engine can read for registered datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Tsv,
    Json,
    Parquet,
}

impl DataFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::Parquet => "parquet",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "json" => Some(Self::Json),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }

    /// Detect the format of a dataset location from its file extension.
    pub fn detect(location: &str) -> Result<Self> {
        let ext = Path::new(location)
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase);

        match ext {
            None => Err(StemmaError::FormatDetectionFailed(location.to_owned())),
            Some(ext) => {
                Self::from_extension(&ext).ok_or(StemmaError::UnsupportedFormat(ext))
            }
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn read_table(path: &Path, format: DataFormat) -> Result<DataFrame> {
    if !path.exists() {
        return Err(StemmaError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("dataset file not found: {}", path.display()),
        )));
    }

    let df = match format {
        DataFormat::Csv => read_delimited(path, b',')?,
        DataFormat::Tsv => read_delimited(path, b'\t')?,
        DataFormat::Parquet => ParquetReader::new(File::open(path)?).finish()?,
        DataFormat::Json => JsonReader::new(File::open(path)?).finish()?,
    };

    Ok(df)
}

fn read_delimited(path: &Path, separator: u8) -> Result<DataFrame> {
    Ok(LazyCsvReader::new(path)
        .with_infer_schema_length(Some(10000))
        .with_has_header(true)
        .with_separator(separator)
        .with_try_parse_dates(true)
        .finish()?
        .collect()?)
}

pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut df = df.clone();
    CsvWriter::new(file).include_header(true).finish(&mut df)?;

    Ok(())
}
