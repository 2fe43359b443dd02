use std::{
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

use polars::prelude::{
    CsvReadOptions, DataFrame, LazyCsvReader, LazyFileListReader, PlPath, SerReader,
};

use crate::error::{DataError, IoError, PipelineResult};

/// Location of the sample dataset shipped with the crate, relative to the manifest directory.
pub const BUNDLED_DATASET: &str = "data/stock_data.csv";

/// An uploaded table as-is: arbitrary column names, order and cell contents.
///
/// CSV input is read with every column as a string. Typing happens in the
/// preprocessor, so a malformed cell drops one row instead of failing the read.
#[derive(Debug, Clone)]
pub struct RawTable {
    df: DataFrame,
}

impl RawTable {
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }

    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_csv_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IoError::FileSystem(format!("File not found: {}", path.display())).into());
        }
        let uri = path.to_str().ok_or_else(|| {
            IoError::FileSystem(format!(
                "Path contains invalid UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let df = LazyCsvReader::new(PlPath::new(uri))
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| {
                IoError::ReadFailed(format!("Failed to read CSV '{}': {e}", path.display()))
            })?;

        tracing::debug!(rows = df.height(), cols = df.width(), "CSV loaded");
        Ok(Self { df })
    }

    /// Reads a CSV document from any stream, e.g. an uploaded file.
    pub fn from_csv_reader(mut reader: impl Read) -> PipelineResult<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map_err(IoError::Io)?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(buf))
            .finish()
            .map_err(|e| IoError::ReadFailed(format!("Failed to read CSV stream: {e}")))?;

        tracing::debug!(rows = df.height(), cols = df.width(), "CSV stream loaded");
        Ok(Self { df })
    }

    pub fn bundled_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(BUNDLED_DATASET)
    }

    /// Loads the sample dataset shipped with the crate.
    pub fn bundled() -> PipelineResult<Self> {
        Self::from_csv_path(Self::bundled_path())
    }

    /// Loads `path` when given, otherwise falls back to the bundled dataset.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        match path {
            Some(p) => Self::from_csv_path(p),
            None => {
                tracing::info!(
                    path = %Self::bundled_path().display(),
                    "No input given, using bundled dataset"
                );
                Self::bundled()
            }
        }
    }

    pub fn as_df(&self) -> &DataFrame {
        &self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    /// The last `n` rows, unmodified.
    pub fn tail(&self, n: usize) -> DataFrame {
        self.df.tail(Some(n))
    }
}

impl TryFrom<&str> for RawTable {
    type Error = crate::error::PipelineError;

    /// Parses an in-memory CSV document.
    fn try_from(csv: &str) -> PipelineResult<Self> {
        if csv.trim().is_empty() {
            return Err(DataError::Schema("Input is empty (no header row)".to_string()).into());
        }
        Self::from_csv_reader(csv.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::DataType;

    #[test]
    fn test_reader_keeps_every_column_as_string() {
        let raw = RawTable::try_from("Date,Close,Volume\n2024-01-02,10.5,100\n2024-01-03,n/a,200\n")
            .expect("csv should parse");

        assert_eq!(raw.height(), 2);
        assert_eq!(raw.column_names(), vec!["Date", "Close", "Volume"]);
        for c in raw.as_df().get_columns() {
            assert_eq!(c.dtype(), &DataType::String);
        }
    }

    #[test]
    fn test_empty_document_is_schema_error() {
        let err = RawTable::try_from("  \n").unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RawTable::from_csv_path("does/not/exist.csv").unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::Io(_)));
    }

    #[test]
    fn test_bundled_dataset_loads() {
        let raw = RawTable::load(None).expect("bundled dataset should load");
        assert!(raw.height() > 100);
        assert!(raw.column_names().iter().any(|c| c == "Close"));
    }
}
