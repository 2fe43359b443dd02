use std::{
    fs,
    path::{Path, PathBuf},
};

use polars::{
    frame::DataFrame,
    prelude::{CsvWriterOptions, IntoLazy, LazyFrame, PlPath, SchemaRef, SinkOptions, SinkTarget},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{DataError, IoError, PipelineResult},
    report::polars_ext::{DataFrameExt, LazyFrameExt},
};

// ================================================================================================
// Traits
// ================================================================================================

pub trait ReportName {
    fn base_name(&self) -> String;

    fn filename(&self, ext: FileExtension) -> String {
        format!("{}.{}", self.base_name(), ext)
    }
}

pub trait ToSchema {
    /// Returns the canonical schema for this output type.
    fn to_schema() -> SchemaRef;
}

/// Materializes a data product as a polars frame in its canonical schema.
pub trait ToFrame {
    fn to_frame(&self) -> PipelineResult<DataFrame>;
}

pub trait AsFormattedLazyFrame {
    /// The frame as written to disk: timestamps rendered as ISO-8601 strings.
    fn as_formatted_lf(&self) -> PipelineResult<LazyFrame>;
}

pub trait ToJson {
    /// Serializes the product to a `Value::Array` of row objects.
    fn to_json(&self) -> PipelineResult<Value>;
}

pub trait ToCsv {
    /// Writes the product to `<dir>/<base_name>.csv` and returns the file path.
    ///
    /// # Side Effects
    /// - Creates the directory if missing.
    /// - Overwrites the file if it exists.
    fn to_csv(
        &self,
        dir: impl AsRef<Path>,
        opts: Option<&CsvWriterOptions>,
        sink_opts: Option<&SinkOptions>,
    ) -> PipelineResult<PathBuf>;

    /// Writes the JSON rows to `<dir>/<base_name>.json` and returns the file path.
    fn to_json_file(&self, dir: impl AsRef<Path>) -> PipelineResult<PathBuf>;
}

// ================================================================================================
// Blanket Implementations
// ================================================================================================

impl<T> AsFormattedLazyFrame for T
where
    T: ToFrame + ToSchema,
{
    fn as_formatted_lf(&self) -> PipelineResult<LazyFrame> {
        Ok(self.to_frame()?.lazy().with_iso_timestamps(T::to_schema()))
    }
}

impl<T> ToJson for T
where
    T: ToFrame + ToSchema,
{
    fn to_json(&self) -> PipelineResult<Value> {
        let rows = self
            .as_formatted_lf()?
            .collect()
            .map_err(|e| DataError::DataFrame(e.to_string()))?
            .to_json_rows()?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

impl<T> ToCsv for T
where
    T: ToFrame + ReportName + ToSchema,
{
    fn to_csv(
        &self,
        dir: impl AsRef<Path>,
        opts: Option<&CsvWriterOptions>,
        sink_opts: Option<&SinkOptions>,
    ) -> PipelineResult<PathBuf> {
        let file_path = prepare_target(dir.as_ref(), &self.filename(FileExtension::Csv))?;

        let uri = file_path.to_str().ok_or_else(|| {
            IoError::FileSystem(format!(
                "Path contains invalid UTF-8 characters: {}",
                file_path.display()
            ))
        })?;
        let target = SinkTarget::Path(PlPath::new(uri));
        let options = opts.cloned().unwrap_or_default();
        let sink_opts = sink_opts.cloned().unwrap_or_default();

        let sink_plan = self
            .as_formatted_lf()?
            .sink_csv(target, options, None, sink_opts)
            .map_err(|e| DataError::DataFrame(format!("Failed to build CSV sink plan: {e}")))?;

        let _ = sink_plan.collect().map_err(|e| {
            IoError::WriteFailed(format!("CSV to '{}': {e}", file_path.display()))
        })?;

        tracing::debug!(path = %file_path.display(), "CSV written");
        Ok(file_path)
    }

    fn to_json_file(&self, dir: impl AsRef<Path>) -> PipelineResult<PathBuf> {
        let file_path = prepare_target(dir.as_ref(), &self.filename(FileExtension::Json))?;
        let json = serde_json::to_string_pretty(&self.to_json()?)?;
        fs::write(&file_path, json).map_err(|e| {
            IoError::WriteFailed(format!("JSON to '{}': {e}", file_path.display()))
        })?;

        tracing::debug!(path = %file_path.display(), "JSON written");
        Ok(file_path)
    }
}

fn prepare_target(dir: &Path, filename: &str) -> PipelineResult<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            IoError::FileSystem(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(dir.join(filename))
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileExtension {
    #[default]
    Csv,
    Json,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use polars::prelude::{CsvReadOptions, SerReader};
    use std::io::Cursor;

    use crate::{
        data::series::{CanonicalSeries, PricePoint},
        model::ModelKind,
        report::{display::DisplaySeries, forecast::ForecastSeries},
    };

    use super::*;

    fn history() -> CanonicalSeries {
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        CanonicalSeries::try_from_points(vec![
            PricePoint::new(day(1), 10.0),
            PricePoint::new(day(2), 10.5),
            PricePoint::new(day(3), 11.25),
        ])
        .unwrap()
    }

    #[test]
    fn test_file_names() {
        let series = history();
        let fc = ForecastSeries::after(ModelKind::Prophet, &series, vec![1.0]).unwrap();

        assert_eq!(series.filename(FileExtension::Csv), "history.csv");
        assert_eq!(fc.filename(FileExtension::Json), "forecast_prophet.json");
        assert_eq!(
            DisplaySeries::assemble(&series, &fc, 2).filename(FileExtension::Csv),
            "display_prophet.csv"
        );
    }

    #[test]
    fn test_history_to_json_rows() {
        let have = history().to_json().unwrap();
        let want = serde_json::json!([
            { "timestamp": "2024-01-01T00:00:00.000Z", "close": 10.0 },
            { "timestamp": "2024-01-02T00:00:00.000Z", "close": 10.5 },
            { "timestamp": "2024-01-03T00:00:00.000Z", "close": 11.25 },
        ]);
        assert_eq!(have, want);
    }

    #[test]
    fn test_to_csv_creates_directory() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("target")
            .join("report_io_unit")
            .join("nested");
        let _ = fs::remove_dir_all(&dir);

        let path = history().to_csv(&dir, None, None).unwrap();
        assert_eq!(path, dir.join("history.csv"));

        let bytes = fs::read(&path).unwrap();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .unwrap();
        assert_eq!(df.height(), 3);
        let names: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["timestamp", "close"]);
    }
}
