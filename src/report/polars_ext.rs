use polars::prelude::{DataFrame, DataType, JsonFormat, JsonWriter, LazyFrame, SchemaRef, SerWriter, col};
use serde_json::Value;

use crate::error::{DataError, IoError, PipelineResult};

/// Layout of timestamps in written files; parseable as RFC 3339 and exact at the
/// millisecond precision of the series.
pub const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub trait DataFrameExt {
    fn to_json_rows(&self) -> PipelineResult<Vec<serde_json::Map<String, Value>>>;
}

impl DataFrameExt for DataFrame {
    fn to_json_rows(&self) -> PipelineResult<Vec<serde_json::Map<String, Value>>> {
        let height = self.height();
        if height == 0 {
            return Ok(Vec::new());
        }

        // Heuristic: approx 2^6 bytes per cell
        let estimated_row_size = self.width() * (1 << 6);
        let mut buf = Vec::with_capacity(height * estimated_row_size);

        JsonWriter::new(&mut buf)
            .with_json_format(JsonFormat::Json)
            .finish(&mut self.clone())
            .map_err(|e| DataError::DataFrame(e.to_string()))?;

        let json_val: Value = serde_json::from_slice(&buf).map_err(IoError::Json)?;

        match json_val {
            Value::Array(rows) => Ok(rows
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect()),
            _ => {
                Err(DataError::DataFrame("Polars JSON output was not an array".to_string()).into())
            }
        }
    }
}

pub trait LazyFrameExt {
    /// Renders every `Datetime` column of `schema` with [`ISO_TIMESTAMP_FORMAT`].
    fn with_iso_timestamps(self, schema: SchemaRef) -> Self;
}

impl LazyFrameExt for LazyFrame {
    fn with_iso_timestamps(self, schema: SchemaRef) -> Self {
        let exprs = schema
            .iter()
            .filter(|(_, dtype)| matches!(dtype, DataType::Datetime(_, _)))
            .map(|(name, _)| {
                col(name.as_str())
                    .dt()
                    .to_string(ISO_TIMESTAMP_FORMAT)
                    .alias(name.as_str())
            })
            .collect::<Vec<_>>();

        if exprs.is_empty() {
            return self;
        }

        self.with_columns(exprs)
    }
}
