use polars::{
    df,
    frame::DataFrame,
    prelude::{IntoLazy, SchemaRef, col},
};

use crate::{
    data::{
        schema::{SeriesCol, history_schema},
        series::CanonicalSeries,
    },
    error::{DataError, PipelineResult},
    report::io::{ReportName, ToFrame, ToSchema},
};

impl ReportName for CanonicalSeries {
    fn base_name(&self) -> String {
        "history".to_string()
    }
}

impl ToSchema for CanonicalSeries {
    fn to_schema() -> SchemaRef {
        history_schema()
    }
}

impl ToFrame for CanonicalSeries {
    fn to_frame(&self) -> PipelineResult<DataFrame> {
        let millis: Vec<i64> = self
            .points()
            .iter()
            .map(|p| p.timestamp.timestamp_millis())
            .collect();

        let df = df![
            SeriesCol::Timestamp.as_str() => millis,
            SeriesCol::Close.as_str() => self.closes()
        ]
        .and_then(|df| {
            df.lazy()
                .with_column(
                    col(SeriesCol::Timestamp.as_str()).cast(SeriesCol::Timestamp.dtype()),
                )
                .collect()
        })
        .map_err(|e| DataError::DataFrame(format!("Failed to build history frame: {e}")))?;
        Ok(df)
    }
}
