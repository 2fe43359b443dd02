use chrono::{DateTime, Utc};
use polars::{
    df,
    frame::DataFrame,
    prelude::{IntoLazy, SchemaRef, col},
};

use crate::{
    data::{
        schema::{SeriesCol, forecast_schema},
        series::CanonicalSeries,
    },
    error::{DataError, ModelError, PipelineResult},
    model::{ModelKind, fit_error},
    report::io::{ReportName, ToFrame, ToSchema},
};

/// One predicted value after the end of the history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    /// 1-based distance from the last observation.
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Output of exactly one forecasting back-end.
///
/// # Invariants
/// - non-empty, one point per requested step
/// - steps run `1..=len` and timestamps are strictly ascending
/// - every value is finite
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    model: ModelKind,
    points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    /// Pairs predicted values with explicit future timestamps.
    pub fn new(
        model: ModelKind,
        timestamps: Vec<DateTime<Utc>>,
        values: Vec<f64>,
    ) -> Result<Self, ModelError> {
        if values.is_empty() {
            return Err(fit_error(model, "model produced no values"));
        }
        if timestamps.len() != values.len() {
            return Err(fit_error(
                model,
                format!(
                    "{} timestamps for {} values",
                    timestamps.len(),
                    values.len()
                ),
            ));
        }
        if let Some(step) = values.iter().position(|v| !v.is_finite()) {
            return Err(fit_error(
                model,
                format!("non-finite prediction at step {}", step + 1),
            ));
        }

        let points = timestamps
            .into_iter()
            .zip(values)
            .enumerate()
            .map(|(i, (timestamp, value))| ForecastPoint {
                step: i + 1,
                timestamp,
                value,
            })
            .collect();
        Ok(Self { model, points })
    }

    /// Stamps `values` with the timestamps that follow `history` at its cadence.
    pub fn after(
        model: ModelKind,
        history: &CanonicalSeries,
        values: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let last = history
            .last()
            .map(|p| p.timestamp)
            .ok_or_else(|| fit_error(model, "empty history"))?;
        let timestamps = history.cadence().project(last, values.len());
        Self::new(model, timestamps, values)
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.timestamp).collect()
    }
}

impl ReportName for ForecastSeries {
    fn base_name(&self) -> String {
        format!("forecast_{}", self.model.slug())
    }
}

impl ToSchema for ForecastSeries {
    fn to_schema() -> SchemaRef {
        forecast_schema()
    }
}

impl ToFrame for ForecastSeries {
    fn to_frame(&self) -> PipelineResult<DataFrame> {
        let steps: Vec<u32> = self.points.iter().map(|p| p.step as u32).collect();
        let millis: Vec<i64> = self
            .points
            .iter()
            .map(|p| p.timestamp.timestamp_millis())
            .collect();

        let df = df![
            SeriesCol::Step.as_str() => steps,
            SeriesCol::Timestamp.as_str() => millis,
            SeriesCol::Forecast.as_str() => self.values()
        ]
        .and_then(|df| {
            df.lazy()
                .with_column(
                    col(SeriesCol::Timestamp.as_str()).cast(SeriesCol::Timestamp.dtype()),
                )
                .collect()
        })
        .map_err(|e| DataError::DataFrame(format!("Failed to build forecast frame: {e}")))?;
        Ok(df)
    }
}
