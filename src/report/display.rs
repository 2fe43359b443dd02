use chrono::{DateTime, Utc};
use polars::{
    df,
    frame::DataFrame,
    prelude::{IntoLazy, SchemaRef, col},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    data::{
        schema::{SeriesCol, display_schema},
        series::CanonicalSeries,
    },
    error::{DataError, PipelineResult},
    model::ModelKind,
    report::{
        forecast::ForecastSeries,
        io::{ReportName, ToFrame, ToSchema},
    },
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Historical,
    Forecast,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub kind: SeriesKind,
}

/// Chart-ready view: the last `k` observations followed by the forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySeries {
    model: ModelKind,
    points: Vec<DisplayPoint>,
}

impl DisplaySeries {
    pub fn assemble(history: &CanonicalSeries, forecast: &ForecastSeries, k: usize) -> Self {
        let historical = history.tail(k).iter().map(|p| DisplayPoint {
            timestamp: p.timestamp,
            value: p.close,
            kind: SeriesKind::Historical,
        });
        let predicted = forecast.points().iter().map(|p| DisplayPoint {
            timestamp: p.timestamp,
            value: p.value,
            kind: SeriesKind::Forecast,
        });

        Self {
            model: forecast.model(),
            points: historical.chain(predicted).collect(),
        }
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

    pub fn points(&self) -> &[DisplayPoint] {
        &self.points
    }

    pub fn historical(&self) -> impl Iterator<Item = &DisplayPoint> {
        self.points.iter().filter(|p| p.kind == SeriesKind::Historical)
    }

    pub fn forecast(&self) -> impl Iterator<Item = &DisplayPoint> {
        self.points.iter().filter(|p| p.kind == SeriesKind::Forecast)
    }
}

impl ReportName for DisplaySeries {
    fn base_name(&self) -> String {
        format!("display_{}", self.model.slug())
    }
}

impl ToSchema for DisplaySeries {
    fn to_schema() -> SchemaRef {
        display_schema()
    }
}

impl ToFrame for DisplaySeries {
    fn to_frame(&self) -> PipelineResult<DataFrame> {
        let millis: Vec<i64> = self
            .points
            .iter()
            .map(|p| p.timestamp.timestamp_millis())
            .collect();
        let values: Vec<f64> = self.points.iter().map(|p| p.value).collect();
        let kinds: Vec<&'static str> = self.points.iter().map(|p| p.kind.into()).collect();

        let df = df![
            SeriesCol::Timestamp.as_str() => millis,
            SeriesCol::Value.as_str() => values,
            SeriesCol::Kind.as_str() => kinds
        ]
        .and_then(|df| {
            df.lazy()
                .with_column(
                    col(SeriesCol::Timestamp.as_str()).cast(SeriesCol::Timestamp.dtype()),
                )
                .collect()
        })
        .map_err(|e| DataError::DataFrame(format!("Failed to build display frame: {e}")))?;
        Ok(df)
    }
}
