use std::time::Instant;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::info_span;

use crate::{
    config::{Horizon, PipelineConfig},
    data::{
        preprocess::{self, NormalizeSummary},
        series::CanonicalSeries,
        table::RawTable,
    },
    error::PipelineResult,
    model::ModelKind,
    report::{display::DisplaySeries, forecast::ForecastSeries},
};

/// Lifecycle of one run: `Load → Normalize → Forecast → Assemble`.
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
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Normalize,
    Forecast,
    Assemble,
}

/// Preprocessing plus one forecasting back-end, driven by an immutable configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    cfg: PipelineConfig,
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub history: CanonicalSeries,
    pub forecast: ForecastSeries,
    pub summary: NormalizeSummary,
    display_tail: usize,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> PipelineResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Normalizes `raw` and forecasts it with the configured model. The first failure is
    /// returned, attributed to the stage it occurred in.
    #[tracing::instrument(skip_all, fields(model = %self.cfg.model(), horizon = self.cfg.horizon().get()))]
    pub fn run(&self, raw: &RawTable) -> PipelineResult<PipelineRun> {
        let normalized = info_span!("normalize", rows = raw.height())
            .in_scope(|| preprocess::normalize(raw))
            .map_err(|e| e.at(Stage::Normalize))?;
        tracing::debug!(
            stage = %Stage::Normalize,
            points = normalized.series.len(),
            "Stage complete"
        );

        let model = self.cfg.model();
        let forecaster = model.forecaster(&self.cfg);
        let started = Instant::now();
        let forecast = info_span!("forecast", %model)
            .in_scope(|| forecaster.forecast(&normalized.series, self.cfg.horizon()))
            .map_err(|e| e.at(Stage::Forecast))?;
        let elapsed = started.elapsed();
        tracing::debug!(stage = %Stage::Forecast, steps = forecast.len(), "Stage complete");

        tracing::info!(
            %model,
            points = normalized.series.len(),
            steps = forecast.len(),
            elapsed = %humantime::format_duration(truncate_to_millis(elapsed)),
            "Forecast ready"
        );

        Ok(PipelineRun {
            history: normalized.series,
            forecast,
            summary: normalized.summary,
            display_tail: self.cfg.display_tail(),
        })
    }
}

impl PipelineRun {
    /// The last `k` observations followed by the forecast.
    pub fn display(&self, k: usize) -> DisplaySeries {
        DisplaySeries::assemble(&self.history, &self.forecast, k)
    }

    /// [`Self::display`] with the configured tail length.
    pub fn display_default(&self) -> DisplaySeries {
        self.display(self.display_tail)
    }
}

/// Runs a default-configured pipeline for `model` and `horizon`.
pub fn run(raw: &RawTable, model: ModelKind, horizon: Horizon) -> PipelineResult<PipelineRun> {
    Pipeline::new(
        PipelineConfig::default()
            .with_model(model)
            .with_horizon(horizon),
    )?
    .run(raw)
}

fn truncate_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArimaConfig, LstmConfig};

    fn daily_csv(n: usize) -> RawTable {
        let mut csv = String::from("Date,Close\n");
        for i in 0..n {
            let date = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
                + chrono::Duration::days(i as i64);
            csv.push_str(&format!("{date},{}\n", 100.0 + (i as f64 * 0.3).sin() * 3.0 + i as f64 * 0.1));
        }
        RawTable::try_from(csv.as_str()).unwrap()
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Normalize.to_string(), "normalize");
        assert_eq!(Stage::Forecast.to_string(), "forecast");
    }

    #[test]
    fn test_run_arima() {
        let out = run(&daily_csv(60), ModelKind::Arima, Horizon::new(5).unwrap()).unwrap();
        assert_eq!(out.forecast.len(), 5);
        assert_eq!(out.history.len(), 60);
        assert_eq!(out.summary.output_rows(), 60);
        assert_eq!(out.display_default().len(), 30 + 5);
        assert_eq!(out.display(3).len(), 3 + 5);
    }

    #[test]
    fn test_schema_error_carries_normalize_stage() {
        let raw = RawTable::try_from("Date,Open\n2024-01-01,1\n").unwrap();
        let err = run(&raw, ModelKind::Arima, Horizon::default()).unwrap_err();

        assert!(err.is_schema());
        assert_eq!(err.stage(), Some(Stage::Normalize));
    }

    #[test]
    fn test_short_series_carries_forecast_stage() {
        let cfg = PipelineConfig::default()
            .with_model(ModelKind::Lstm)
            .with_lstm(LstmConfig::default().with_epochs(2));
        let err = Pipeline::new(cfg).unwrap().run(&daily_csv(5)).unwrap_err();

        assert!(err.is_insufficient_data());
        assert_eq!(err.stage(), Some(Stage::Forecast));
        assert!(err.to_string().starts_with("forecast stage failed"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let cfg = PipelineConfig::default().with_arima(ArimaConfig::default().with_order(11, 1, 0));
        assert!(Pipeline::new(cfg).is_err());
    }
}
