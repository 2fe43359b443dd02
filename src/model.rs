pub mod arima;
mod linalg;
pub mod lstm;
pub mod prophet;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
    config::{Horizon, PipelineConfig},
    data::series::CanonicalSeries,
    error::{ConfigError, ModelError, PipelineResult},
    model::{arima::Arima, lstm::Lstm, prophet::Prophet},
    report::forecast::ForecastSeries,
};

/// The interchangeable forecasting strategies.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ModelKind {
    #[default]
    #[strum(to_string = "ARIMA", serialize = "arima")]
    Arima,
    #[strum(to_string = "Prophet", serialize = "prophet")]
    Prophet,
    #[strum(to_string = "LSTM", serialize = "lstm")]
    Lstm,
}

impl ModelKind {
    /// Case-insensitive parse with a configuration error on unknown names.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        name.trim()
            .parse()
            .map_err(|_| ConfigError::UnknownModel(name.to_string()))
    }

    /// Lowercase identifier used in file names.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Arima => "arima",
            Self::Prophet => "prophet",
            Self::Lstm => "lstm",
        }
    }

    /// One-paragraph, user-facing explanation of the model.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Arima => {
                "ARIMA is a statistical model that combines autoregression, differencing, \
                 and moving averages."
            }
            Self::Prophet => {
                "Prophet-style forecasting fits a piecewise-linear trend with weekly and yearly \
                 seasonality; it is robust to missing data and trend shifts."
            }
            Self::Lstm => {
                "LSTM (Long Short-Term Memory) is a recurrent neural network that learns \
                 long-term dependencies in sequences of prices."
            }
        }
    }

    /// Builds the adapter for this model from the pipeline configuration.
    pub fn forecaster(&self, cfg: &PipelineConfig) -> Box<dyn Forecaster> {
        match self {
            Self::Arima => Box::new(Arima::new(*cfg.arima())),
            Self::Prophet => Box::new(Prophet::new(*cfg.prophet())),
            Self::Lstm => Box::new(Lstm::new(*cfg.lstm())),
        }
    }
}

/// Contract shared by all forecasting back-ends.
///
/// Implementations must return exactly `horizon` finite values or fail; they never
/// return partial output.
pub trait Forecaster: Debug + Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Smallest series length the model can be fitted on.
    fn min_observations(&self) -> usize;

    fn forecast(&self, series: &CanonicalSeries, horizon: Horizon)
    -> PipelineResult<ForecastSeries>;

    fn check_len(&self, series: &CanonicalSeries) -> Result<(), ModelError> {
        let required = self.min_observations();
        if series.len() < required {
            return Err(ModelError::InsufficientData {
                model: self.kind(),
                required,
                actual: series.len(),
            });
        }
        Ok(())
    }
}

pub(crate) fn fit_error(model: ModelKind, reason: impl Into<String>) -> ModelError {
    ModelError::Fit {
        model,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!(ModelKind::parse("ARIMA").unwrap(), ModelKind::Arima);
        assert_eq!(ModelKind::parse("prophet").unwrap(), ModelKind::Prophet);
        assert_eq!(ModelKind::parse(" Lstm ").unwrap(), ModelKind::Lstm);
        assert!(matches!(
            ModelKind::parse("xgboost"),
            Err(ConfigError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_display_and_slug() {
        assert_eq!(ModelKind::Arima.to_string(), "ARIMA");
        assert_eq!(ModelKind::Prophet.to_string(), "Prophet");
        assert_eq!(ModelKind::Lstm.to_string(), "LSTM");
        for kind in ModelKind::iter() {
            assert_eq!(ModelKind::parse(kind.slug()).unwrap(), kind);
        }
    }

    #[test]
    fn test_dispatch_builds_matching_adapter() {
        let cfg = PipelineConfig::default();
        for kind in ModelKind::iter() {
            assert_eq!(kind.forecaster(&cfg).kind(), kind);
        }
    }
}
