use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, IoError, PipelineResult},
    model::ModelKind,
};

// ================================================================================================
// Defaults
// ================================================================================================

pub const DEFAULT_HORIZON: usize = 30;
pub const DEFAULT_DISPLAY_TAIL: usize = 30;

/// `(p, d, q)`
pub const DEFAULT_ARIMA_ORDER: (usize, usize, usize) = (5, 1, 0);
pub const MAX_ARIMA_AR_ORDER: usize = 10;
pub const MAX_ARIMA_DIFF_ORDER: usize = 2;
pub const MAX_ARIMA_MA_ORDER: usize = 10;

pub const DEFAULT_PROPHET_CHANGEPOINTS: usize = 25;
pub const DEFAULT_PROPHET_CHANGEPOINT_RANGE: f64 = 0.8;
pub const DEFAULT_PROPHET_CHANGEPOINT_PRIOR_SCALE: f64 = 0.05;
pub const DEFAULT_PROPHET_SEASONALITY_PRIOR_SCALE: f64 = 10.0;
pub const DEFAULT_PROPHET_WEEKLY_ORDER: usize = 3;
pub const DEFAULT_PROPHET_YEARLY_ORDER: usize = 10;

pub const DEFAULT_LSTM_WINDOW: usize = 10;
pub const DEFAULT_LSTM_HIDDEN: usize = 16;
pub const DEFAULT_LSTM_EPOCHS: usize = 30;
pub const DEFAULT_LSTM_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_LSTM_SEED: u64 = 42;

// ================================================================================================
// Horizon
// ================================================================================================

/// Number of future periods to forecast. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Horizon(usize);

impl Horizon {
    pub fn new(steps: usize) -> Result<Self, ConfigError> {
        if steps == 0 {
            return Err(ConfigError::InvalidHorizon(steps));
        }
        Ok(Self(steps))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for Horizon {
    fn default() -> Self {
        Self(DEFAULT_HORIZON)
    }
}

impl TryFrom<usize> for Horizon {
    type Error = ConfigError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Horizon> for usize {
    fn from(h: Horizon) -> Self {
        h.0
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ================================================================================================
// Model Configurations
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaConfig {
    /// Autoregressive order.
    pub p: usize,
    /// Differencing order.
    pub d: usize,
    /// Moving-average order.
    pub q: usize,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        let (p, d, q) = DEFAULT_ARIMA_ORDER;
        Self { p, d, q }
    }
}

impl ArimaConfig {
    pub fn with_order(self, p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check(self.p <= MAX_ARIMA_AR_ORDER, "arima.p", || {
            format!("AR order must be <= {MAX_ARIMA_AR_ORDER}")
        })?;
        check(self.d <= MAX_ARIMA_DIFF_ORDER, "arima.d", || {
            format!("differencing order must be <= {MAX_ARIMA_DIFF_ORDER}")
        })?;
        check(self.q <= MAX_ARIMA_MA_ORDER, "arima.q", || {
            format!("MA order must be <= {MAX_ARIMA_MA_ORDER}")
        })
    }
}

/// Whether a seasonal component is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Seasonality {
    /// Enabled when the history is long and dense enough to identify it.
    #[default]
    Auto,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProphetConfig {
    /// Number of potential trend changepoints.
    pub n_changepoints: usize,
    /// Share of the history (from the start) in which changepoints are placed.
    pub changepoint_range: f64,
    /// Flexibility of the trend. Larger values allow sharper slope changes.
    pub changepoint_prior_scale: f64,
    /// Flexibility of the seasonal components.
    pub seasonality_prior_scale: f64,
    pub weekly: Seasonality,
    pub weekly_order: usize,
    pub yearly: Seasonality,
    pub yearly_order: usize,
}

impl Default for ProphetConfig {
    fn default() -> Self {
        Self {
            n_changepoints: DEFAULT_PROPHET_CHANGEPOINTS,
            changepoint_range: DEFAULT_PROPHET_CHANGEPOINT_RANGE,
            changepoint_prior_scale: DEFAULT_PROPHET_CHANGEPOINT_PRIOR_SCALE,
            seasonality_prior_scale: DEFAULT_PROPHET_SEASONALITY_PRIOR_SCALE,
            weekly: Seasonality::Auto,
            weekly_order: DEFAULT_PROPHET_WEEKLY_ORDER,
            yearly: Seasonality::Auto,
            yearly_order: DEFAULT_PROPHET_YEARLY_ORDER,
        }
    }
}

impl ProphetConfig {
    pub fn with_changepoints(self, n_changepoints: usize) -> Self {
        Self {
            n_changepoints,
            ..self
        }
    }

    pub fn with_weekly(self, weekly: Seasonality) -> Self {
        Self { weekly, ..self }
    }

    pub fn with_yearly(self, yearly: Seasonality) -> Self {
        Self { yearly, ..self }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check(
            self.changepoint_range > 0.0 && self.changepoint_range <= 1.0,
            "prophet.changepoint_range",
            || "must lie in (0, 1]".to_string(),
        )?;
        check(
            self.changepoint_prior_scale.is_finite() && self.changepoint_prior_scale > 0.0,
            "prophet.changepoint_prior_scale",
            || "must be positive".to_string(),
        )?;
        check(
            self.seasonality_prior_scale.is_finite() && self.seasonality_prior_scale > 0.0,
            "prophet.seasonality_prior_scale",
            || "must be positive".to_string(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmConfig {
    /// Number of past observations fed to the network per prediction.
    pub window: usize,
    /// Width of the LSTM hidden state.
    pub hidden: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// `None` seeds from the operating system, making runs non-reproducible.
    pub seed: Option<u64>,
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_LSTM_WINDOW,
            hidden: DEFAULT_LSTM_HIDDEN,
            epochs: DEFAULT_LSTM_EPOCHS,
            learning_rate: DEFAULT_LSTM_LEARNING_RATE,
            seed: Some(DEFAULT_LSTM_SEED),
        }
    }
}

impl LstmConfig {
    pub fn with_window(self, window: usize) -> Self {
        Self { window, ..self }
    }

    pub fn with_hidden(self, hidden: usize) -> Self {
        Self { hidden, ..self }
    }

    pub fn with_epochs(self, epochs: usize) -> Self {
        Self { epochs, ..self }
    }

    pub fn with_seed(self, seed: Option<u64>) -> Self {
        Self { seed, ..self }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check(self.window > 0, "lstm.window", || "must be at least 1".to_string())?;
        check(self.hidden > 0, "lstm.hidden", || "must be at least 1".to_string())?;
        check(self.epochs > 0, "lstm.epochs", || "must be at least 1".to_string())?;
        check(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "lstm.learning_rate",
            || "must be positive".to_string(),
        )
    }
}

// ================================================================================================
// Pipeline Configuration
// ================================================================================================

/// Everything one pipeline run needs to know, passed by value into [`crate::Pipeline`].
///
/// # Example
///
/// ```
/// # use stockcast::prelude::*;
/// let cfg = PipelineConfig::default()
///     .with_model(ModelKind::Lstm)
///     .with_horizon(Horizon::new(14).unwrap())
///     .with_lstm(LstmConfig::default().with_seed(Some(7)));
/// assert_eq!(cfg.horizon().get(), 14);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    model: ModelKind,
    horizon: Horizon,
    /// Number of historical points prepended to the forecast in the display series.
    display_tail: usize,
    arima: ArimaConfig,
    prophet: ProphetConfig,
    lstm: LstmConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            horizon: Horizon::default(),
            display_tail: DEFAULT_DISPLAY_TAIL,
            arima: ArimaConfig::default(),
            prophet: ProphetConfig::default(),
            lstm: LstmConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(IoError::Json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            IoError::ReadFailed(format!("config file {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arima.validate()?;
        self.prophet.validate()?;
        self.lstm.validate()
    }

    pub fn with_model(self, model: ModelKind) -> Self {
        Self { model, ..self }
    }

    pub fn with_horizon(self, horizon: Horizon) -> Self {
        Self { horizon, ..self }
    }

    pub fn with_display_tail(self, display_tail: usize) -> Self {
        Self {
            display_tail,
            ..self
        }
    }

    pub fn with_arima(self, arima: ArimaConfig) -> Self {
        Self { arima, ..self }
    }

    pub fn with_prophet(self, prophet: ProphetConfig) -> Self {
        Self { prophet, ..self }
    }

    pub fn with_lstm(self, lstm: LstmConfig) -> Self {
        Self { lstm, ..self }
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn display_tail(&self) -> usize {
        self.display_tail
    }

    pub fn arima(&self) -> &ArimaConfig {
        &self.arima
    }

    pub fn prophet(&self) -> &ProphetConfig {
        &self.prophet
    }

    pub fn lstm(&self) -> &LstmConfig {
        &self.lstm
    }
}

fn check(ok: bool, name: &str, reason: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name: name.to_string(),
            reason: reason(),
        })
    }
}
