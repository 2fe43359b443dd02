//! Prophet-style additive regression: piecewise-linear trend plus Fourier seasonalities.
//!
//! Time is measured in days since the first observation and scaled to `[0, 1]`; prices
//! are scaled by their largest absolute value. The trend is `k·t + m` plus one hinge
//! `(t - s_j)₊` per changepoint, so beyond the last changepoint the forecast keeps the
//! final slope. All coefficients are estimated jointly by ridge regression, the penalty of
//! each block being the noise variance over its prior variance.

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};

use crate::{
    config::{Horizon, ProphetConfig, Seasonality},
    data::series::{CanonicalSeries, MILLIS_PER_DAY},
    error::PipelineResult,
    model::{Forecaster, ModelKind, fit_error, linalg},
    report::forecast::ForecastSeries,
};

const WEEKLY_PERIOD_DAYS: f64 = 7.0;
const YEARLY_PERIOD_DAYS: f64 = 365.25;

/// History needed before a seasonality is fitted in [`Seasonality::Auto`] mode.
const WEEKLY_MIN_SPAN_DAYS: f64 = 2.0 * WEEKLY_PERIOD_DAYS;
const YEARLY_MIN_SPAN_DAYS: f64 = 2.0 * YEARLY_PERIOD_DAYS;

/// Floor of the noise variance on the scaled axis; keeps penalties positive on noiseless input.
const MIN_NOISE_VAR: f64 = 1e-4;
/// Penalty on intercept and base slope, effectively unregularized.
const BASE_PENALTY: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Prophet {
    cfg: ProphetConfig,
}

/// Scaling and component layout of a fitted model.
#[derive(Debug, Clone)]
struct Design {
    origin: DateTime<Utc>,
    t_scale: f64,
    changepoints: Vec<f64>,
    weekly_order: usize,
    yearly_order: usize,
}

impl Prophet {
    pub fn new(cfg: ProphetConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ProphetConfig {
        &self.cfg
    }

    fn design(&self, series: &CanonicalSeries) -> Design {
        let timestamps = series.timestamps();
        let origin = timestamps[0];
        let span = days_between(origin, timestamps[timestamps.len() - 1]);
        let t_scale = if span > 0.0 { span } else { 1.0 };

        // Changepoints sit on observed timestamps inside the first `changepoint_range` of history.
        let n = timestamps.len();
        let hist = ((n as f64) * self.cfg.changepoint_range).floor() as usize;
        let n_cp = self.cfg.n_changepoints.min(hist.saturating_sub(1));
        let changepoints = (1..=n_cp)
            .map(|j| {
                let idx = (j * (hist - 1)) / n_cp;
                days_between(origin, timestamps[idx]) / t_scale
            })
            .collect();

        let cadence_days = series.cadence().approx_days();
        let weekly_order = match self.cfg.weekly {
            Seasonality::Enabled => self.cfg.weekly_order,
            Seasonality::Disabled => 0,
            Seasonality::Auto => {
                if span >= WEEKLY_MIN_SPAN_DAYS && cadence_days < WEEKLY_PERIOD_DAYS {
                    self.cfg.weekly_order
                } else {
                    0
                }
            }
        };
        let yearly_order = match self.cfg.yearly {
            Seasonality::Enabled => self.cfg.yearly_order,
            Seasonality::Disabled => 0,
            Seasonality::Auto => {
                if span >= YEARLY_MIN_SPAN_DAYS {
                    self.cfg.yearly_order
                } else {
                    0
                }
            }
        };

        Design {
            origin,
            t_scale,
            changepoints,
            weekly_order,
            yearly_order,
        }
    }
}

impl Design {
    fn n_cols(&self) -> usize {
        2 + self.changepoints.len() + 2 * (self.weekly_order + self.yearly_order)
    }

    fn row(&self, ts: DateTime<Utc>) -> Vec<f64> {
        let days = days_between(self.origin, ts);
        let t = days / self.t_scale;

        let mut row = Vec::with_capacity(self.n_cols());
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|s| (t - s).max(0.0)));
        push_fourier(&mut row, days, WEEKLY_PERIOD_DAYS, self.weekly_order);
        push_fourier(&mut row, days, YEARLY_PERIOD_DAYS, self.yearly_order);
        row
    }

    fn matrix(&self, timestamps: &[DateTime<Utc>]) -> Array2<f64> {
        let cols = self.n_cols();
        let mut x = Array2::<f64>::zeros((timestamps.len(), cols));
        for (r, ts) in timestamps.iter().enumerate() {
            for (c, v) in self.row(*ts).into_iter().enumerate() {
                x[[r, c]] = v;
            }
        }
        x
    }

    fn penalties(&self, noise_var: f64, cfg: &ProphetConfig) -> Array1<f64> {
        let trend = noise_var / cfg.changepoint_prior_scale.powi(2);
        let seasonal = noise_var / cfg.seasonality_prior_scale.powi(2);
        let n_cp = self.changepoints.len();

        Array1::from_iter((0..self.n_cols()).map(|c| match c {
            0 | 1 => BASE_PENALTY,
            c if c < 2 + n_cp => trend,
            _ => seasonal,
        }))
    }
}

impl Forecaster for Prophet {
    fn kind(&self) -> ModelKind {
        ModelKind::Prophet
    }

    fn min_observations(&self) -> usize {
        2
    }

    #[tracing::instrument(skip_all, fields(n = series.len()))]
    fn forecast(
        &self,
        series: &CanonicalSeries,
        horizon: Horizon,
    ) -> PipelineResult<ForecastSeries> {
        self.check_len(series)?;

        let closes = series.closes();
        let y_scale = closes
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
            .max(f64::MIN_POSITIVE);
        let y = Array1::from_iter(closes.iter().map(|v| v / y_scale));

        let design = self.design(series);
        tracing::debug!(
            changepoints = design.changepoints.len(),
            weekly_order = design.weekly_order,
            yearly_order = design.yearly_order,
            "Prophet design"
        );

        let x = design.matrix(&series.timestamps());
        let noise_var = linear_residual_var(&x, &y).max(MIN_NOISE_VAR);
        let beta = linalg::ridge(&x, &y, &design.penalties(noise_var, &self.cfg))
            .map_err(|e| fit_error(ModelKind::Prophet, e))?;

        let last = series
            .last()
            .map(|p| p.timestamp)
            .ok_or_else(|| fit_error(ModelKind::Prophet, "empty series"))?;
        let future = series.cadence().project(last, horizon.get());
        let values = design
            .matrix(&future)
            .dot(&beta)
            .iter()
            .map(|v| v * y_scale)
            .collect::<Vec<_>>();

        Ok(ForecastSeries::new(ModelKind::Prophet, future, values)?)
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_DAY
}

fn push_fourier(row: &mut Vec<f64>, days: f64, period: f64, order: usize) {
    for k in 1..=order {
        let angle = 2.0 * std::f64::consts::PI * k as f64 * days / period;
        row.push(angle.sin());
        row.push(angle.cos());
    }
}

/// Residual variance of a plain straight-line fit, used as the noise scale.
fn linear_residual_var(x: &Array2<f64>, y: &Array1<f64>) -> f64 {
    let n = y.len() as f64;
    let t = x.column(1);
    let t_mean = t.sum() / n;
    let y_mean = y.sum() / n;
    let sxx: f64 = t.iter().map(|v| (v - t_mean).powi(2)).sum();
    let sxy: f64 = t.iter().zip(y).map(|(a, b)| (a - t_mean) * (b - y_mean)).sum();
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = y_mean - slope * t_mean;

    let rss: f64 = t
        .iter()
        .zip(y)
        .map(|(a, b)| (b - intercept - slope * a).powi(2))
        .sum();
    rss / n
}
