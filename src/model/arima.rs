//! ARIMA(p, d, q) fitted by conditional least squares.
//!
//! The series is differenced `d` times. With `q == 0` the AR coefficients come from a
//! single regression on lagged differences. With `q > 0` the Hannan-Rissanen procedure
//! is used: a long autoregression supplies innovation estimates, and the final regression
//! uses lagged values together with lagged innovations. Forecasts set future shocks to zero
//! and are integrated back to price level.

use ndarray::{Array1, Array2};

use crate::{
    config::{ArimaConfig, Horizon},
    data::series::CanonicalSeries,
    error::PipelineResult,
    model::{Forecaster, ModelKind, fit_error, linalg},
    report::forecast::ForecastSeries,
};

/// Ridge penalty relative to the mean diagonal of the normal equations. Keeps exactly
/// collinear designs (e.g. a perfectly linear price path) solvable.
const RELATIVE_RIDGE: f64 = 1e-8;
const MIN_LONG_AR_ORDER: usize = 4;

#[derive(Debug, Clone)]
pub struct Arima {
    cfg: ArimaConfig,
}

/// Coefficients of a fitted model on the differenced scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ArimaFit {
    pub intercept: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    /// In-sample innovations, aligned with the differenced series.
    residuals: Vec<f64>,
}

impl Arima {
    pub fn new(cfg: ArimaConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ArimaConfig {
        &self.cfg
    }

    fn long_ar_order(&self) -> usize {
        if self.cfg.q == 0 {
            0
        } else {
            (self.cfg.p + self.cfg.q).max(MIN_LONG_AR_ORDER)
        }
    }

    /// First index of the differenced series usable as a regression target.
    fn first_target(&self) -> usize {
        if self.cfg.q == 0 {
            self.cfg.p
        } else {
            self.cfg.p.max(self.long_ar_order() + self.cfg.q)
        }
    }

    fn n_params(&self) -> usize {
        1 + self.cfg.p + self.cfg.q
    }

    /// Fits the coefficients on an already differenced series.
    pub fn fit(&self, z: &[f64]) -> PipelineResult<ArimaFit> {
        let ArimaConfig { p, q, .. } = self.cfg;

        let innovations = if q == 0 {
            Vec::new()
        } else {
            let m = self.long_ar_order();
            let long = regress_lags(z, m, &[], 0, m).map_err(|e| {
                fit_error(ModelKind::Arima, format!("long autoregression failed: {e}"))
            })?;
            let long_ar: Vec<f64> = long.iter().skip(1).copied().collect();
            let mut e = vec![0.0; z.len()];
            for t in m..z.len() {
                e[t] = z[t] - predict_at(z, &e, t, long[0], &long_ar, &[]);
            }
            e
        };

        let beta = regress_lags(z, p, &innovations, q, self.first_target())
            .map_err(|e| fit_error(ModelKind::Arima, e))?;
        let intercept = beta[0];
        let ar = beta.iter().skip(1).take(p).copied().collect::<Vec<_>>();
        let ma = beta.iter().skip(1 + p).take(q).copied().collect::<Vec<_>>();

        if !intercept.is_finite() || ar.iter().chain(ma.iter()).any(|c| !c.is_finite()) {
            return Err(fit_error(ModelKind::Arima, "non-finite coefficients").into());
        }

        // Recursive innovations under the fitted model, zero before the first target.
        let start = self.first_target();
        let mut residuals = vec![0.0; z.len()];
        for t in start..z.len() {
            residuals[t] = z[t] - predict_at(z, &residuals, t, intercept, &ar, &ma);
        }

        Ok(ArimaFit {
            intercept,
            ar,
            ma,
            residuals,
        })
    }
}

impl ArimaFit {
    /// Forecasts `steps` values on the differenced scale.
    pub fn predict(&self, z: &[f64], steps: usize) -> Vec<f64> {
        let mut values = z.to_vec();
        let mut shocks = self.residuals.clone();
        for _ in 0..steps {
            let t = values.len();
            let next = predict_at(&values, &shocks, t, self.intercept, &self.ar, &self.ma);
            values.push(next);
            shocks.push(0.0);
        }
        values.split_off(z.len())
    }
}

impl Forecaster for Arima {
    fn kind(&self) -> ModelKind {
        ModelKind::Arima
    }

    fn min_observations(&self) -> usize {
        let ArimaConfig { p, d, q } = self.cfg;
        let main = self.first_target() + 2 * self.n_params();
        let long = if q == 0 {
            0
        } else {
            let m = self.long_ar_order();
            m + 2 * (1 + m)
        };
        d + main.max(long).max(p + 2)
    }

    #[tracing::instrument(skip_all, fields(p = self.cfg.p, d = self.cfg.d, q = self.cfg.q, n = series.len()))]
    fn forecast(
        &self,
        series: &CanonicalSeries,
        horizon: Horizon,
    ) -> PipelineResult<ForecastSeries> {
        self.check_len(series)?;

        let levels = difference_levels(&series.closes(), self.cfg.d);
        let z = levels.last().map(Vec::as_slice).unwrap_or_default();

        let fit = self.fit(z)?;
        tracing::debug!(intercept = fit.intercept, ar = ?fit.ar, ma = ?fit.ma, "ARIMA fitted");

        let diffs = fit.predict(z, horizon.get());
        let values = integrate(&levels, diffs);

        Ok(ForecastSeries::after(ModelKind::Arima, series, values)?)
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

/// `z[t]` predicted from lags of `z` and of the innovations `e`.
fn predict_at(z: &[f64], e: &[f64], t: usize, intercept: f64, ar: &[f64], ma: &[f64]) -> f64 {
    let ar_part: f64 = ar
        .iter()
        .enumerate()
        .filter(|(j, _)| t > *j)
        .map(|(j, phi)| phi * z[t - j - 1])
        .sum();
    let ma_part: f64 = ma
        .iter()
        .enumerate()
        .filter(|(j, _)| t > *j)
        .map(|(j, theta)| theta * e[t - j - 1])
        .sum();
    intercept + ar_part + ma_part
}

/// Least squares of `z[t]` on `[1, z[t-1..=t-p], e[t-1..=t-q]]` for `t >= start`.
fn regress_lags(z: &[f64], p: usize, e: &[f64], q: usize, start: usize) -> Result<Array1<f64>, String> {
    let rows = z.len().saturating_sub(start);
    let cols = 1 + p + q;
    if rows < cols {
        return Err(format!("{rows} usable rows for {cols} coefficients"));
    }

    let mut x = Array2::<f64>::zeros((rows, cols));
    let mut y = Array1::<f64>::zeros(rows);
    for (r, t) in (start..z.len()).enumerate() {
        x[[r, 0]] = 1.0;
        for j in 0..p {
            x[[r, 1 + j]] = z[t - j - 1];
        }
        for j in 0..q {
            x[[r, 1 + p + j]] = e[t - j - 1];
        }
        y[r] = z[t];
    }

    let gram_scale = x.iter().map(|v| v * v).sum::<f64>() / cols as f64;
    let penalty = Array1::from_elem(cols, RELATIVE_RIDGE * gram_scale.max(f64::MIN_POSITIVE));
    linalg::ridge(&x, &y, &penalty)
}

/// `levels[0]` is the input, `levels[k]` its k-th difference.
fn difference_levels(data: &[f64], d: usize) -> Vec<Vec<f64>> {
    let mut levels = vec![data.to_vec()];
    for _ in 0..d {
        let prev = levels.last().map(Vec::as_slice).unwrap_or_default();
        let next: Vec<f64> = prev.windows(2).map(|w| w[1] - w[0]).collect();
        levels.push(next);
    }
    levels
}

/// Undoes the differencing: each level is rebuilt as a running sum anchored on its last value.
fn integrate(levels: &[Vec<f64>], mut forecast: Vec<f64>) -> Vec<f64> {
    for level in levels.iter().rev().skip(1) {
        let mut acc = level.last().copied().unwrap_or_default();
        for v in forecast.iter_mut() {
            acc += *v;
            *v = acc;
        }
    }
    forecast
}
