//! Single-layer LSTM regressor trained from scratch on sliding windows of scaled closes.
//!
//! The network maps `window` consecutive values to the next one through one LSTM layer
//! and a dense output. Training uses full backpropagation through time with Adam on the
//! squared error of each window. Weight initialization and the window order of every
//! epoch come from one `StdRng`, so a fixed seed reproduces a run bit for bit.

use ndarray::{Array1, Array2, Dimension, Zip, s};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{
    config::{Horizon, LstmConfig},
    data::series::CanonicalSeries,
    error::{ModelError, PipelineResult},
    model::{Forecaster, ModelKind, fit_error},
    report::forecast::ForecastSeries,
};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;
/// Gradients are rescaled when their global L2 norm exceeds this value.
const CLIP_NORM: f64 = 5.0;
const FORGET_BIAS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct Lstm {
    cfg: LstmConfig,
}

impl Lstm {
    pub fn new(cfg: LstmConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &LstmConfig {
        &self.cfg
    }

    /// Fits a network on already scaled values.
    pub fn train(&self, scaled: &[f64]) -> PipelineResult<TrainedLstm> {
        let window = self.cfg.window;
        if scaled.len() <= window {
            return Err(ModelError::InsufficientData {
                model: ModelKind::Lstm,
                required: window + 1,
                actual: scaled.len(),
            }
            .into());
        }

        let mut rng = match self.cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut net = Network::init(self.cfg.hidden, &mut rng);
        let mut adam = Adam::new(&net, self.cfg.learning_rate);

        let mut order: Vec<usize> = (0..scaled.len() - window).collect();
        let mut losses = Vec::with_capacity(self.cfg.epochs);

        for epoch in 0..self.cfg.epochs {
            order.shuffle(&mut rng);
            let mut total = 0.0;
            for &start in &order {
                let inputs = &scaled[start..start + window];
                let target = scaled[start + window];

                let (pred, tape) = net.forward(inputs);
                let err = pred - target;
                total += err * err;

                let mut grads = net.backward(&tape, err);
                grads.clip(CLIP_NORM);
                adam.step(&mut net, &grads);
            }

            let loss = total / order.len() as f64;
            if !loss.is_finite() {
                return Err(fit_error(
                    ModelKind::Lstm,
                    format!("training diverged at epoch {}", epoch + 1),
                )
                .into());
            }
            tracing::trace!(epoch = epoch + 1, loss, "LSTM epoch");
            losses.push(loss);
        }

        Ok(TrainedLstm { net, losses })
    }
}

/// A fitted network together with its per-epoch mean squared error.
#[derive(Debug, Clone)]
pub struct TrainedLstm {
    net: Network,
    losses: Vec<f64>,
}

impl TrainedLstm {
    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    /// Predicts `steps` values after `seed_window`, feeding each prediction back as input.
    pub fn predict(&self, seed_window: &[f64], steps: usize) -> Vec<f64> {
        let mut window = seed_window.to_vec();
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let (next, _) = self.net.forward(&window);
            out.push(next);
            window.remove(0);
            window.push(next);
        }
        out
    }
}

impl Forecaster for Lstm {
    fn kind(&self) -> ModelKind {
        ModelKind::Lstm
    }

    fn min_observations(&self) -> usize {
        self.cfg.window + 1
    }

    #[tracing::instrument(skip_all, fields(window = self.cfg.window, hidden = self.cfg.hidden, n = series.len()))]
    fn forecast(
        &self,
        series: &CanonicalSeries,
        horizon: Horizon,
    ) -> PipelineResult<ForecastSeries> {
        self.check_len(series)?;

        let scaler = MinMax::fit(&series.closes());
        let scaled = scaler.transform(&series.closes());

        let trained = self.train(&scaled)?;
        tracing::debug!(
            epochs = trained.losses.len(),
            final_loss = trained.losses.last().copied().unwrap_or_default(),
            "LSTM trained"
        );

        let seed_window = &scaled[scaled.len() - self.cfg.window..];
        let values = trained
            .predict(seed_window, horizon.get())
            .into_iter()
            .map(|v| scaler.inverse(v))
            .collect();

        Ok(ForecastSeries::after(ModelKind::Lstm, series, values)?)
    }
}

// ================================================================================================
// Scaling
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct MinMax {
    min: f64,
    range: f64,
}

impl MinMax {
    fn fit(values: &[f64]) -> Self {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        Self {
            min,
            range: if range > 0.0 { range } else { 1.0 },
        }
    }

    fn transform(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| (v - self.min) / self.range).collect()
    }

    fn inverse(&self, v: f64) -> f64 {
        v * self.range + self.min
    }
}

// ================================================================================================
// Network
// ================================================================================================

/// Gate rows are stacked as input, forget, candidate, output.
#[derive(Debug, Clone, PartialEq)]
struct Network {
    hidden: usize,
    w_x: Array1<f64>,
    w_h: Array2<f64>,
    b: Array1<f64>,
    w_y: Array1<f64>,
    b_y: Array1<f64>,
}

/// Activations of one forward pass, kept for backpropagation.
struct Tape {
    inputs: Vec<f64>,
    /// `h[0]` and `c[0]` are the zero initial state.
    h: Vec<Array1<f64>>,
    c: Vec<Array1<f64>>,
    gates: Vec<Array1<f64>>,
}

impl Network {
    fn init(hidden: usize, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (hidden as f64).sqrt();
        let w_x = Array1::from_shape_fn(4 * hidden, |_| rng.random_range(-bound..bound));
        let w_h = Array2::from_shape_fn((4 * hidden, hidden), |_| rng.random_range(-bound..bound));
        let mut b = Array1::<f64>::zeros(4 * hidden);
        b.slice_mut(s![hidden..2 * hidden]).fill(FORGET_BIAS);
        let w_y = Array1::from_shape_fn(hidden, |_| rng.random_range(-bound..bound));

        Self {
            hidden,
            w_x,
            w_h,
            b,
            w_y,
            b_y: Array1::zeros(1),
        }
    }

    fn forward(&self, inputs: &[f64]) -> (f64, Tape) {
        let hs = self.hidden;
        let mut tape = Tape {
            inputs: inputs.to_vec(),
            h: vec![Array1::zeros(hs)],
            c: vec![Array1::zeros(hs)],
            gates: Vec::with_capacity(inputs.len()),
        };

        for (t, &x) in inputs.iter().enumerate() {
            let mut z = &self.w_x * x + self.w_h.dot(&tape.h[t]) + &self.b;
            z.slice_mut(s![..2 * hs]).mapv_inplace(sigmoid);
            z.slice_mut(s![2 * hs..3 * hs]).mapv_inplace(f64::tanh);
            z.slice_mut(s![3 * hs..]).mapv_inplace(sigmoid);

            let (i, f, g, o) = split_gates(&z, hs);
            let c = &f * &tape.c[t] + &i * &g;
            let h = &o * &c.mapv(f64::tanh);

            tape.gates.push(z);
            tape.c.push(c);
            tape.h.push(h);
        }

        let last = tape.h.last().map_or(0.0, |h| self.w_y.dot(h));
        (last + self.b_y[0], tape)
    }

    /// Gradients of `0.5 · err²` with respect to every parameter.
    fn backward(&self, tape: &Tape, err: f64) -> Network {
        let hs = self.hidden;
        let steps = tape.inputs.len();
        let mut grads = Network {
            hidden: hs,
            w_x: Array1::zeros(4 * hs),
            w_h: Array2::zeros((4 * hs, hs)),
            b: Array1::zeros(4 * hs),
            w_y: &tape.h[steps] * err,
            b_y: Array1::from_elem(1, err),
        };

        let mut dh = &self.w_y * err;
        let mut dc_next = Array1::<f64>::zeros(hs);

        for t in (0..steps).rev() {
            let z = &tape.gates[t];
            let (i, f, g, o) = split_gates(z, hs);
            let c = &tape.c[t + 1];
            let c_prev = &tape.c[t];
            let h_prev = &tape.h[t];

            let tanh_c = c.mapv(f64::tanh);
            let d_o = &dh * &tanh_c;
            let dc = &dc_next + &(&dh * &o * &tanh_c.mapv(|v| 1.0 - v * v));

            let d_i = &dc * &g;
            let d_g = &dc * &i;
            let d_f = &dc * c_prev;
            dc_next = &dc * &f;

            let mut dz = Array1::<f64>::zeros(4 * hs);
            dz.slice_mut(s![..hs])
                .assign(&(&d_i * &i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![hs..2 * hs])
                .assign(&(&d_f * &f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * hs..3 * hs])
                .assign(&(&d_g * &g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * hs..])
                .assign(&(&d_o * &o.mapv(|v| v * (1.0 - v))));

            grads.w_x.scaled_add(tape.inputs[t], &dz);
            grads.b += &dz;
            grads.w_h += &outer(&dz, h_prev);
            dh = self.w_h.t().dot(&dz);
        }

        grads
    }

    fn sq_norm(&self) -> f64 {
        self.w_x.iter()
            .chain(self.w_h.iter())
            .chain(self.b.iter())
            .chain(self.w_y.iter())
            .chain(self.b_y.iter())
            .map(|v| v * v)
            .sum()
    }

    fn clip(&mut self, max_norm: f64) {
        let norm = self.sq_norm().sqrt();
        if norm > max_norm {
            let k = max_norm / norm;
            self.w_x *= k;
            self.w_h *= k;
            self.b *= k;
            self.w_y *= k;
            self.b_y *= k;
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            hidden: self.hidden,
            w_x: Array1::zeros(self.w_x.raw_dim()),
            w_h: Array2::zeros(self.w_h.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
            w_y: Array1::zeros(self.w_y.raw_dim()),
            b_y: Array1::zeros(self.b_y.raw_dim()),
        }
    }
}

struct Adam {
    lr: f64,
    t: i32,
    m: Network,
    v: Network,
}

impl Adam {
    fn new(net: &Network, lr: f64) -> Self {
        Self {
            lr,
            t: 0,
            m: net.zeros_like(),
            v: net.zeros_like(),
        }
    }

    fn step(&mut self, net: &mut Network, grads: &Network) {
        self.t += 1;
        let lr_t = self.lr * (1.0 - ADAM_BETA2.powi(self.t)).sqrt() / (1.0 - ADAM_BETA1.powi(self.t));

        adam_update(&mut net.w_x, &grads.w_x, &mut self.m.w_x, &mut self.v.w_x, lr_t);
        adam_update(&mut net.w_h, &grads.w_h, &mut self.m.w_h, &mut self.v.w_h, lr_t);
        adam_update(&mut net.b, &grads.b, &mut self.m.b, &mut self.v.b, lr_t);
        adam_update(&mut net.w_y, &grads.w_y, &mut self.m.w_y, &mut self.v.w_y, lr_t);
        adam_update(&mut net.b_y, &grads.b_y, &mut self.m.b_y, &mut self.v.b_y, lr_t);
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn adam_update<D: Dimension>(
    param: &mut ndarray::Array<f64, D>,
    grad: &ndarray::Array<f64, D>,
    m: &mut ndarray::Array<f64, D>,
    v: &mut ndarray::Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + ADAM_EPS);
        });
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn split_gates(
    z: &Array1<f64>,
    hs: usize,
) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
    (
        z.slice(s![..hs]).to_owned(),
        z.slice(s![hs..2 * hs]).to_owned(),
        z.slice(s![2 * hs..3 * hs]).to_owned(),
        z.slice(s![3 * hs..]).to_owned(),
    )
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::series::PricePoint;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: impl IntoIterator<Item = f64>) -> CanonicalSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| PricePoint::new(start + Duration::days(i as i64), v))
            .collect();
        CanonicalSeries::try_from_points(points).unwrap()
    }

    fn wave(n: usize) -> CanonicalSeries {
        series((0..n).map(|i| 100.0 + 10.0 * (i as f64 / 5.0).sin() + 0.1 * i as f64))
    }

    fn small() -> LstmConfig {
        LstmConfig::default()
            .with_window(5)
            .with_hidden(6)
            .with_epochs(8)
    }

    #[test]
    fn test_min_max_scaling() {
        let s = MinMax::fit(&[10.0, 20.0, 15.0]);
        assert_eq!(s.transform(&[10.0, 20.0, 15.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(s.inverse(0.5), 15.0);

        let flat = MinMax::fit(&[3.0, 3.0]);
        assert_eq!(flat.transform(&[3.0]), vec![0.0]);
        assert_eq!(flat.inverse(0.0), 3.0);
    }

    #[test]
    fn test_init_fills_every_weight() {
        let hidden = 4;
        let mut rng = StdRng::seed_from_u64(3);
        let net = Network::init(hidden, &mut rng);
        let bound = 1.0 / (hidden as f64).sqrt();

        assert_eq!(net.w_h.dim(), (4 * hidden, hidden));
        assert_eq!(net.w_x.len(), 4 * hidden);
        assert_eq!(net.w_y.len(), hidden);
        assert!(net.w_h.iter().all(|w| *w != 0.0 && w.abs() < bound));
        assert!(net.b.slice(s![hidden..2 * hidden]).iter().all(|b| *b == FORGET_BIAS));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(7);
        let net = Network::init(3, &mut rng);
        let inputs = [0.1, 0.5, 0.3, 0.8];
        let target = 0.4;

        let loss = |n: &Network| {
            let (p, _) = n.forward(&inputs);
            0.5 * (p - target).powi(2)
        };

        let (pred, tape) = net.forward(&inputs);
        let grads = net.backward(&tape, pred - target);

        let eps = 1e-6;
        for (r, c) in [(0, 0), (4, 1), (7, 2), (11, 0)] {
            let mut plus = net.clone();
            plus.w_h[[r, c]] += eps;
            let mut minus = net.clone();
            minus.w_h[[r, c]] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!(
                (numeric - grads.w_h[[r, c]]).abs() < 1e-6,
                "w_h[{r},{c}]: {numeric} vs {}",
                grads.w_h[[r, c]]
            );
        }
        for k in [0, 5, 9] {
            let mut plus = net.clone();
            plus.w_x[k] += eps;
            let mut minus = net.clone();
            minus.w_x[k] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - grads.w_x[k]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let s = wave(80);
        let scaled = MinMax::fit(&s.closes()).transform(&s.closes());
        let trained = Lstm::new(small().with_epochs(15)).train(&scaled).unwrap();

        let losses = trained.losses();
        assert_eq!(losses.len(), 15);
        assert!(losses[losses.len() - 1] < losses[0]);
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let s = wave(40);
        let model = Lstm::new(small().with_seed(Some(11)));
        let a = model.forecast(&s, Horizon::new(5).unwrap()).unwrap();
        let b = model.forecast(&s, Horizon::new(5).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_forecast_length_and_range() {
        let s = wave(60);
        let fc = Lstm::new(small())
            .forecast(&s, Horizon::new(12).unwrap())
            .unwrap();

        assert_eq!(fc.len(), 12);
        let (lo, hi) = (70.0, 130.0);
        assert!(fc.values().iter().all(|v| v.is_finite() && *v > lo && *v < hi));
    }

    #[test]
    fn test_window_plus_one_is_minimum() {
        let model = Lstm::new(small());
        assert_eq!(model.min_observations(), 6);

        let err = model
            .forecast(&wave(5), Horizon::new(3).unwrap())
            .unwrap_err();
        assert!(err.is_insufficient_data());

        assert!(model.forecast(&wave(6), Horizon::new(3).unwrap()).is_ok());
    }
}
