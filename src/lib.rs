//! Stock-price forecasting: normalize an arbitrary price table into a canonical series,
//! forecast it with ARIMA, a Prophet-style regression or an LSTM, and assemble the result
//! for display.
//!
//! ```no_run
//! # use stockcast::prelude::*;
//! # fn main() -> PipelineResult<()> {
//! let raw = RawTable::bundled()?;
//! let out = stockcast::run(&raw, ModelKind::Arima, Horizon::new(30)?)?;
//! out.display_default().to_csv("reports", None, None)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod report;

pub use pipeline::{Pipeline, PipelineRun, run};
