// 1. Traits
pub use crate::model::Forecaster;
pub use crate::report::io::{AsFormattedLazyFrame, ReportName, ToCsv, ToFrame, ToJson, ToSchema};

// 2. Pipeline
pub use crate::pipeline::{Pipeline, PipelineRun, Stage, run};

// 3. Data Types
pub use crate::data::preprocess::{DateLayout, NormalizeSummary, Normalized, normalize, normalize_series};
pub use crate::data::series::{Cadence, CanonicalSeries, PricePoint};
pub use crate::data::table::RawTable;
pub use crate::report::display::{DisplayPoint, DisplaySeries, SeriesKind};
pub use crate::report::forecast::{ForecastPoint, ForecastSeries};
pub use crate::report::io::FileExtension;

// 4. Models & Configurations
pub use crate::config::{
    ArimaConfig, Horizon, LstmConfig, PipelineConfig, ProphetConfig, Seasonality,
};
pub use crate::model::{ModelKind, arima::Arima, lstm::Lstm, prophet::Prophet};

// 5. Errors
pub use crate::error::{
    ConfigError, DataError, IoError, ModelError, PipelineError, PipelineResult,
};
