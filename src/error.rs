use thiserror::Error;

use crate::{model::ModelKind, pipeline::Stage};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] IoError),

    /// Any of the above, attributed to the pipeline stage that raised it.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Attaches the pipeline stage to an error. Already attributed errors keep their stage.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage the error was raised in, if it was attributed.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage attribution peeled off.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_schema(&self) -> bool {
        matches!(self.root(), Self::Data(DataError::Schema(_)))
    }

    pub fn is_empty_data(&self) -> bool {
        matches!(self.root(), Self::Data(DataError::Empty { .. }))
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self.root(), Self::Model(ModelError::InsufficientData { .. }))
    }

    pub fn is_model_fit(&self) -> bool {
        matches!(self.root(), Self::Model(ModelError::Fit { .. }))
    }
}

/// Errors raised while turning a raw table into a canonical series.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No valid rows left after cleaning ({dropped} of {input_rows} rows dropped)")]
    Empty { input_rows: usize, dropped: usize },

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

/// Errors raised by the forecasting back-ends.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{model} needs at least {required} observations, got {actual}")]
    InsufficientData {
        model: ModelKind,
        required: usize,
        actual: usize,
    },

    #[error("{model} fit failed: {reason}")]
    Fit { model: ModelKind, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid forecast horizon: {0} (must be at least 1)")]
    InvalidHorizon(usize),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown model '{0}' (expected one of: arima, prophet, lstm)")]
    UnknownModel(String),
}

/// Errors related to file I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(IoError::Io(e))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Io(IoError::Json(e))
    }
}
