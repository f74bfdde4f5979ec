use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for PredictSweep orchestration runs.
///
/// Every variant here is fatal for the run that produced it. Recoverable
/// per-task problems are recorded as [`TaskFailure`] values on the task result
/// instead and never surface through this type.
#[derive(Error, Debug)]
pub enum PsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input construction error: {0}")]
    Input(#[from] InputError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by forecasting models while training or predicting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Training failed: {message}")]
    TrainingFailed { message: String },

    #[error("Prediction failed: {message}")]
    PredictionFailed { message: String },

    #[error("Invalid model parameter {parameter}: {message}")]
    InvalidParameter { parameter: String, message: String },

    #[error("Insufficient training data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Singular system: {message}")]
    Singular { message: String },
}

/// Errors raised while building model inputs from a series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Empty input data")]
    EmptyData,

    #[error("Insufficient data: need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Column {column} has length {got}, expected {expected}")]
    RaggedColumns {
        column: usize,
        expected: usize,
        got: usize,
    },

    #[error("Invalid input parameter: {0}")]
    InvalidParameter(String),
}

/// Kind of a recoverable, per-task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected before execution (incompatible model and input setup).
    Configuration,
    /// Training, prediction or error evaluation failed.
    Execution,
    /// An isolated worker did not report before its deadline.
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "ConfigurationError"),
            Self::Execution => write!(f, "ExecutionError"),
            Self::Timeout => write!(f, "TimeoutError"),
        }
    }
}

/// Diagnostic attached to a task result whose cell stays missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Configuration,
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Execution,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result type alias for PredictSweep operations
pub type PsResult<T> = Result<T, PsError>;

/// Macro for creating invalid-input errors
#[macro_export]
macro_rules! invalid_input {
    ($($arg:tt)*) => {
        $crate::PsError::InvalidInput(format!($($arg)*))
    };
}

/// Macro for creating internal consistency errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::PsError::InternalConsistency(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::PsError::Config(format!($($arg)*))
    };
}
