use thiserror::Error;

/// Engine failure taxonomy. Callers match on variants, never on message text.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Series construction rejected a bar. `index` is the first offending bar.
    #[error("malformed price series at bar {index}: {reason}")]
    MalformedSeries { index: usize, reason: String },

    /// A strategy or engine parameter failed structural validation.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Strategy id not present in the registry.
    #[error("unknown strategy '{id}' (valid: {valid})")]
    UnknownStrategy { id: String, valid: String },

    /// Optimization metric name not recognized.
    #[error("unknown optimization metric '{name}'")]
    UnknownMetric { name: String },

    /// The resolved window holds fewer bars than the strategy needs.
    #[error("insufficient data: strategy needs {required} bars, window has {available}")]
    InsufficientData { required: usize, available: usize },

    /// Start/end dates do not select a usable window.
    #[error("invalid date range ({start} .. {end}): {reason}")]
    InvalidDateRange {
        start: String,
        end: String,
        reason: String,
    },

    /// Signal series is not aligned 1:1 with the price series.
    #[error("signal series has {signals} entries for {bars} bars")]
    SignalMismatch { signals: usize, bars: usize },

    /// Every combination in the optimization grid was structurally invalid.
    #[error("no valid parameter combinations for strategy '{strategy}'")]
    NoValidParameters { strategy: String },

    /// Every config in a comparison failed; carries one reason per strategy.
    #[error("all strategies failed: {}", format_failures(.failures))]
    AllStrategiesFailed { failures: Vec<(String, String)> },

    /// No optimization job is registered for the strategy.
    #[error("no optimization job found for strategy '{strategy}'")]
    JobNotFound { strategy: String },

    /// An optimization job for the strategy is still running.
    #[error("an optimization job for strategy '{strategy}' is already running")]
    JobAlreadyRunning { strategy: String },

    /// Snapshot/bar-file persistence failure.
    #[error("snapshot error: {reason}")]
    Snapshot { reason: String },
}

impl EngineError {
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine tag for the wire error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::MalformedSeries { .. } => "malformed_series",
            EngineError::InvalidParameter { .. } => "invalid_parameter",
            EngineError::UnknownStrategy { .. } => "unknown_strategy",
            EngineError::UnknownMetric { .. } => "unknown_metric",
            EngineError::InsufficientData { .. } => "insufficient_data",
            EngineError::InvalidDateRange { .. } => "invalid_date_range",
            EngineError::SignalMismatch { .. } => "signal_mismatch",
            EngineError::NoValidParameters { .. } => "no_valid_parameters",
            EngineError::AllStrategiesFailed { .. } => "all_strategies_failed",
            EngineError::JobNotFound { .. } => "job_not_found",
            EngineError::JobAlreadyRunning { .. } => "job_already_running",
            EngineError::Snapshot { .. } => "snapshot_error",
        }
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(id, reason)| format!("{}: {}", id, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type EngineResult<T> = Result<T, EngineError>;
