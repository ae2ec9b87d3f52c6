//! Domain error types.

/// Top-level error type for granville.
#[derive(Debug, thiserror::Error)]
pub enum GranvilleError {
    #[error("invalid bar data: {reason}")]
    DataValidation { reason: String },

    #[error("insufficient data: have {bars} bars, need {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error("signal processing failed: {reason}")]
    SignalProcessing { reason: String },

    #[error("backtest failed for {instrument} during {stage}: {reason}")]
    Backtest {
        instrument: String,
        stage: String,
        reason: String,
    },

    #[error("output processing failed for {instrument} during {stage}: {reason}")]
    OutputProcessing {
        instrument: String,
        stage: String,
        reason: String,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GranvilleError {
    pub fn validation(reason: impl Into<String>) -> Self {
        GranvilleError::DataValidation {
            reason: reason.into(),
        }
    }

    pub fn backtest(instrument: &str, stage: &str, reason: impl Into<String>) -> Self {
        GranvilleError::Backtest {
            instrument: instrument.to_string(),
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }

    pub fn output(instrument: &str, stage: &str, reason: impl Into<String>) -> Self {
        GranvilleError::OutputProcessing {
            instrument: instrument.to_string(),
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&GranvilleError> for std::process::ExitCode {
    fn from(err: &GranvilleError) -> Self {
        let code: u8 = match err {
            GranvilleError::Io(_) => 1,
            GranvilleError::ConfigParse { .. }
            | GranvilleError::ConfigMissing { .. }
            | GranvilleError::ConfigInvalid { .. } => 2,
            GranvilleError::DataValidation { .. } | GranvilleError::InsufficientData { .. } => 3,
            GranvilleError::SignalProcessing { .. } => 4,
            GranvilleError::Backtest { .. } | GranvilleError::OutputProcessing { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
