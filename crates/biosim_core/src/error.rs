use thiserror::Error;

/// Failure modes of a single integration, fit, or configuration load.
///
/// Every error is local to the call that produced it; no partial trajectory or
/// fit is returned alongside it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("numerical instability at t = {t}: {message}")]
    NumericalInstability { t: f64, message: String },

    #[error("step limit of {max_steps} exceeded at t = {t}")]
    StepLimitExceeded { max_steps: usize, t: f64 },

    #[error("convergence failure: {0}")]
    ConvergenceFailure(String),

    #[error("insufficient data: {observations} observations for {parameters} parameters")]
    InsufficientData {
        observations: usize,
        parameters: usize,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub(crate) fn unstable(t: f64, message: impl Into<String>) -> Self {
        Self::NumericalInstability {
            t,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
