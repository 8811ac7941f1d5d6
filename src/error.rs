use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Rate limits, connection resets and other failures worth retrying.
    #[error("transient failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// Failures that will not resolve on their own: invalid names, denied
    /// permissions, malformed provider payloads.
    #[error("permanent failure during {operation}: {message}")]
    Permanent { operation: String, message: String },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("step {step} failed for unit {unit}: {source}")]
    StepFailed {
        step: &'static str,
        unit: String,
        #[source]
        source: Box<Error>,
    },

    #[error("quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("no open billing account available")]
    NoBillingAccount,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Permanent {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the retry executor should attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// The failing step name, when this error came out of the sequencer.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            Error::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
