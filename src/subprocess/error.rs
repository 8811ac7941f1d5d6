use std::time::Duration;

use crate::error::Error;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("process timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl ProcessError {
    /// Classify a runner-level failure for a named provider operation.
    ///
    /// A missing binary or a mock mismatch will never heal on retry; timeouts
    /// and IO hiccups are worth another attempt.
    pub fn into_provider_error(self, operation: &str) -> Error {
        match self {
            ProcessError::CommandNotFound(cmd) => {
                Error::permanent(operation, format!("command not found: {cmd}"))
            }
            ProcessError::MockExpectationNotMet(msg) => Error::permanent(operation, msg),
            ProcessError::Timeout(duration) => {
                Error::transient(operation, format!("timed out after {duration:?}"))
            }
            ProcessError::Io(e) => Error::transient(operation, e.to_string()),
        }
    }
}
