//! Error types for lock session operations

use std::time::Duration;

use crate::session::SessionState;

/// Errors that can occur while driving a maintenance lock session
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("unexpected return code {status} when {action} (expected {expected})")]
    Rest {
        action: &'static str,
        expected: u16,
        status: u16,
    },

    #[error("cannot {operation} while session is {state}")]
    State {
        operation: &'static str,
        state: SessionState,
    },

    #[error("percentage {percentage} out of range 1..=99")]
    OutOfRange { percentage: i32 },

    #[error("percentage {percentage} lower than before ({current})")]
    Regression { percentage: i32, current: u8 },

    #[error("invalid response body when {action}: {source}")]
    Decode {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("subsystems not drained after {polls} polls in {elapsed:?}")]
    DrainTimeout { elapsed: Duration, polls: u32 },

    #[error("acquisition cancelled")]
    Cancelled,
}

/// Coarse classification of a [`LockError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Rest,
    State,
    Range,
    Decode,
    Timeout,
    Cancelled,
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::Connection(_) => ErrorKind::Connection,
            LockError::Rest { .. } => ErrorKind::Rest,
            LockError::State { .. } => ErrorKind::State,
            LockError::OutOfRange { .. } | LockError::Regression { .. } => ErrorKind::Range,
            LockError::Decode { .. } => ErrorKind::Decode,
            LockError::DrainTimeout { .. } => ErrorKind::Timeout,
            LockError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LockError::Rest {
            action: "initiating lock",
            expected: 202,
            status: 409,
        };
        assert_eq!(
            err.to_string(),
            "unexpected return code 409 when initiating lock (expected 202)"
        );

        let err = LockError::State {
            operation: "set progress",
            state: SessionState::Unlocked,
        };
        assert_eq!(err.to_string(), "cannot set progress while session is unlocked");

        let err = LockError::OutOfRange { percentage: 100 };
        assert_eq!(err.to_string(), "percentage 100 out of range 1..=99");

        let err = LockError::Regression {
            percentage: 10,
            current: 20,
        };
        assert_eq!(err.to_string(), "percentage 10 lower than before (20)");

        assert_eq!(LockError::Cancelled.to_string(), "acquisition cancelled");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            LockError::OutOfRange { percentage: 0 }.kind(),
            ErrorKind::Range
        );
        assert_eq!(
            LockError::Regression {
                percentage: 1,
                current: 2
            }
            .kind(),
            ErrorKind::Range
        );
        assert_eq!(
            LockError::DrainTimeout {
                elapsed: Duration::from_secs(1),
                polls: 3
            }
            .kind(),
            ErrorKind::Timeout
        );

        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = LockError::Decode {
            action: "initiating lock",
            source: decode,
        };
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
