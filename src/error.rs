//! Error types for gateway operations.
//!
//! Codec-level errors ([`crate::protocol::DecodeError`]) are absorbed inside
//! the connection session and never surface past it. Everything the caller
//! can observe is a [`GatewayError`]: link failures are fatal to their
//! session, timeouts are normal reportable outcomes, and parameter failures
//! carry enough context to decide on a retry.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::params::ParameterSet;
use crate::types::CommandId;

/// Result type alias for gateway operations.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Caller-visible error type for gateway operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Reading from or writing to the physical link failed. Fatal to the
    /// owning session, which transitions to `Closed`.
    #[error("link {link}: {source}")]
    Link {
        link: String,
        #[source]
        source: std::io::Error,
    },

    /// The session was already closed when the operation was attempted.
    #[error("session is closed")]
    SessionClosed,

    /// The vehicle is tracked but its session is not live.
    #[error("vehicle {vehicle} is not connected")]
    NotConnected { vehicle: Uuid },

    /// No vehicle with this identifier is tracked.
    #[error("no vehicle with id {vehicle}")]
    NotFound { vehicle: Uuid },

    /// No acknowledgment arrived within the wait window. A normal outcome;
    /// retry policy belongs to the caller.
    #[error("command {command} timed out after {elapsed:?}")]
    CommandTimeout { command: CommandId, elapsed: Duration },

    /// Caller-supplied flight mode name is not a registered mode.
    #[error("unknown flight mode '{name}'")]
    UnknownMode { name: String },

    /// Caller-supplied parameter type tag is not registered.
    #[error("unknown parameter type '{name}'")]
    UnknownParamType { name: String },

    /// Parameter name is empty or longer than the 16-byte wire field.
    #[error("invalid parameter name '{name}'")]
    InvalidParamName { name: String },

    /// The vehicle echoed a different value than the one requested.
    #[error("parameter '{name}' reads back {confirmed}, requested {requested}")]
    ParameterMismatch {
        name: String,
        requested: f32,
        confirmed: f32,
    },

    /// The vehicle never echoed the written parameter inside the confirm
    /// window. Distinct from [`GatewayError::ParameterMismatch`]: the write
    /// may or may not have been applied.
    #[error("parameter '{name}' was not confirmed by the vehicle")]
    ParameterUnconfirmed { name: String },

    /// Fewer distinct parameter names arrived than the vehicle-reported
    /// total before the read window elapsed. Carries everything that was
    /// accumulated so the caller can keep the partial set.
    #[error("parameter read incomplete: {got} of {expected} received")]
    PartialParameterSet {
        got: usize,
        expected: u16,
        partial: ParameterSet,
    },
}

impl GatewayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::CommandTimeout { .. }
                | GatewayError::ParameterUnconfirmed { .. }
                | GatewayError::PartialParameterSet { .. }
        )
    }
}
