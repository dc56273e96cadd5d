//! Error types for the remote-control engine

use std::time::Duration;
use thiserror::Error;

use crate::mirror::Channel;

/// Failures reported by a [`Transport`](crate::transport::Transport)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// Opening the connection failed
    #[error("failed to connect to {address}: {reason}")]
    Connection { address: String, reason: String },

    /// A call was attempted with no live connection
    #[error("not connected")]
    Disconnected,

    /// The server answered with an error, or with a response of the wrong shape
    #[error("{request} failed: {message}")]
    Protocol {
        request: &'static str,
        message: String,
    },

    /// No response within the configured call timeout
    #[error("{request} timed out after {elapsed:?}")]
    Timeout {
        request: &'static str,
        elapsed: Duration,
    },
}

/// An event or selection that does not fit the mirrored state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("source '{source_name}' not found in scene '{scene}'")]
    UnknownSource { scene: String, source_name: String },

    #[error("selection index {index} out of range for {len} sources")]
    SelectionOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("no {0} input is configured on the server")]
    NoAudioInput(Channel),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
