// MIT License - Copyright (c) 2015-2017 Nikishin Alexander
// Rust translation of OBDConnectionError.swift

use std::sync::Arc;

/// All errors the connection can report.
///
/// This is a closed taxonomy: every failure path ends in either one of
/// these values delivered to a `send` caller, or a transition to
/// `ConnectionState::Error` carrying one of them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ObdError {
    /// Unexpected socket error with no further detail.
    #[error("unexpected socket error occurred")]
    Unknown,

    /// The transport layer reported an error.
    ///
    /// The cause is shared because the same value is published through the
    /// state-change notification and delivered to a pending `send` caller.
    #[error("stream error: {0}")]
    Stream(#[source] Arc<std::io::Error>),

    /// The connection is not ready to send data.
    #[error("connection is not ready to send data")]
    SendingNotAvailable,

    /// An error occurred while writing to the output stream.
    #[error("an error occurred while writing to the output stream")]
    SendingFailed,

    /// The caller tried to send empty data.
    #[error("trying to send invalid data")]
    InvalidData,

    /// The adapter's response is not valid ASCII text.
    #[error("response is malformed")]
    InvalidResponse,

    /// No terminator arrived within the configured request timeout.
    #[error("request timeout reached")]
    RequestTimeout,

    /// The adapter closed the connection.
    #[error("connection was unexpectedly closed")]
    ConnectionEnded,
}

impl ObdError {
    /// Wrap a transport-layer cause, `Unknown` when the transport did not
    /// supply one.
    pub(crate) fn from_stream_cause(cause: Option<std::io::Error>) -> Self {
        match cause {
            Some(e) => Self::Stream(Arc::new(e)),
            None => Self::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, ObdError>;
