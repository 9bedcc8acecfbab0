// MIT License - Copyright (c) 2015-2017 Nikishin Alexander
// Rust translation

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::Result;

/// The adapter's prompt character, marking the end of a response.
pub const TERMINATOR: char = '>';

/// The single in-flight request.
///
/// Exists only while the connection is `Transmitting`. Holds the response
/// text accumulated so far, the reply channel back to the `send` caller,
/// and the handle of the active timeout timer.
///
/// `finish` consumes the value, so a request can only ever resolve once;
/// whichever of terminator, timeout, fatal transport event, or explicit
/// close happens first takes the request out of the worker and finishes it.
pub(crate) struct PendingRequest {
    response: String,
    reply: oneshot::Sender<Result<String>>,
    timer: JoinHandle<()>,
}

impl PendingRequest {
    pub(crate) fn new(reply: oneshot::Sender<Result<String>>, timer: JoinHandle<()>) -> Self {
        Self {
            response: String::new(),
            reply,
            timer,
        }
    }

    /// Append a decoded chunk to the accumulated response.
    ///
    /// Returns true once the response ends with the terminator character.
    pub(crate) fn push_chunk(&mut self, chunk: &str) -> bool {
        self.response.push_str(chunk);
        self.response.ends_with(TERMINATOR)
    }

    /// Take the full accumulated response, terminator included.
    pub(crate) fn take_response(&mut self) -> String {
        std::mem::take(&mut self.response)
    }

    /// Resolve the request: cancel the timer and deliver the result to the
    /// caller. A caller that gave up awaiting is not an error.
    pub(crate) fn finish(self, result: Result<String>) {
        self.timer.abort();
        if self.reply.send(result).is_err() {
            debug!("send caller went away before the request resolved");
        }
    }
}
