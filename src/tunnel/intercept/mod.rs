//! Stream interception: redirecting in-band substreams to caller-supplied
//! byte sinks and sources.
//!
//! Each intercepted stream is keyed by its decimal stream index and carries
//! a single-shot completion signal. The signal fires exactly once, on normal
//! completion, remote error, or cancellation, no matter how many of those
//! race.

mod input;
mod output;

pub use input::InputInterceptingFilter;
pub use output::OutputInterceptingFilter;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::error::Result;

/// Caller-supplied sink receiving the decoded bytes of an intercepted
/// output stream (e.g. the body writer of a download response).
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Caller-supplied source feeding an intercepted input stream (e.g. the
/// body reader of an upload request).
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Receiving end of an intercept's completion signal. Resolves with the
/// intercept's terminal outcome.
pub type CompletionSignal = oneshot::Receiver<Result<()>>;

/// An output substream redirected into a [`ByteSink`].
pub struct InterceptedOutputStream {
    pub(crate) index: String,
    pub(crate) sink: ByteSink,
    done: Option<oneshot::Sender<Result<()>>>,
}

impl InterceptedOutputStream {
    pub(crate) fn new(index: String, sink: ByteSink, done: oneshot::Sender<Result<()>>) -> Self {
        Self {
            index,
            sink,
            done: Some(done),
        }
    }

    /// Deliver the terminal outcome. Later calls are no-ops, which keeps
    /// the exactly-once guarantee under racing close paths.
    pub(crate) fn complete(&mut self, outcome: Result<()>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}

/// An input substream fed from a [`ByteSource`].
pub struct InterceptedInputStream {
    pub(crate) index: String,
    pub(crate) source: ByteSource,
    done: Option<oneshot::Sender<Result<()>>>,
}

impl InterceptedInputStream {
    pub(crate) fn new(index: String, source: ByteSource, done: oneshot::Sender<Result<()>>) -> Self {
        Self {
            index,
            source,
            done: Some(done),
        }
    }

    pub(crate) fn complete(&mut self, outcome: Result<()>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}
