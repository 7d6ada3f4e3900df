//! # Public error stream returned by [`Runner::run`](crate::Runner::run).
//!
//! The stream yields every error the run produced and closes exactly once, when every
//! supervised task has wound down (or the run was aborted). Draining it to `None` is
//! the way to learn that the process group has fully exited.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::RunError;

/// Receiving end of a run's errors.
///
/// ## Example
/// ```no_run
/// # async fn demo(mut runner: procvisor::Runner<()>) {
/// let mut errors = runner.run(());
/// while let Some(err) = errors.recv().await {
///     eprintln!("{err}");
/// }
/// // every process has exited
/// # }
/// ```
#[derive(Debug)]
pub struct ErrorStream {
    rx: mpsc::UnboundedReceiver<RunError>,
}

impl ErrorStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<RunError>) -> Self {
        Self { rx }
    }

    /// A stream that yields `err` and then closes.
    pub(crate) fn single(err: RunError) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(err);
        Self::new(rx)
    }

    /// Receives the next error; `None` once the run is over.
    pub async fn recv(&mut self) -> Option<RunError> {
        self.rx.recv().await
    }

    /// Drains the stream to closure, collecting every error.
    pub async fn collect_all(mut self) -> Vec<RunError> {
        let mut out = Vec::new();
        while let Some(err) = self.rx.recv().await {
            out.push(err);
        }
        out
    }
}

impl Stream for ErrorStream {
    type Item = RunError;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn single_yields_then_closes() {
        let mut s = ErrorStream::single(RunError::AlreadyStarted);
        assert!(matches!(s.next().await, Some(RunError::AlreadyStarted)));
        assert!(s.next().await.is_none());
    }
}
