//! # Watcher: folds every shutdown trigger into two one-shot transitions.
//!
//! ```text
//!   signal listener ──┐  1st signal → Shutdown, 2nd → Abort
//!   error listener  ──┤  error → forward + Shutdown, clean exit → Shutdown unless silent,
//!                     │  reports closed → Shutdown, then close public stream
//!   halt listener   ──┤  Runner::shutdown → Shutdown
//!   timeout listener ─┤  draining for drain_timeout → Abort
//!                     ▼
//!            control channel (capacity 1)
//!                     ▼
//!               control loop ── owns `draining`
//!                     ├─ first Shutdown → latches.shutdown.cancel()
//!                     └─ Abort          → latches.abort.cancel(), loop ends
//! ```
//!
//! ## Rules
//! - Only the control loop reads or writes the draining state.
//! - Both latches are monotone; cancelling twice is a no-op.
//! - The public error stream closes exactly once: when the error listener ends, either
//!   because every supervised task dropped its reporter or because of an abort.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::ClockRef;
use crate::core::signals::SignalStream;
use crate::error::RunError;
use crate::events::{Event, EventKind};
use crate::subscribers::SubscriberSet;

/// The one-shot broadcast states shared by the runner and its tasks.
#[derive(Clone, Debug, Default)]
pub(crate) struct Latches {
    /// Graceful shutdown requested.
    pub(crate) shutdown: CancellationToken,
    /// Stop waiting for anything.
    pub(crate) abort: CancellationToken,
    /// The public error stream has closed.
    pub(crate) done: CancellationToken,
}

impl Latches {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// One entry of the internal report stream.
#[derive(Debug)]
pub(crate) struct Report {
    error: Option<RunError>,
    source: String,
    silent_exit: bool,
}

/// Sending side of the internal report stream, one clone per supervised task.
#[derive(Clone, Debug)]
pub(crate) struct Reporter {
    tx: mpsc::UnboundedSender<Report>,
}

impl Reporter {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Reports a failure; always requests shutdown.
    pub(crate) fn error(&self, err: RunError) {
        let source = err.name().unwrap_or_default().to_string();
        let _ = self.tx.send(Report {
            error: Some(err),
            source,
            silent_exit: false,
        });
    }

    /// Reports a clean exit of `source`.
    pub(crate) fn exited(&self, source: &str, silent_exit: bool) {
        let _ = self.tx.send(Report {
            error: None,
            source: source.to_string(),
            silent_exit,
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Shutdown(&'static str),
    Abort(&'static str),
}

/// Trigger sources and collaborators of one run.
pub(crate) struct Watcher {
    latches: Latches,
    halt: CancellationToken,
    signals: Option<SignalStream>,
    clock: ClockRef,
    drain_timeout: Option<Duration>,
    subs: Arc<SubscriberSet>,
}

impl Watcher {
    pub(crate) fn new(
        latches: Latches,
        halt: CancellationToken,
        signals: Option<SignalStream>,
        clock: ClockRef,
        drain_timeout: Option<Duration>,
        subs: Arc<SubscriberSet>,
    ) -> Self {
        Self {
            latches,
            halt,
            signals,
            clock,
            drain_timeout,
            subs,
        }
    }

    /// Spawns the control loop and the four listeners.
    ///
    /// `reports` is the internal stream fed by the supervision task; `public` is closed
    /// once it is exhausted (or on abort).
    pub(crate) fn watch(
        self,
        reports: mpsc::UnboundedReceiver<Report>,
        public: mpsc::UnboundedSender<RunError>,
    ) {
        let (ctl_tx, ctl_rx) = mpsc::channel::<Control>(1);

        tokio::spawn(control_loop(ctl_rx, self.latches.clone(), Arc::clone(&self.subs)));
        tokio::spawn(error_listener(
            reports,
            public,
            ctl_tx.clone(),
            self.latches.clone(),
            Arc::clone(&self.subs),
        ));
        if let Some(signals) = self.signals {
            tokio::spawn(signal_listener(
                signals,
                ctl_tx.clone(),
                self.latches.clone(),
                Arc::clone(&self.subs),
            ));
        }
        tokio::spawn(halt_listener(self.halt, ctl_tx.clone(), self.latches.clone()));
        tokio::spawn(timeout_listener(
            self.clock,
            self.drain_timeout,
            ctl_tx,
            self.latches,
        ));
    }
}

async fn control_loop(mut rx: mpsc::Receiver<Control>, latches: Latches, subs: Arc<SubscriberSet>) {
    let mut draining = false;
    loop {
        let req = tokio::select! {
            biased;
            req = rx.recv() => req,
            _ = latches.done.cancelled() => None,
        };
        match req {
            Some(Control::Shutdown(trigger)) => {
                if !draining {
                    draining = true;
                    subs.emit(Event::new(EventKind::ShutdownRequested).with_reason(trigger));
                    latches.shutdown.cancel();
                }
            }
            Some(Control::Abort(trigger)) => {
                subs.emit(Event::new(EventKind::AbortRequested).with_reason(trigger));
                latches.abort.cancel();
                break;
            }
            None => break,
        }
    }
}

async fn error_listener(
    mut reports: mpsc::UnboundedReceiver<Report>,
    public: mpsc::UnboundedSender<RunError>,
    ctl: mpsc::Sender<Control>,
    latches: Latches,
    subs: Arc<SubscriberSet>,
) {
    loop {
        let report = tokio::select! {
            biased;
            _ = latches.abort.cancelled() => break,
            report = reports.recv() => report,
        };
        match report {
            Some(Report {
                error: Some(err), ..
            }) => {
                let mut ev = Event::new(EventKind::ErrorReported).with_reason(err.to_string());
                if let Some(name) = err.name() {
                    ev = ev.with_name(name);
                }
                subs.emit(ev);
                let _ = public.send(err);
                let _ = ctl.send(Control::Shutdown("error")).await;
            }
            Some(Report {
                error: None,
                source,
                silent_exit,
            }) => {
                debug!(source = %source, silent_exit, "clean exit reported");
                if !silent_exit {
                    let _ = ctl.send(Control::Shutdown("exited")).await;
                }
            }
            None => {
                let _ = ctl.send(Control::Shutdown("closed")).await;
                break;
            }
        }
    }
    drop(public);
    latches.done.cancel();
}

async fn signal_listener(
    mut signals: SignalStream,
    ctl: mpsc::Sender<Control>,
    latches: Latches,
    subs: Arc<SubscriberSet>,
) {
    let mut seen = 0u32;
    loop {
        let next = tokio::select! {
            _ = latches.done.cancelled() => return,
            next = signals.next() => next,
        };
        if next.is_none() {
            return;
        }
        seen += 1;
        if seen == 1 {
            subs.emit(Event::new(EventKind::SignalReceived).with_reason("first"));
            let _ = ctl.send(Control::Shutdown("signal")).await;
        } else {
            subs.emit(Event::new(EventKind::SignalReceived).with_reason("second"));
            let _ = ctl.send(Control::Abort("signal")).await;
            return;
        }
    }
}

async fn halt_listener(halt: CancellationToken, ctl: mpsc::Sender<Control>, latches: Latches) {
    tokio::select! {
        _ = latches.done.cancelled() => {}
        _ = halt.cancelled() => {
            let _ = ctl.send(Control::Shutdown("halt")).await;
        }
    }
}

async fn timeout_listener(
    clock: ClockRef,
    drain_timeout: Option<Duration>,
    ctl: mpsc::Sender<Control>,
    latches: Latches,
) {
    tokio::select! {
        _ = latches.done.cancelled() => return,
        _ = latches.shutdown.cancelled() => {}
    }
    let Some(timeout) = drain_timeout else {
        return;
    };
    tokio::select! {
        _ = latches.done.cancelled() => {}
        _ = clock.sleep(timeout) => {
            let _ = ctl.send(Control::Abort("timeout")).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::clock::{ManualClock, TokioClock};

    struct Rig {
        latches: Latches,
        halt: CancellationToken,
        reporter: Reporter,
        public: mpsc::UnboundedReceiver<RunError>,
        signal_tx: mpsc::UnboundedSender<()>,
    }

    fn rig(clock: ClockRef, drain: Option<Duration>) -> Rig {
        let latches = Latches::new();
        let halt = CancellationToken::new();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<()>();
        let signals = stream::unfold(signal_rx, |mut rx| async move {
            rx.recv().await.map(|()| ((), rx))
        })
        .boxed();

        let (reporter, reports) = Reporter::channel();
        let (public_tx, public) = mpsc::unbounded_channel();
        Watcher::new(
            latches.clone(),
            halt.clone(),
            Some(signals),
            clock,
            drain,
            Arc::new(SubscriberSet::empty()),
        )
        .watch(reports, public_tx);

        Rig {
            latches,
            halt,
            reporter,
            public,
            signal_tx,
        }
    }

    fn tokio_clock() -> ClockRef {
        Arc::new(TokioClock)
    }

    #[tokio::test]
    async fn error_is_forwarded_and_requests_shutdown() {
        let mut r = rig(tokio_clock(), None);
        r.reporter.error(RunError::InitAborted { name: "db".into() });

        let err = r.public.recv().await.unwrap();
        assert_eq!(err.to_string(), "aborting initialization of db");
        r.latches.shutdown.cancelled().await;
        assert!(!r.latches.abort.is_cancelled());

        drop(r.reporter);
        assert!(r.public.recv().await.is_none());
        r.latches.done.cancelled().await;
    }

    #[tokio::test]
    async fn silent_exit_does_not_request_shutdown() {
        let mut r = rig(tokio_clock(), None);
        r.reporter.exited("cron", true);
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert!(!r.latches.shutdown.is_cancelled());

        r.reporter.exited("http", false);
        r.latches.shutdown.cancelled().await;

        drop(r.reporter);
        assert!(r.public.recv().await.is_none());
    }

    #[tokio::test]
    async fn closing_reports_closes_public_stream() {
        let mut r = rig(tokio_clock(), None);
        drop(r.reporter);
        assert!(r.public.recv().await.is_none());
        assert!(r.latches.shutdown.is_cancelled());
        r.latches.done.cancelled().await;
    }

    #[tokio::test]
    async fn second_signal_aborts() {
        let mut r = rig(tokio_clock(), None);
        r.signal_tx.send(()).unwrap();
        r.latches.shutdown.cancelled().await;
        assert!(!r.latches.abort.is_cancelled());

        r.signal_tx.send(()).unwrap();
        r.latches.abort.cancelled().await;
        // Abort closes the public stream even though a reporter is still alive.
        assert!(r.public.recv().await.is_none());
        drop(r.reporter);
    }

    #[tokio::test]
    async fn repeated_shutdown_requests_are_idempotent() {
        let mut r = rig(tokio_clock(), None);
        r.halt.cancel();
        r.halt.cancel();
        r.reporter.exited("a", false);
        r.reporter.error(RunError::AlreadyStarted);
        r.latches.shutdown.cancelled().await;

        assert!(matches!(r.public.recv().await, Some(RunError::AlreadyStarted)));
        assert!(!r.latches.abort.is_cancelled());
        drop(r.reporter);
        assert!(r.public.recv().await.is_none());
    }

    #[tokio::test]
    async fn drain_timeout_escalates_to_abort() {
        let manual = ManualClock::new();
        let mut r = rig(Arc::new(manual.clone()), Some(Duration::from_secs(10)));
        r.halt.cancel();
        r.latches.shutdown.cancelled().await;

        manual.block_until(1).await;
        manual.advance(Duration::from_secs(9));
        tokio::task::yield_now().await;
        assert!(!r.latches.abort.is_cancelled());

        manual.advance(Duration::from_secs(1));
        r.latches.abort.cancelled().await;
        assert!(r.public.recv().await.is_none());
        drop(r.reporter);
    }
}
