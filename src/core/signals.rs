//! # Cross-platform OS termination signals.
//!
//! [`os_signals`] turns the process' termination signals into a stream that yields
//! once per signal received. The watcher counts them: the first requests a graceful
//! shutdown, the second an abort.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use futures::StreamExt;
use futures::stream::{self, BoxStream};

/// Stream yielding `()` once per termination signal.
pub type SignalStream = BoxStream<'static, ()>;

/// Registers termination signal listeners.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub(crate) fn os_signals() -> std::io::Result<SignalStream> {
    use tokio::signal::unix::{SignalKind, signal};

    let sigint = signal(SignalKind::interrupt())?;
    let sigterm = signal(SignalKind::terminate())?;

    let signals = stream::unfold((sigint, sigterm), |(mut sigint, mut sigterm)| async move {
        let got = tokio::select! {
            s = sigint.recv() => s,
            s = sigterm.recv() => s,
        };
        got.map(|()| ((), (sigint, sigterm)))
    });
    Ok(signals.boxed())
}

/// Registers termination signal listeners.
///
/// Returns `Err` if signal registration fails.
#[cfg(not(unix))]
pub(crate) fn os_signals() -> std::io::Result<SignalStream> {
    let signals = stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    });
    Ok(signals.boxed())
}
