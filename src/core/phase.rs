//! # Run one lifecycle call under a deadline.
//!
//! Every `init`, `finalize` and bounded `stop` call goes through [`race`]: the call is
//! spawned as its own task and raced against an optional timeout and an optional
//! abort token.
//!
//! ```text
//! spawn(call) ─┬─ completes first ─► Outcome::Done(value)
//!              ├─ task panicked    ─► Outcome::Panicked
//!              ├─ abort cancelled  ─► Outcome::Aborted
//!              └─ timeout elapsed  ─► Outcome::TimedOut(timeout)
//! ```
//!
//! ## Rules
//! - A call that loses the race is **abandoned**, never killed: its task keeps running
//!   and its result is dropped when it eventually completes.
//! - Completion wins ties (the select is biased towards the call).

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::ClockRef;

/// Result of racing one call.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    /// The call completed.
    Done(T),
    /// The call's task panicked (or was cancelled by runtime shutdown).
    Panicked,
    /// The abort token fired first.
    Aborted,
    /// The timeout elapsed first.
    TimedOut(Duration),
}

/// Spawns `call` and waits for it, the timeout, or the abort token.
pub(crate) async fn race<F, T>(
    call: F,
    clock: &ClockRef,
    timeout: Option<Duration>,
    abort: Option<&CancellationToken>,
) -> Outcome<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(call);

    let deadline = async {
        match timeout {
            Some(d) => {
                clock.sleep(d).await;
                d
            }
            None => std::future::pending::<Duration>().await,
        }
    };
    let aborted = async {
        match abort {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        joined = handle => match joined {
            Ok(value) => Outcome::Done(value),
            Err(_) => Outcome::Panicked,
        },
        _ = aborted => Outcome::Aborted,
        d = deadline => Outcome::TimedOut(d),
    }
}
