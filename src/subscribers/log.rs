//! # Logging subscriber built on `tracing`.
//!
//! [`LogWriter`] renders each lifecycle event as one `tracing` record under the
//! `procvisor` target. Install any `tracing` subscriber to see the output.
//!
//! ## Output
//! ```text
//! INFO  initializing db
//! INFO  starting http priority=5
//! INFO  stopping http
//! WARN  shutting down (signal)
//! ERROR error reported name=http reason="could not start http: bind failed"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that writes events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let name = e.name.as_deref().unwrap_or_default();
        let reason = e.reason.as_deref().unwrap_or_default();
        match e.kind {
            EventKind::InitializerStarting => {
                info!(target: "procvisor", timeout_ms = e.timeout_ms, "initializing {name}");
            }
            EventKind::InitializerReady => {
                debug!(target: "procvisor", "initialized {name}");
            }
            EventKind::ProcessInitializing => {
                info!(target: "procvisor", priority = e.priority, timeout_ms = e.timeout_ms, "initializing {name}");
            }
            EventKind::ProcessStarting => {
                info!(target: "procvisor", priority = e.priority, "starting {name}");
            }
            EventKind::ProcessExited => {
                if e.reason.is_some() {
                    warn!(target: "procvisor", reason, "{name} exited");
                } else {
                    info!(target: "procvisor", "{name} exited");
                }
            }
            EventKind::ProcessStopping => {
                info!(target: "procvisor", timeout_ms = e.timeout_ms, "stopping {name}");
            }
            EventKind::FinalizerStarting => {
                info!(target: "procvisor", "finalizing {name}");
            }
            EventKind::ShutdownRequested => {
                warn!(target: "procvisor", "shutting down ({reason})");
            }
            EventKind::AbortRequested => {
                warn!(target: "procvisor", "aborting ({reason})");
            }
            EventKind::SignalReceived => {
                info!(target: "procvisor", "received {reason} termination signal");
            }
            EventKind::ErrorReported => {
                error!(target: "procvisor", name, reason, "error reported");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
