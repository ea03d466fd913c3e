//! Shutdown hooks that release a session's remote task
//!
//! Two ways to tie a session to the life of the process:
//!
//! - [`install`] watches for Ctrl-C / `SIGTERM` and runs
//!   [`PipelineSession::cleanup`] when one arrives.
//! - [`CleanupGuard`] releases the task when the owning scope ends, either
//!   explicitly via [`CleanupGuard::release`] or best-effort on drop.

use crate::session::PipelineSession;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Signal that ended the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl-C / `SIGINT`
    Interrupt,
    /// `SIGTERM`
    Terminate,
}

impl ShutdownSignal {
    /// Conventional exit status for a process ended by this signal
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Interrupt => 130,
            Self::Terminate => 143,
        }
    }
}

/// Handle to a running signal watcher
///
/// Dropping the hook stops watching.
pub struct ShutdownHook {
    task: JoinHandle<Option<ShutdownSignal>>,
}

impl ShutdownHook {
    /// Resolve once a signal arrived and cleanup finished
    ///
    /// Returns `None` if the watcher could not listen for signals.
    pub async fn wait(&mut self) -> Option<ShutdownSignal> {
        (&mut self.task).await.ok().flatten()
    }

    /// Stop watching for signals
    pub fn disarm(self) {
        self.task.abort();
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Clean up `session` when the process receives Ctrl-C or `SIGTERM`
///
/// Must be called inside a tokio runtime.
pub fn install(session: Arc<PipelineSession>) -> ShutdownHook {
    install_with(session, wait_for_signal())
}

/// Clean up `session` when `trigger` resolves to a signal
pub fn install_with<F>(session: Arc<PipelineSession>, trigger: F) -> ShutdownHook
where
    F: Future<Output = Option<ShutdownSignal>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let Some(signal) = trigger.await else {
            return None;
        };
        tracing::info!(signal = ?signal, "Shutdown signal received, releasing pipeline");
        session.cleanup().await;
        Some(signal)
    });
    ShutdownHook { task }
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM, watching Ctrl-C only");
            return interrupt().await;
        }
    };

    tokio::select! {
        signal = interrupt() => signal,
        _ = terminate.recv() => Some(ShutdownSignal::Terminate),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<ShutdownSignal> {
    interrupt().await
}

async fn interrupt() -> Option<ShutdownSignal> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some(ShutdownSignal::Interrupt),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            None
        }
    }
}

/// Scoped owner of a session's remote task
///
/// Call [`release`](Self::release) to tear the task down and wait for it.
/// If the guard is dropped instead while a task is still launched, cleanup
/// is spawned onto the current tokio runtime without waiting; with no
/// runtime available only a warning is logged.
pub struct CleanupGuard {
    session: Arc<PipelineSession>,
    released: bool,
}

impl CleanupGuard {
    pub fn new(session: Arc<PipelineSession>) -> Self {
        Self {
            session,
            released: false,
        }
    }

    pub fn session(&self) -> &Arc<PipelineSession> {
        &self.session
    }

    /// Tear down the task now and disarm the drop hook
    pub async fn release(mut self) {
        self.session.cleanup().await;
        self.released = true;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Some(handle) = self.session.try_handle() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(token = %handle.token, "Guard dropped, releasing pipeline in background");
                let session = self.session.clone();
                runtime.spawn(async move { session.cleanup().await });
            }
            Err(_) => {
                tracing::warn!(
                    token = %handle.token,
                    kind = %handle.kind,
                    "No async runtime to release pipeline; it stays running until it expires"
                );
            }
        }
    }
}
