//! Signal handling and engine teardown.
//!
//! The metadata engine may own a child process, so it must be closed on
//! every exit path: normal completion, Ctrl-C and SIGTERM. [`EngineGuard`]
//! makes that close happen exactly once no matter which path gets there
//! first.

use crate::metadata::{MetadataEngine, MetadataError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status after an interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

pub struct EngineGuard {
    engine: Arc<dyn MetadataEngine>,
    closed: AtomicBool,
}

impl EngineGuard {
    pub fn new(engine: Arc<dyn MetadataEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            closed: AtomicBool::new(false),
        })
    }

    /// Close the engine. Later calls do nothing.
    pub fn close(&self) -> Result<(), MetadataError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(engine = self.engine.name(), "closing metadata engine");
        self.engine.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Close the engine and exit as soon as a signal arrives.
///
/// For commands with no graceful stop of their own (sync). Must be called
/// inside a tokio runtime.
pub fn exit_on_signal(guard: Arc<EngineGuard>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        if let Err(e) = guard.close() {
            tracing::warn!(error = %e, "closing metadata engine failed");
        }
        std::process::exit(INTERRUPTED_EXIT_CODE);
    });
}
