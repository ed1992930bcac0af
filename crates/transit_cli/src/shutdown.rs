use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use console::Term;

/// Global shutdown flag, set by the first Ctrl+C.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if shutdown has been requested.
#[inline]
pub(crate) fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Acquire)
}

/// Request shutdown.
#[inline]
fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::Release);
}

/// Resolve once shutdown has been requested.
pub(crate) async fn requested() {
    while !is_shutdown_requested() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Set up the Ctrl+C handler.
///
/// The first Ctrl+C abandons in-flight requests; the second exits with 130.
pub(crate) fn setup_shutdown_handler() {
    tokio::spawn(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, abandoning in-flight requests...");
            eprintln!("Records already written are kept; re-running transit is safe.");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!(
                "Shutdown requested, abandoning in-flight requests (re-running is safe)"
            );
        }

        request_shutdown();

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install second Ctrl+C handler");
            return;
        }

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}
