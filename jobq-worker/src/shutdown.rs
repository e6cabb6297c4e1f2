//! Signal-driven stop flag.
//!
//! Each worker process owns one latch; the supervisor relays SIGTERM to the
//! pool and every worker observes the flip at its next loop boundary.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// Install SIGTERM and SIGINT handlers and return a receiver that flips to
/// `true` once either signal arrives.
pub fn latch() -> std::io::Result<watch::Receiver<bool>> {
    let mut term = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            _ = term.recv() => {},
            _ = interrupt.recv() => {},
        };

        tracing::info!("stop signal received, finishing current work");
        let _ = tx.send(true);
    });

    Ok(rx)
}
