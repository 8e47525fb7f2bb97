//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for termination signals (SIGTERM, SIGINT, SIGUSR1, SIGUSR2)
//! - Report which one arrived so the caller can run the shutdown path
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Non-unix targets only see Ctrl+C

/// Wait until the process is asked to terminate. Returns the signal name.
#[cfg(unix)]
pub async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;

    let name = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
        _ = usr1.recv() => "SIGUSR1",
        _ = usr2.recv() => "SIGUSR2",
    };
    tracing::info!(signal = name, "Shutdown signal received");
    Ok(name)
}

/// Wait until the process is asked to terminate. Returns the signal name.
#[cfg(not(unix))]
pub async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl_c", "Shutdown signal received");
    Ok("ctrl_c")
}
