//! PID 1 functionality
//!
//! Handles responsibilities of a process acting as init for a subtree:
//! - Signal configuration (SIGCHLD observed synchronously, no handlers)
//! - Zombie process reaping
//! - The supervise loop that propagates the main child's exit code

mod reaper;
mod signals;
mod supervisor;

pub use reaper::{ChildExit, ReapOutcome, ReapedProcess, WaitResult, ZombieReaper};
pub use signals::SignalConfig;
pub use supervisor::{Supervisor, WAIT_TIMEOUT};

use std::process;

use crate::InitError;

/// Check if we are running as PID 1
pub fn is_pid1() -> bool {
    process::id() == 1
}

/// Make this process the subreaper for its descendants
///
/// Orphaned grandchildren are reparented to us instead of to the real
/// init, so the reaper sees them. Pointless when already PID 1.
pub fn become_subreaper() -> Result<(), InitError> {
    if is_pid1() {
        log::debug!("Running as PID 1, subreaper not needed");
        return Ok(());
    }

    nix::sys::prctl::set_child_subreaper(true).map_err(InitError::Subreaper)?;
    log::info!("Registered as child subreaper (pid={})", process::id());
    Ok(())
}
