//! The supervise loop
//!
//! Two states cycle until the main child is known to have exited:
//! Waiting (timed wait for SIGCHLD) and Reaping (drain all zombies).

use nix::unistd::Pid;
use std::time::Duration;

use super::reaper::{ChildExit, ReapOutcome, ZombieReaper};
use super::signals::SignalConfig;
use crate::InitError;

/// Upper bound on one Waiting state, so state is reconsidered periodically
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Init-like supervisor for the subtree rooted at one main child
pub struct Supervisor<'a> {
    signals: &'a SignalConfig,
    reaper: ZombieReaper,
    timeout: Duration,
}

impl<'a> Supervisor<'a> {
    /// Supervise `main_pid` using an already configured signal state
    pub fn new(signals: &'a SignalConfig, main_pid: Pid) -> Self {
        Self {
            signals,
            reaper: ZombieReaper::new(main_pid),
            timeout: WAIT_TIMEOUT,
        }
    }

    /// Override the Waiting timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run until the main child has exited and return its exit code
    ///
    /// Reaping also runs after a timeout, which covers a SIGCHLD that was
    /// consumed elsewhere (e.g. by another thread that does not block it).
    pub fn run(mut self) -> Result<i32, InitError> {
        log::info!(
            "Supervising main child {} (timeout {:?})",
            self.reaper.main_pid(),
            self.timeout
        );

        loop {
            if self.signals.wait(self.timeout)?.is_none() {
                log::trace!("No signal within {:?}", self.timeout);
            }

            if let Some(code) = self.step()? {
                log::info!("Exiting: main child has exited");
                return Ok(code);
            }
        }
    }

    /// One Reaping pass followed by the termination check
    pub fn step(&mut self) -> Result<Option<i32>, InitError> {
        match self.reaper.reap_all()? {
            ReapOutcome::Drained { reaped } if reaped > 0 => {
                log::debug!("Reaped {} process(es)", reaped);
            }
            ReapOutcome::NoChildren { .. } if self.reaper.exit() == ChildExit::Pending => {
                log::debug!("No children left but main child not seen yet");
            }
            _ => {}
        }

        match self.reaper.exit() {
            ChildExit::Exited(code) => Ok(Some(code)),
            ChildExit::Pending => Ok(None),
        }
    }
}
