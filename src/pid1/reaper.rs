//! Zombie process reaping for the supervisor
//!
//! Orphans are reparented to us (PID 1 or a subreaper), so we must call
//! wait() to clean them up. SIGCHLD coalesces: one pending signal can stand
//! for many exits, so every pass drains until nothing is reapable.

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::InitError;

/// Information about a reaped process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapedProcess {
    pub pid: i32,
    pub status: WaitResult,
}

/// Exit status of a reaped process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Process exited normally with code
    Exited(i32),
    /// Process killed by signal
    Signaled(i32),
    /// Unknown status
    Unknown,
}

impl WaitResult {
    fn from_wait_status(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(_, code) => WaitResult::Exited(code),
            WaitStatus::Signaled(_, signal, _) => WaitResult::Signaled(signal as i32),
            _ => WaitResult::Unknown,
        }
    }

    /// Exit code a shell would report for this status
    ///
    /// Death by signal N maps to 128 + N.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            WaitResult::Exited(code) => Some(code),
            WaitResult::Signaled(signal) => Some(128 + signal),
            WaitResult::Unknown => None,
        }
    }
}

/// What is known about the tracked main child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Main child has not been reaped yet
    Pending,
    /// Main child was reaped with this exit code
    Exited(i32),
}

/// Result of one draining pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Children remain but none is reapable right now
    Drained { reaped: usize },
    /// waitpid reported ECHILD: no children at all
    NoChildren { reaped: usize },
}

impl ReapOutcome {
    /// Number of processes collected during the pass
    pub fn reaped(&self) -> usize {
        match *self {
            ReapOutcome::Drained { reaped } | ReapOutcome::NoChildren { reaped } => reaped,
        }
    }
}

/// Zombie process reaper
///
/// Reaps every child and remembers the exit code of the main one.
/// Any other reaped pid is a side descendant and does not end supervision.
#[derive(Debug)]
pub struct ZombieReaper {
    main_pid: Pid,
    exit: ChildExit,
}

impl ZombieReaper {
    /// Create a reaper tracking `main_pid`
    pub fn new(main_pid: Pid) -> Self {
        Self {
            main_pid,
            exit: ChildExit::Pending,
        }
    }

    /// The tracked main child
    pub fn main_pid(&self) -> Pid {
        self.main_pid
    }

    /// Current knowledge about the main child
    pub fn exit(&self) -> ChildExit {
        self.exit
    }

    /// Reap all available zombie processes (non-blocking)
    pub fn reap_all(&mut self) -> Result<ReapOutcome, InitError> {
        let mut reaped = 0;

        loop {
            // Wait for any child, non-blocking
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    log::trace!("No child to reap");
                    return Ok(ReapOutcome::Drained { reaped });
                }
                Ok(status) => {
                    let Some(pid) = status.pid() else {
                        continue;
                    };
                    self.record(ReapedProcess {
                        pid: pid.as_raw(),
                        status: WaitResult::from_wait_status(status),
                    });
                    reaped += 1;
                }
                Err(Errno::ECHILD) => {
                    log::trace!("No child to wait for");
                    return Ok(ReapOutcome::NoChildren { reaped });
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(InitError::Wait(e)),
            }
        }
    }

    /// Account for one collected process
    fn record(&mut self, process: ReapedProcess) {
        log::debug!("Reaped PID {} ({:?})", process.pid, process.status);

        if process.pid != self.main_pid.as_raw() {
            return;
        }

        match process.status.exit_code() {
            Some(code) => {
                log::info!("Main child {} exited with code {}", process.pid, code);
                self.exit = ChildExit::Exited(code);
            }
            None => log::warn!("Main child {} reaped with unknown status", process.pid),
        }
    }
}
