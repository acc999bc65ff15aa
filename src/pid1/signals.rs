//! Signal configuration for the supervisor
//!
//! The supervisor never installs a signal handler. SIGCHLD stays blocked and
//! is picked up with `sigtimedwait`, so the whole loop runs as ordinary
//! sequential code:
//! - `configure()`: block SIGCHLD, remember the previous mask and the
//!   SIGTTIN/SIGTTOU dispositions
//! - `wait()`: timed synchronous wait for the blocked set
//! - `restore()`: put everything back (also usable in a forked child)

use nix::errno::Errno;
use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};
use nix::sys::time::TimeSpec;
use std::mem::MaybeUninit;
use std::time::Duration;

use crate::InitError;

/// Snapshot of the signal state in effect before supervision began
///
/// Returned by [`SignalConfig::configure`] and required by
/// [`SignalConfig::restore`]; the mask and dispositions are process state,
/// so holding the token is what makes the dependency explicit.
#[derive(Clone)]
pub struct SignalConfig {
    /// Signals consumed through `sigtimedwait`
    wait_set: SigSet,
    /// Mask in effect before `configure()`
    saved_mask: SigSet,
    sigttin_action: libc::sigaction,
    sigttou_action: libc::sigaction,
}

impl SignalConfig {
    /// Block SIGCHLD for synchronous delivery and snapshot the old state
    pub fn configure() -> Result<Self, InitError> {
        let sigttin_action = current_action(Signal::SIGTTIN)?;
        let sigttou_action = current_action(Signal::SIGTTOU)?;

        let mut wait_set = SigSet::empty();
        wait_set.add(Signal::SIGCHLD);

        let mut saved_mask = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_SETMASK, Some(&wait_set), Some(&mut saved_mask))
            .map_err(|source| InitError::Signal {
                op: "sigprocmask",
                source,
            })?;

        log::debug!("Signal mask configured, SIGCHLD is now waited for synchronously");

        Ok(Self {
            wait_set,
            saved_mask,
            sigttin_action,
            sigttou_action,
        })
    }

    /// Reinstate the original mask and SIGTTIN/SIGTTOU dispositions
    pub fn restore(&self) -> Result<(), InitError> {
        self.reinstate()
            .map_err(|(op, source)| InitError::Signal { op, source })?;
        log::debug!("Restored original signal mask and dispositions");
        Ok(())
    }

    /// Variant of [`restore`](Self::restore) for `pre_exec` hooks
    ///
    /// Only calls async-signal-safe functions and does not log.
    pub fn restore_in_child(&self) -> std::io::Result<()> {
        self.reinstate().map_err(|(_, errno)| errno.into())
    }

    /// Wait up to `timeout` for a signal of the configured set
    ///
    /// Returns `Ok(None)` on timeout or interruption. SIGCHLD is the only
    /// signal this supervisor acts on; anything else is fatal.
    pub fn wait(&self, timeout: Duration) -> Result<Option<Signal>, InitError> {
        let ts = TimeSpec::from(timeout);
        let mut info = MaybeUninit::<libc::siginfo_t>::zeroed();

        // SAFETY: wait_set and ts outlive the call, info is writable.
        let res =
            unsafe { libc::sigtimedwait(self.wait_set.as_ref(), info.as_mut_ptr(), ts.as_ref()) };

        match Errno::result(res) {
            Ok(signo) => classify(signo),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(None),
            Err(source) => Err(InitError::Signal {
                op: "sigtimedwait",
                source,
            }),
        }
    }

    fn reinstate(&self) -> Result<(), (&'static str, Errno)> {
        sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.saved_mask), None)
            .map_err(|e| ("sigprocmask", e))?;
        set_action(Signal::SIGTTIN, &self.sigttin_action).map_err(|e| ("sigaction", e))?;
        set_action(Signal::SIGTTOU, &self.sigttou_action).map_err(|e| ("sigaction", e))?;
        Ok(())
    }
}

/// Map a delivered signal number to the supervisor's policy
fn classify(signo: libc::c_int) -> Result<Option<Signal>, InitError> {
    match Signal::try_from(signo) {
        Ok(Signal::SIGCHLD) => {
            log::debug!("Received SIGCHLD");
            Ok(Some(Signal::SIGCHLD))
        }
        _ => Err(InitError::UnexpectedSignal(signo)),
    }
}

/// Read the current disposition of `signal` without changing it
fn current_action(signal: Signal) -> Result<libc::sigaction, InitError> {
    let mut action = MaybeUninit::<libc::sigaction>::zeroed();

    // SAFETY: a null new action makes sigaction a pure query.
    let res = unsafe {
        libc::sigaction(signal as libc::c_int, std::ptr::null(), action.as_mut_ptr())
    };
    Errno::result(res).map_err(|source| InitError::Signal {
        op: "sigaction",
        source,
    })?;

    // SAFETY: sigaction succeeded and filled the struct.
    Ok(unsafe { action.assume_init() })
}

fn set_action(signal: Signal, action: &libc::sigaction) -> Result<(), Errno> {
    // SAFETY: action was produced by a successful sigaction query.
    let res = unsafe { libc::sigaction(signal as libc::c_int, action, std::ptr::null_mut()) };
    Errno::result(res).map(drop)
}
