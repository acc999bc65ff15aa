//! Thin seam over the syscalls used by the namespace handoff
//!
//! Production code goes through [`NixKernel`]; tests substitute a
//! recording implementation so orderings can be asserted without
//! privileges or stopping the test process.

use nix::sched::setns;
use nix::sys::signal::{kill, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpid, Pid};
use std::os::fd::BorrowedFd;

use crate::namespace::NamespaceKind;

pub trait Kernel {
    fn getpid(&self) -> Pid;
    /// Blocking wait on one child, also reporting stops
    fn wait_untraced(&self, pid: Pid) -> nix::Result<WaitStatus>;
    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()>;
    /// Make `signal` fatal again: default disposition, unblocked
    fn default_disposition(&self, signal: Signal) -> nix::Result<()>;
    fn setns(&self, fd: BorrowedFd<'_>, kind: NamespaceKind) -> nix::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NixKernel;

impl Kernel for NixKernel {
    fn getpid(&self) -> Pid {
        getpid()
    }

    fn wait_untraced(&self, pid: Pid) -> nix::Result<WaitStatus> {
        waitpid(pid, Some(WaitPidFlag::WUNTRACED))
    }

    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
        kill(pid, signal)
    }

    fn default_disposition(&self, signal: Signal) -> nix::Result<()> {
        // SAFETY: SIG_DFL installs no handler code.
        unsafe { nix::sys::signal::signal(signal, SigHandler::SigDfl) }?;
        let mut set = SigSet::empty();
        set.add(signal);
        set.thread_unblock()
    }

    fn setns(&self, fd: BorrowedFd<'_>, kind: NamespaceKind) -> nix::Result<()> {
        setns(fd, kind.clone_flag())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use nix::errno::Errno;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Kill(Pid, Signal),
        DefaultDisposition(Signal),
        Setns(NamespaceKind),
    }

    /// Scripted kernel: waits are served from a queue, everything else
    /// is recorded.
    pub struct FakeKernel {
        pub pid: Pid,
        pub waits: RefCell<VecDeque<nix::Result<WaitStatus>>>,
        pub calls: RefCell<Vec<Call>>,
        pub fail_setns: Option<NamespaceKind>,
    }

    impl FakeKernel {
        pub fn new(pid: i32) -> Self {
            Self {
                pid: Pid::from_raw(pid),
                waits: RefCell::new(VecDeque::new()),
                calls: RefCell::new(Vec::new()),
                fail_setns: None,
            }
        }

        pub fn script(self, waits: impl IntoIterator<Item = nix::Result<WaitStatus>>) -> Self {
            self.waits.borrow_mut().extend(waits);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }
    }

    impl Kernel for FakeKernel {
        fn getpid(&self) -> Pid {
            self.pid
        }

        fn wait_untraced(&self, _pid: Pid) -> nix::Result<WaitStatus> {
            self.waits.borrow_mut().pop_front().unwrap_or(Err(Errno::ECHILD))
        }

        fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
            self.calls.borrow_mut().push(Call::Kill(pid, signal));
            Ok(())
        }

        fn default_disposition(&self, signal: Signal) -> nix::Result<()> {
            self.calls.borrow_mut().push(Call::DefaultDisposition(signal));
            if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP) {
                return Err(Errno::EINVAL);
            }
            Ok(())
        }

        fn setns(&self, _fd: BorrowedFd<'_>, kind: NamespaceKind) -> nix::Result<()> {
            self.calls.borrow_mut().push(Call::Setns(kind));
            if self.fail_setns == Some(kind) {
                return Err(Errno::EPERM);
            }
            Ok(())
        }
    }
}
