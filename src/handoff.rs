//! Parent/child handoff ("continue as child")
//!
//! After forking into freshly joined namespaces the parent must not run
//! ahead of the child. It waits on the child; each time the child stops,
//! the parent stops itself and continues the child, so an external
//! controller can step the pair in lock-step.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::sys::{Kernel, NixKernel};

/// Status returned when the child ends in any other way
pub const EXIT_FAILURE: i32 = libc::EXIT_FAILURE;

/// Classified wait status of the tracked child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    Stopped(Signal),
    Exited(i32),
    Signaled(Signal),
    Other,
}

impl ChildEvent {
    fn classify(child: Pid, status: WaitStatus) -> Self {
        match status {
            WaitStatus::Stopped(pid, signal) if pid == child => ChildEvent::Stopped(signal),
            WaitStatus::Exited(pid, code) if pid == child => ChildEvent::Exited(code),
            WaitStatus::Signaled(pid, signal, _) if pid == child => ChildEvent::Signaled(signal),
            _ => ChildEvent::Other,
        }
    }
}

/// Wait for `child` in lock-step and return its exit code
pub fn continue_as_child(child: Pid) -> i32 {
    continue_as_child_with(&NixKernel, child)
}

/// [`continue_as_child`] against an explicit kernel
///
/// If the child is killed by a signal, the same signal is sent to this
/// process after restoring its default disposition and unblocking it;
/// `EXIT_FAILURE` is only returned if that did not kill us.
pub fn continue_as_child_with<K: Kernel>(kernel: &K, child: Pid) -> i32 {
    let parent = kernel.getpid();
    log::info!(
        "Suspending execution of parent process {} in favor of child {}",
        parent,
        child
    );

    let event = loop {
        let status = match kernel.wait_untraced(child) {
            Ok(status) => status,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                log::error!("waitpid on child {} failed: {}", child, e);
                return EXIT_FAILURE;
            }
        };

        match ChildEvent::classify(child, status) {
            ChildEvent::Stopped(signal) => {
                log::debug!("Child {} stopped by {}, stopping parent", child, signal);
                if let Err(e) = kernel.kill(parent, Signal::SIGSTOP) {
                    log::warn!("Failed to stop parent {}: {}", parent, e);
                }
                if let Err(e) = kernel.kill(child, Signal::SIGCONT) {
                    log::warn!("Failed to continue child {}: {}", child, e);
                }
            }
            event => break event,
        }
    };

    match event {
        ChildEvent::Exited(code) => {
            log::info!("Child {} exited with code {}", child, code);
            code
        }
        ChildEvent::Signaled(signal) => {
            log::info!("Child {} killed by {}, re-raising in parent", child, signal);
            // SIGKILL cannot be reset but is fatal anyway
            if let Err(e) = kernel.default_disposition(signal) {
                log::debug!("Could not reset disposition of {}: {}", signal, e);
            }
            if let Err(e) = kernel.kill(parent, signal) {
                log::error!("Failed to re-raise {} in parent: {}", signal, e);
            }
            EXIT_FAILURE
        }
        other => {
            log::warn!("Child {} ended with unexpected status {:?}", child, other);
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::fake::{Call, FakeKernel};

    const PARENT: i32 = 500;
    const CHILD: i32 = 501;

    fn child() -> Pid {
        Pid::from_raw(CHILD)
    }

    fn parent() -> Pid {
        Pid::from_raw(PARENT)
    }

    #[test]
    fn test_two_stops_then_exit() {
        let kernel = FakeKernel::new(PARENT).script([
            Ok(WaitStatus::Stopped(child(), Signal::SIGSTOP)),
            Ok(WaitStatus::Stopped(child(), Signal::SIGTSTP)),
            Ok(WaitStatus::Exited(child(), 3)),
        ]);

        assert_eq!(continue_as_child_with(&kernel, child()), 3);

        let cycle = [
            Call::Kill(parent(), Signal::SIGSTOP),
            Call::Kill(child(), Signal::SIGCONT),
        ];
        let expected: Vec<Call> = cycle.iter().chain(cycle.iter()).cloned().collect();
        assert_eq!(kernel.calls(), expected);
    }

    #[test]
    fn test_exit_without_stops() {
        let kernel = FakeKernel::new(PARENT).script([Ok(WaitStatus::Exited(child(), 0))]);
        assert_eq!(continue_as_child_with(&kernel, child()), 0);
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn test_killed_child_signal_is_reraised() {
        let kernel = FakeKernel::new(PARENT).script([
            Ok(WaitStatus::Stopped(child(), Signal::SIGSTOP)),
            Ok(WaitStatus::Signaled(child(), Signal::SIGTERM, false)),
        ]);

        assert_eq!(continue_as_child_with(&kernel, child()), EXIT_FAILURE);
        let calls = kernel.calls();
        assert_eq!(
            calls[calls.len() - 2..],
            [
                Call::DefaultDisposition(Signal::SIGTERM),
                Call::Kill(parent(), Signal::SIGTERM),
            ]
        );
    }

    #[test]
    fn test_sigkill_is_reraised_without_reset() {
        let kernel = FakeKernel::new(PARENT)
            .script([Ok(WaitStatus::Signaled(child(), Signal::SIGKILL, false))]);

        assert_eq!(continue_as_child_with(&kernel, child()), EXIT_FAILURE);
        assert_eq!(
            kernel.calls(),
            vec![
                Call::DefaultDisposition(Signal::SIGKILL),
                Call::Kill(parent(), Signal::SIGKILL),
            ]
        );
    }

    #[test]
    fn test_interrupted_wait_is_retried() {
        let kernel = FakeKernel::new(PARENT)
            .script([Err(Errno::EINTR), Ok(WaitStatus::Exited(child(), 9))]);
        assert_eq!(continue_as_child_with(&kernel, child()), 9);
    }

    #[test]
    fn test_wait_failure_is_generic_failure() {
        let kernel = FakeKernel::new(PARENT).script([Err(Errno::ECHILD)]);
        assert_eq!(continue_as_child_with(&kernel, child()), EXIT_FAILURE);
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn test_other_status_is_generic_failure() {
        let kernel = FakeKernel::new(PARENT).script([Ok(WaitStatus::Continued(child()))]);
        assert_eq!(continue_as_child_with(&kernel, child()), EXIT_FAILURE);
    }
}
