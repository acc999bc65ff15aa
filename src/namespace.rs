//! Namespace attachment
//!
//! Opens `/proc/<pid>/ns/{user,mnt,pid}` of a target process and joins them.
//! Holding the descriptors pins the namespaces, so they stay joinable even
//! if the target exits or moves. Joining is always user, then mount, then
//! pid: the user namespace grants the capabilities the other two joins
//! are checked against.

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sched::CloneFlags;
use nix::sys::stat::Mode;
use nix::unistd::Pid;
use std::fmt;
use std::os::fd::{AsFd, FromRawFd, IntoRawFd, OwnedFd};
use std::path::Path;

use crate::sys::{Kernel, NixKernel};
use crate::InitError;

/// Namespace types handled by [`NamespaceSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    User,
    Mount,
    Pid,
}

impl NamespaceKind {
    /// The only supported join order
    pub const JOIN_ORDER: [NamespaceKind; 3] =
        [NamespaceKind::User, NamespaceKind::Mount, NamespaceKind::Pid];

    /// Entry name under `/proc/<pid>/ns/`
    pub fn proc_name(self) -> &'static str {
        match self {
            NamespaceKind::User => "user",
            NamespaceKind::Mount => "mnt",
            NamespaceKind::Pid => "pid",
        }
    }

    pub fn clone_flag(self) -> CloneFlags {
        match self {
            NamespaceKind::User => CloneFlags::CLONE_NEWUSER,
            NamespaceKind::Mount => CloneFlags::CLONE_NEWNS,
            NamespaceKind::Pid => CloneFlags::CLONE_NEWPID,
        }
    }

    fn label(self) -> &'static str {
        match self {
            NamespaceKind::User => "user",
            NamespaceKind::Mount => "mount",
            NamespaceKind::Pid => "pid",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Owned handles to the user, mount and pid namespaces of one process
///
/// All three are open or the set does not exist. Release them with
/// [`close`](Self::close); dropping an unclosed set still closes the
/// descriptors but logs a warning.
#[derive(Debug)]
pub struct NamespaceSet {
    target: Pid,
    /// Indexed like [`NamespaceKind::JOIN_ORDER`], `None` once closed
    fds: Option<[OwnedFd; 3]>,
}

impl NamespaceSet {
    /// Open the namespaces of `pid` through `/proc`
    pub fn open(pid: Pid) -> Result<Self, InitError> {
        Self::open_at(Path::new("/proc"), pid)
    }

    /// Open the namespaces of `pid` below an alternate procfs root
    ///
    /// On failure every handle opened so far is released before returning.
    pub fn open_at(proc_root: &Path, pid: Pid) -> Result<Self, InitError> {
        let [user, mnt, pid_ns] = NamespaceKind::JOIN_ORDER;
        let fds = [
            open_ns(proc_root, pid, user)?,
            open_ns(proc_root, pid, mnt)?,
            open_ns(proc_root, pid, pid_ns)?,
        ];

        log::debug!("Opened namespace set of pid {}", pid);
        Ok(Self {
            target: pid,
            fds: Some(fds),
        })
    }

    /// Process the namespaces were taken from
    pub fn target(&self) -> Pid {
        self.target
    }

    pub fn is_open(&self) -> bool {
        self.fds.is_some()
    }

    /// Join user, mount and pid namespace, in that order
    pub fn connect_all(&self) -> Result<(), InitError> {
        self.connect_all_with(&NixKernel)
    }

    pub fn connect_all_with<K: Kernel>(&self, kernel: &K) -> Result<(), InitError> {
        let Some(fds) = &self.fds else {
            return Err(InitError::NamespaceJoin {
                kind: "closed",
                source: Errno::EBADF,
            });
        };

        for (kind, fd) in NamespaceKind::JOIN_ORDER.into_iter().zip(fds) {
            kernel
                .setns(fd.as_fd(), kind)
                .map_err(|source| InitError::NamespaceJoin {
                    kind: kind.label(),
                    source,
                })?;
            log::debug!("Joined {} namespace of pid {}", kind, self.target);
        }

        // Only children forked from now on live in the new pid namespace.
        log::info!("Connected to namespaces of pid {}", self.target);
        Ok(())
    }

    /// Close all three descriptors
    ///
    /// Every descriptor is closed even if an earlier one fails; the first
    /// failure is reported. Closing an already closed set is a no-op.
    pub fn close(&mut self) -> Result<(), InitError> {
        let Some(fds) = self.fds.take() else {
            return Ok(());
        };

        let mut first_error = None;
        for (kind, fd) in NamespaceKind::JOIN_ORDER.into_iter().zip(fds) {
            if let Err(source) = nix::unistd::close(fd.into_raw_fd()) {
                log::error!("Failed to close {} namespace: {}", kind, source);
                first_error.get_or_insert(InitError::NamespaceClose {
                    kind: kind.label(),
                    source,
                });
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                log::debug!("Closed namespace set of pid {}", self.target);
                Ok(())
            }
        }
    }
}

impl Drop for NamespaceSet {
    fn drop(&mut self) {
        if self.fds.is_some() {
            log::warn!(
                "Namespace set of pid {} dropped without close()",
                self.target
            );
        }
    }
}

fn open_ns(proc_root: &Path, pid: Pid, kind: NamespaceKind) -> Result<OwnedFd, InitError> {
    let path = proc_root
        .join(pid.as_raw().to_string())
        .join("ns")
        .join(kind.proc_name());

    let fd = open(path.as_path(), OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
        .map_err(|source| InitError::NamespaceOpen {
            kind: kind.label(),
            pid: pid.as_raw(),
            source,
        })?;

    // SAFETY: open() just returned this descriptor and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
