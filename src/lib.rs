//! ckinit - Minimal supervisor for checkpointable process trees
//!
//! Two leaf subsystems used on the launch/restart path:
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │        Supervisor loop       │   │  Namespace attach + handoff  │
//! │  signals → wait → reap → exit│   │  open → connect → fork → wait│
//! └──────────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! - [`pid1`]: PID-1 style supervision of a main child. SIGCHLD is waited for
//!   synchronously, zombies are drained, the main child's exit code is
//!   propagated.
//! - [`namespace`] and [`handoff`]: join the user/mount/pid namespaces of a
//!   target process and cede control to a child in stop/continue lock-step.

pub mod error;
pub mod handoff;
pub mod logging;
pub mod namespace;
pub mod pid1;
pub mod portfile;
pub mod sys;
pub mod tmpdir;

pub use error::InitError;
pub use namespace::{NamespaceKind, NamespaceSet};
pub use pid1::{SignalConfig, Supervisor};
