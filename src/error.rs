//! Error taxonomy shared by the supervisor and the namespace handoff

/// Fatal errors of the supervisor and namespace handoff
///
/// None of these are retryable.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Signal operation {op} failed: {source}")]
    Signal {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    /// Raw number, so values nix has no `Signal` for are kept too
    #[error("Unexpected signal {0} while supervising")]
    UnexpectedSignal(i32),

    #[error("Error while waiting for pids: {0}")]
    Wait(#[source] nix::Error),

    #[error("Failed to open {kind} namespace of pid {pid}: {source}")]
    NamespaceOpen {
        kind: &'static str,
        pid: i32,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to set {kind} namespace: {source}")]
    NamespaceJoin {
        kind: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to close {kind} namespace: {source}")]
    NamespaceClose {
        kind: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to become child subreaper: {0}")]
    Subreaper(#[source] nix::Error),

    #[error("Failed to spawn child: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to prepare tmp directory {path}: {source}")]
    TmpDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
