//! Per-user tmp directory
//!
//! Logs live in `<base>/ckinit-<user>@<host>`, where base is the explicit
//! override, then `$CKINIT_TMPDIR`, then `$TMPDIR`, then `/tmp`.

use nix::errno::Errno;
use nix::unistd::{access, gethostname, getuid, AccessFlags, User};
use std::ffi::OsString;
use std::fs::DirBuilder;
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use crate::InitError;

/// Environment variable overriding the base directory
pub const TMPDIR_ENV: &str = "CKINIT_TMPDIR";

/// Compute and create the tmp directory, owner-only permissions
pub fn calc_tmp_dir(override_dir: Option<&Path>) -> Result<PathBuf, InitError> {
    let base = resolve_base(override_dir, |key| std::env::var_os(key));
    ensure_dir(&base)?;

    let host = host_name(&base, gethostname())?;
    let dir = base.join(format!("ckinit-{}@{}", user_name(), host));
    ensure_dir(&dir)?;

    access(dir.as_path(), AccessFlags::X_OK | AccessFlags::W_OK).map_err(|e| {
        InitError::TmpDir {
            path: dir.display().to_string(),
            source: e.into(),
        }
    })?;

    log::debug!("Using tmp directory {}", dir.display());
    Ok(dir)
}

/// Pick the base directory from the override and the environment
fn resolve_base<F>(override_dir: Option<&Path>, env: F) -> PathBuf
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    [TMPDIR_ENV, "TMPDIR"]
        .into_iter()
        .filter_map(|key| env(key))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// mkdir with mode 0700, an existing directory is fine
fn ensure_dir(path: &Path) -> Result<(), InitError> {
    match DirBuilder::new().mode(0o700).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(InitError::TmpDir {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

fn user_name() -> String {
    match User::from_uid(getuid()) {
        Ok(Some(user)) => user.name,
        _ => std::env::var("USER").unwrap_or_default(),
    }
}

/// Only a name too long for the buffer is tolerated
fn host_name(base: &Path, res: nix::Result<OsString>) -> Result<String, InitError> {
    match res {
        Ok(name) => Ok(name.to_string_lossy().into_owned()),
        Err(Errno::ENAMETOOLONG) => {
            log::warn!("gethostname() truncated, using an empty host name");
            Ok(String::new())
        }
        Err(e) => Err(InitError::TmpDir {
            path: base.display().to_string(),
            source: e.into(),
        }),
    }
}
