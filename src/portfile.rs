//! Advisory port file

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Write `port` in decimal to `path`, flushed and synced
///
/// An empty path means no port file was requested. Failures are only
/// logged: the port file is advisory.
pub fn write_port(port: u16, path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }

    match try_write_port(port, path) {
        Ok(()) => {
            log::debug!("Wrote port {} to {}", port, path.display());
            true
        }
        Err(e) => {
            log::warn!("Failed to write port file {}: {}", path.display(), e);
            false
        }
    }
}

fn try_write_port(port: u16, path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    write!(file, "{}", port)?;
    file.flush()?;
    file.sync_all()
}
