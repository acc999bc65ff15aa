//! Log sink setup
//!
//! Everything goes to a per-process file in the tmp directory; stderr gets
//! the same records unless `CKINIT_QUIET` turns it down.

use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::InitError;

/// 0 = normal, 1 = warnings and errors only, 2 = errors only (stderr)
pub const QUIET_ENV: &str = "CKINIT_QUIET";

/// `<tmp_dir>/ckinit-log.<pid>_<procname>`
///
/// An empty `procname` falls back to the program name.
pub fn log_file_path(tmp_dir: &Path, procname: &str) -> PathBuf {
    let name = if procname.is_empty() {
        program_name()
    } else {
        procname.to_string()
    };
    tmp_dir.join(format!("ckinit-log.{}_{}", std::process::id(), name))
}

/// Install the global logger and write the process banner
///
/// `prev_log_path` is the log of the previous incarnation after a restart
/// and may be empty.
pub fn init(tmp_dir: &Path, procname: &str, prev_log_path: &str) -> Result<PathBuf, InitError> {
    let path = log_file_path(tmp_dir, procname);

    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(LevelFilter::Info);
    let quiet = std::env::var(QUIET_ENV).ok();
    let stderr_level = stderr_level(level, quiet.as_deref());

    let file = fern::log_file(&path)
        .map_err(|e| InitError::Logging(format!("{}: {}", path.display(), e)))?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}:{}] {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.target(),
                std::process::id(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(file)
        .chain(fern::Dispatch::new().level(stderr_level).chain(std::io::stderr()))
        .apply()
        .map_err(|e| InitError::Logging(e.to_string()))?;

    write_banner(prev_log_path);
    Ok(path)
}

/// Most verbose level named in a `RUST_LOG`-style list
///
/// Targets are not filtered separately: `warn,ckinit=debug` gives `Debug`.
fn parse_level(filters: &str) -> Option<LevelFilter> {
    filters
        .split(',')
        .filter_map(|directive| directive.rsplit('=').next())
        .filter_map(|level| LevelFilter::from_str(level.trim()).ok())
        .max()
}

/// Level for stderr given the file level and the quiet setting
fn stderr_level(level: LevelFilter, quiet: Option<&str>) -> LevelFilter {
    let cap = match quiet.map(str::trim) {
        Some("1") => LevelFilter::Warn,
        Some("2") => LevelFilter::Error,
        _ => LevelFilter::Trace,
    };
    level.min(cap)
}

fn write_banner(prev_log_path: &str) {
    log::info!("This process: pid {}", std::process::id());
    log::info!("Parent process: pid {}", nix::unistd::getppid());
    if !prev_log_path.is_empty() {
        log::info!("Previous log path: {}", prev_log_path);
    }
    let argv: Vec<String> = std::env::args().collect();
    log::info!("Argv: {}", argv.join(" "));
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ckinit".to_string())
}
