//! ckinit - supervisor and namespace handoff launcher
//!
//! `ckinit run -- CMD...`:
//! - Blocks SIGCHLD for synchronous waiting
//! - Spawns CMD with the original signal state restored
//! - Reaps every zombie and exits with CMD's exit code
//!
//! `ckinit enter --target PID -- CMD...`:
//! - Joins the user, mount and pid namespaces of PID
//! - Spawns CMD inside them and continues as that child

use clap::{Parser, Subcommand};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{self, Child, Command as Process};

use ckinit::pid1::{self, SignalConfig, Supervisor};
use ckinit::{handoff, logging, portfile, tmpdir, InitError, NamespaceSet};

/// Exit status for fatal supervisor errors
const EXIT_FATAL: i32 = 1;

#[derive(Parser)]
#[command(name = "ckinit")]
#[command(about = "Minimal supervisor for checkpointable process trees")]
#[command(
    long_about = "ckinit runs a command as the main child of a PID-1 style \
    supervisor, or runs it inside the namespaces of another process while \
    the launcher follows it in stop/continue lock-step."
)]
struct Args {
    /// Base directory for logs (default: $CKINIT_TMPDIR, $TMPDIR, /tmp)
    #[arg(long, global = true)]
    tmpdir: Option<PathBuf>,

    /// Log file of the previous incarnation, recorded after a restart
    #[arg(long, global = true, default_value = "")]
    prev_log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Supervise a command, reaping zombies, and exit with its exit code
    Run {
        /// Become child subreaper so orphaned descendants are reaped here
        #[arg(long, short = 's')]
        subreaper: bool,

        /// Port to advertise through --port-file
        #[arg(long, requires = "port_file")]
        port: Option<u16>,

        /// File receiving the advertised port
        #[arg(long, requires = "port")]
        port_file: Option<PathBuf>,

        /// Command and arguments of the main child
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<OsString>,
    },

    /// Join the namespaces of a process and continue as a child inside them
    Enter {
        /// Process whose user, mount and pid namespaces are joined
        #[arg(long, short = 't')]
        target: i32,

        /// Command and arguments to run inside the namespaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<OsString>,
    },
}

fn main() {
    let args = Args::parse();

    let procname = match args.command {
        Command::Run { .. } => "run",
        Command::Enter { .. } => "enter",
    };
    if let Err(e) = init_logging(&args, procname) {
        eprintln!("ckinit: {}", e);
        process::exit(EXIT_FATAL);
    }

    let result = match args.command {
        Command::Run {
            subreaper,
            port,
            port_file,
            command,
        } => {
            if let (Some(port), Some(path)) = (port, port_file) {
                portfile::write_port(port, &path);
            }
            run(&command, subreaper)
        }
        Command::Enter { target, command } => enter(Pid::from_raw(target), &command),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            log::error!("{}", e);
            process::exit(EXIT_FATAL);
        }
    }
}

fn init_logging(args: &Args, procname: &str) -> Result<(), InitError> {
    let dir = tmpdir::calc_tmp_dir(args.tmpdir.as_deref())?;
    let path = logging::init(&dir, procname, &args.prev_log)?;
    log::debug!("Logging to {}", path.display());
    Ok(())
}

/// Supervise `command` until it exits
fn run(command: &[OsString], subreaper: bool) -> Result<i32, InitError> {
    // SIGCHLD must be blocked before the child exists, or its exit may be missed
    let signals = SignalConfig::configure()?;

    if subreaper {
        pid1::become_subreaper()?;
    } else if !pid1::is_pid1() {
        log::debug!("Not PID 1 and not a subreaper, orphans go to the real init");
    }

    let snapshot = signals.clone();
    let mut cmd = process_for(command)?;
    // SAFETY: restore_in_child only calls sigprocmask and sigaction.
    unsafe {
        cmd.pre_exec(move || snapshot.restore_in_child());
    }
    let child = spawn(cmd)?;

    let code = Supervisor::new(&signals, child_pid(&child)).run()?;
    log::info!("Propagating exit code {}", code);
    Ok(code)
}

/// Run `command` inside the namespaces of `target`
fn enter(target: Pid, command: &[OsString]) -> Result<i32, InitError> {
    let mut namespaces = NamespaceSet::open(target)?;
    namespaces.connect_all()?;
    namespaces.close()?;

    let child = spawn(process_for(command)?)?;
    Ok(handoff::continue_as_child(child_pid(&child)))
}

fn process_for(command: &[OsString]) -> Result<Process, InitError> {
    let (program, args) = command.split_first().ok_or_else(|| {
        InitError::Spawn(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command",
        ))
    })?;

    let mut cmd = Process::new(program);
    cmd.args(args);
    Ok(cmd)
}

fn spawn(mut cmd: Process) -> Result<Child, InitError> {
    let child = cmd.spawn().map_err(InitError::Spawn)?;
    log::info!("Spawned {:?} as pid {}", cmd.get_program(), child.id());
    Ok(child)
}

fn child_pid(child: &Child) -> Pid {
    Pid::from_raw(child.id() as i32)
}
