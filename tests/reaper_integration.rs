//! Reaping against real child processes
//!
//! Every test forks and reaps with waitpid(-1), which sees all children of
//! the test binary, so they are serialized.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use ckinit::pid1::{ChildExit, ReapOutcome, SignalConfig, Supervisor, ZombieReaper};
use nix::sys::signal::{kill, Signal};
use nix::sys::time::TimeSpec;
use nix::unistd::{fork, ForkResult, Pid};
use serial_test::serial;

/// Fork a child that sleeps `delay` then exits with `code`
fn spawn_exiting(code: i32, delay: Duration) -> Pid {
    // SAFETY: the child only calls async-signal-safe functions.
    match unsafe { fork() }.expect("fork failed") {
        ForkResult::Child => unsafe {
            let ts = TimeSpec::from(delay);
            libc::nanosleep(ts.as_ref(), std::ptr::null_mut());
            libc::_exit(code)
        },
        ForkResult::Parent { child } => child,
    }
}

/// Block until `pid` is a zombie
fn wait_zombie(pid: Pid) {
    let stat = format!("/proc/{}/stat", pid);
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        let state = std::fs::read_to_string(Path::new(&stat)).unwrap_or_default();
        // pid (comm) S ...
        if let Some(rest) = state.rsplit(')').next() {
            if rest.trim_start().starts_with('Z') {
                return;
            }
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("{} never became a zombie", pid);
}

#[test]
#[serial]
fn test_one_pass_drains_all_zombies() {
    let main = spawn_exiting(7, Duration::ZERO);
    let side: Vec<Pid> = (0..3).map(|i| spawn_exiting(i, Duration::ZERO)).collect();

    wait_zombie(main);
    side.iter().copied().for_each(wait_zombie);

    let mut reaper = ZombieReaper::new(main);
    let outcome = reaper.reap_all().unwrap();

    assert_eq!(outcome.reaped(), 4);
    assert_eq!(reaper.exit(), ChildExit::Exited(7));

    // Nothing left behind for the next pass
    assert_eq!(
        reaper.reap_all().unwrap(),
        ReapOutcome::NoChildren { reaped: 0 }
    );
}

#[test]
#[serial]
fn test_side_descendants_do_not_end_supervision() {
    let main = spawn_exiting(0, Duration::from_secs(30));
    let side = spawn_exiting(5, Duration::ZERO);
    wait_zombie(side);

    let mut reaper = ZombieReaper::new(main);
    assert_eq!(
        reaper.reap_all().unwrap(),
        ReapOutcome::Drained { reaped: 1 }
    );
    assert_eq!(reaper.exit(), ChildExit::Pending);

    kill(main, Signal::SIGKILL).unwrap();
    wait_zombie(main);
    reaper.reap_all().unwrap();
    assert_eq!(reaper.exit(), ChildExit::Exited(128 + libc::SIGKILL));
}

#[test]
#[serial]
fn test_no_children_is_not_an_error() {
    let mut reaper = ZombieReaper::new(Pid::from_raw(i32::MAX));
    assert_eq!(
        reaper.reap_all().unwrap(),
        ReapOutcome::NoChildren { reaped: 0 }
    );
    assert_eq!(reaper.exit(), ChildExit::Pending);
}

#[test]
#[serial]
fn test_supervisor_returns_main_child_code() {
    let signals = SignalConfig::configure().unwrap();

    let main = spawn_exiting(7, Duration::from_millis(100));
    let side = spawn_exiting(1, Duration::from_millis(20));

    let code = Supervisor::new(&signals, main)
        .with_timeout(Duration::from_millis(100))
        .run()
        .unwrap();
    assert_eq!(code, 7);

    signals.restore().unwrap();

    // The side child was reaped along the way
    assert!(std::fs::metadata(format!("/proc/{}", side)).is_err());
}

#[test]
#[serial]
fn test_supervisor_exit_code_zero() {
    let signals = SignalConfig::configure().unwrap();
    let main = spawn_exiting(0, Duration::ZERO);

    let code = Supervisor::new(&signals, main).run().unwrap();
    assert_eq!(code, 0);

    signals.restore().unwrap();
}
