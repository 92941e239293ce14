//! Exit hooks in a real process: the test binary re-runs itself as a child
//! that opens an intel device and then exits or is signalled.

mod common;

use common::{FakeHost, World, SKL_DEVID};
use drmprobe::lifecycle::{hooks, ExitHandler, ExitSession, SessionKind};
use drmprobe::{DriverMask, DriverOpener};
use pretty_assertions::assert_eq;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const CHILD_MODE: &str = "DRMPROBE_EXIT_CHILD_MODE";
const CHILD_LOG: &str = "DRMPROBE_EXIT_CHILD_LOG";
const CHILD_TEST: &str = "exit_child";

/// Appends one line per notification: the signal and the waits seen so far
struct Recorder {
    world: Arc<World>,
    log: PathBuf,
}

impl ExitHandler for Recorder {
    fn on_exit(&self, signal: Option<libc::c_int>) {
        let waits = self.world.waits.load(Ordering::SeqCst);
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.log) {
            let _ = writeln!(file, "{:?} {}", signal, waits);
        }
    }
}

/// Body of the child process; does nothing in a normal test run
#[test]
fn exit_child() {
    let Ok(mode) = env::var(CHILD_MODE) else {
        return;
    };
    let log = PathBuf::from(env::var(CHILD_LOG).unwrap());

    let host = FakeHost::new().card(0, "i915", SKL_DEVID);
    let recorder: &'static Recorder = Box::leak(Box::new(Recorder {
        world: Arc::clone(&host.world),
        log,
    }));
    // Installed first, so it runs after the session has shut down
    hooks::install(recorder);

    let legacy: &'static ExitSession<_> = Box::leak(Box::new(ExitSession::new(SessionKind::Legacy)));
    let render: &'static ExitSession<_> = Box::leak(Box::new(ExitSession::new(SessionKind::Render)));
    let opener = DriverOpener::with_sessions(host, FakeHost::config(), legacy, render);
    let _dev = opener.open_driver(DriverMask::INTEL).unwrap();
    assert_eq!(hooks::installed(), 2);

    match mode.as_str() {
        "exit" => std::process::exit(0),
        _ => unsafe {
            libc::raise(libc::SIGTERM);
        },
    }
    std::thread::sleep(Duration::from_secs(10));
    panic!("still alive after SIGTERM");
}

fn run_child(mode: &str, log: &Path) -> ExitStatus {
    Command::new(env::current_exe().unwrap())
        .args([CHILD_TEST, "--exact", "--test-threads=1", "--nocapture"])
        .env(CHILD_MODE, mode)
        .env(CHILD_LOG, log)
        .status()
        .unwrap()
}

#[test]
fn test_normal_exit_idles_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("exit.log");

    let status = run_child("exit", &log);
    assert_eq!(status.code(), Some(0));

    // One wait when opened, one from the exit handler
    assert_eq!(fs::read_to_string(&log).unwrap(), "None 2\n");
}

#[test]
fn test_signal_idles_once_and_reraises() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("exit.log");

    let status = run_child("sigterm", &log);
    assert_eq!(status.signal(), Some(libc::SIGTERM));
    assert_eq!(status.code(), None);

    assert_eq!(
        fs::read_to_string(&log).unwrap(),
        format!("Some({}) 2\n", libc::SIGTERM)
    );
}
