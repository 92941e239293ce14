//! Process termination hooks
//!
//! Handlers run on normal exit (`atexit`) and on the signals in
//! [`HANDLED_SIGNALS`], most recently installed first. After the handlers of a
//! signal have run, the default disposition is restored and the signal is
//! raised again so the process still dies the way it would have.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, TryLockError};

/// Something to run when the process goes away
pub trait ExitHandler: Sync {
    /// Called once per termination notification; `signal` is `None` on normal exit.
    ///
    /// May be called more than once (a signal arriving during exit) and must
    /// tolerate that.
    fn on_exit(&self, signal: Option<libc::c_int>);
}

/// Signals that trigger the exit handlers
pub const HANDLED_SIGNALS: [libc::c_int; 9] = [
    libc::SIGINT,
    libc::SIGHUP,
    libc::SIGTERM,
    libc::SIGQUIT,
    libc::SIGPIPE,
    libc::SIGABRT,
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGFPE,
];

static HANDLERS: Mutex<Vec<&'static dyn ExitHandler>> = Mutex::new(Vec::new());
static HOOKED: AtomicBool = AtomicBool::new(false);

/// Register `handler` and make sure the process hooks are in place
pub fn install(handler: &'static dyn ExitHandler) {
    register(handler);
    if !HOOKED.swap(true, Ordering::SeqCst) {
        hook_process();
    }
}

/// Add `handler` to the list without touching process state
pub(crate) fn register(handler: &'static dyn ExitHandler) {
    HANDLERS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(handler);
}

/// Number of registered handlers
pub fn installed() -> usize {
    HANDLERS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .len()
}

/// Run every registered handler, newest first.
///
/// Handlers run under the registry lock without copying it, so nothing is
/// allocated on the signal path.
pub(crate) fn run_handlers(signal: Option<libc::c_int>) {
    let handlers = match HANDLERS.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        // Interrupted inside register(), or a signal arrived while the
        // handlers were already running
        Err(TryLockError::WouldBlock) => return,
    };

    for handler in handlers.iter().rev() {
        handler.on_exit(signal);
    }
}

extern "C" fn at_exit() {
    run_handlers(None);
}

extern "C" fn on_signal(signal: libc::c_int) {
    // The logger may be holding locks in the interrupted code
    log::set_max_level(log::LevelFilter::Off);
    run_handlers(Some(signal));
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

fn hook_process() {
    debug!("installing exit hooks for {} signals", HANDLED_SIGNALS.len());
    unsafe {
        libc::atexit(at_exit);

        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        for signal in HANDLED_SIGNALS {
            libc::sigaction(signal, &action, std::ptr::null_mut());
        }
    }
}
