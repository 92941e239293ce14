//! Idle-on-exit bookkeeping per session kind
//!
//! Each [`ExitSession`] counts the successful opens of one kind of node. The
//! first open arms the session: it receives its own exit descriptor, opened
//! independently of the one handed to the caller, and registers itself with
//! the process exit hooks. Shutdown quiesces and closes that descriptor once;
//! every later notification finds the session closed and does nothing.
//!
//! ```text
//! Uninitialized -> Opening -> Active -> Exiting -> Closed
//! ```

pub mod hooks;

pub use hooks::ExitHandler;

use log::{debug, error, info};
use serde::Serialize;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, TryLockError};

use crate::device::DrmDevice;
use crate::error::DrmResult;
use crate::quiesce::force_quiescent;

/// Which kind of node a session tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionKind {
    /// Legacy (primary) nodes
    Legacy,
    /// Render nodes
    Render,
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No successful open yet
    Uninitialized,
    /// First open in progress
    Opening,
    /// Exit descriptor held, handler installed
    Active,
    /// Shutdown in progress
    Exiting,
    /// Nothing left to do at exit
    Closed,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Uninitialized,
            1 => SessionState::Opening,
            2 => SessionState::Active,
            3 => SessionState::Exiting,
            _ => SessionState::Closed,
        }
    }
}

/// Outcome of arming a session on its first open
#[derive(Debug)]
pub enum ExitSetup<D> {
    /// The device needs no idling at exit; the open is not counted and a
    /// later open may still arm the session
    NotNeeded,
    /// Exit descriptor to quiesce at shutdown
    Device(D),
    /// The exit descriptor could not be opened; the handler stays a no-op
    Unavailable,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session kind
    pub kind: SessionKind,
    /// Current state
    pub state: SessionState,
    /// Successful opens so far
    pub open_count: usize,
    /// Descriptor handed to the caller on the first open
    pub primary_fd: Option<RawFd>,
    /// Descriptor reserved for the exit handler
    pub exit_fd: Option<RawFd>,
    /// Times the exit handler was installed
    pub handler_installs: usize,
}

/// Registers a handler with the termination mechanism
pub type Installer = fn(&'static dyn ExitHandler);

/// Per-kind open counter and exit descriptor
pub struct ExitSession<D> {
    kind: SessionKind,
    open_count: AtomicUsize,
    state: AtomicU8,
    handler_installs: AtomicUsize,
    primary_fd: AtomicI32,
    exit_fd: AtomicI32,
    exit_device: Mutex<Option<D>>,
    installer: Installer,
}

impl<D> ExitSession<D> {
    /// Session that registers with the process exit hooks
    pub const fn new(kind: SessionKind) -> Self {
        Self::with_installer(kind, hooks::install)
    }

    /// Session that registers through `installer` instead
    pub const fn with_installer(kind: SessionKind, installer: Installer) -> Self {
        Self {
            kind,
            open_count: AtomicUsize::new(0),
            state: AtomicU8::new(SessionState::Uninitialized as u8),
            handler_installs: AtomicUsize::new(0),
            primary_fd: AtomicI32::new(-1),
            exit_fd: AtomicI32::new(-1),
            exit_device: Mutex::new(None),
            installer,
        }
    }

    /// Session kind
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Successful opens so far
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Current counters and descriptors
    pub fn snapshot(&self) -> SessionSnapshot {
        let fd = |raw: i32| (raw >= 0).then_some(raw);
        SessionSnapshot {
            kind: self.kind,
            state: self.state(),
            open_count: self.open_count(),
            primary_fd: fd(self.primary_fd.load(Ordering::SeqCst)),
            exit_fd: fd(self.exit_fd.load(Ordering::SeqCst)),
            handler_installs: self.handler_installs.load(Ordering::SeqCst),
        }
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl<D: DrmDevice + Send + 'static> ExitSession<D> {
    /// Record a successful open of `primary` and return the new open count.
    ///
    /// Only the very first open runs `setup`; its result decides whether an
    /// exit handler is installed. An error from `setup` leaves the session
    /// closed and is passed through.
    pub fn acquire<F>(&'static self, primary: &D, setup: F) -> DrmResult<usize>
    where
        F: FnOnce() -> DrmResult<ExitSetup<D>>,
    {
        let count = self.open_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count != 1 || !self.transition(SessionState::Uninitialized, SessionState::Opening) {
            return Ok(count);
        }
        self.primary_fd.store(primary.raw_fd(), Ordering::SeqCst);

        let setup = match setup() {
            Ok(setup) => setup,
            Err(e) => {
                self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
                return Err(e);
            }
        };

        match setup {
            ExitSetup::NotNeeded => {
                debug!("{:?} session: no exit handler needed", self.kind);
                self.primary_fd.store(-1, Ordering::SeqCst);
                self.open_count.fetch_sub(1, Ordering::SeqCst);
                self.state.store(SessionState::Uninitialized as u8, Ordering::SeqCst);
                return Ok(count - 1);
            }
            ExitSetup::Unavailable => {
                info!("{:?} session: exit descriptor unavailable, exit handler is a no-op", self.kind);
                self.install();
                self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
            }
            ExitSetup::Device(dev) => {
                self.exit_fd.store(dev.raw_fd(), Ordering::SeqCst);
                *self.exit_device.lock().unwrap_or_else(|p| p.into_inner()) = Some(dev);
                self.install();
                self.state.store(SessionState::Active as u8, Ordering::SeqCst);
                debug!("{:?} session active", self.kind);
            }
        }
        Ok(count)
    }

    /// Drop one open; the last release shuts the session down
    pub fn release(&self) -> DrmResult<bool> {
        let previous = self
            .open_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.shutdown(),
            _ => Ok(false),
        }
    }

    /// Quiesce and close the exit descriptor if it is still valid.
    ///
    /// Returns `Ok(false)` when there was nothing to do, which is the case for
    /// every call after the first.
    pub fn shutdown(&self) -> DrmResult<bool> {
        if !self.transition(SessionState::Active, SessionState::Exiting) {
            return Ok(false);
        }

        // Uncontended: only Opening holds the lock, and Opening never
        // overlaps Exiting. try_lock keeps the signal path from blocking.
        let dev = match self.exit_device.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
            Err(TryLockError::WouldBlock) => None,
        };
        let result = match &dev {
            Some(dev) => force_quiescent(dev).map(|_| true),
            None => Ok(false),
        };
        drop(dev);

        self.exit_fd.store(-1, Ordering::SeqCst);
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
        debug!("{:?} session closed", self.kind);
        result
    }

    fn install(&'static self) {
        self.handler_installs.fetch_add(1, Ordering::SeqCst);
        (self.installer)(self);
    }
}

impl<D: DrmDevice + Send + 'static> ExitHandler for ExitSession<D> {
    fn on_exit(&self, signal: Option<libc::c_int>) {
        let result = self.shutdown();
        // No logging from a signal handler
        if let (Err(e), None) = (result, signal) {
            error!("{:?} session: idling at exit failed: {}", self.kind, e);
        }
    }
}

impl<D> std::fmt::Debug for ExitSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitSession")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("open_count", &self.open_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDrmDevice;
    use crate::error::DrmError;
    use serial_test::serial;
    use std::io;
    use std::sync::atomic::AtomicUsize;

    static INSTALLED: AtomicUsize = AtomicUsize::new(0);

    fn counting_installer(_: &'static dyn ExitHandler) {
        INSTALLED.fetch_add(1, Ordering::SeqCst);
    }

    fn session() -> &'static ExitSession<MockDrmDevice> {
        Box::leak(Box::new(ExitSession::with_installer(
            SessionKind::Legacy,
            counting_installer,
        )))
    }

    fn primary() -> MockDrmDevice {
        let mut dev = MockDrmDevice::new();
        dev.expect_raw_fd().return_const(3);
        dev
    }

    /// Exit device expecting exactly one quiescence pass
    fn exit_device() -> MockDrmDevice {
        let mut dev = MockDrmDevice::new();
        dev.expect_raw_fd().return_const(4);
        dev.expect_gem_create().times(1).returning(|_| Ok(1));
        dev.expect_gem_write().times(1).returning(|_, _, _| Ok(()));
        dev.expect_execbuf().times(64).returning(|_, _| Ok(()));
        dev.expect_has_bsd2().returning(|| Ok(false));
        dev.expect_gem_sync().times(1).returning(|_| Ok(()));
        dev.expect_gem_close().times(1).returning(|_| Ok(()));
        dev.expect_drop_caches().times(1).returning(|_| Ok(()));
        dev
    }

    #[test]
    #[serial]
    fn test_single_install_for_many_opens() {
        let session = session();
        let before = INSTALLED.load(Ordering::SeqCst);
        let mut setups = 0;

        for n in 1..=5 {
            let count = session
                .acquire(&primary(), || {
                    setups += 1;
                    Ok(ExitSetup::Device(exit_device()))
                })
                .unwrap();
            assert_eq!(count, n);
        }

        let snapshot = session.snapshot();
        assert_eq!(snapshot.open_count, 5);
        assert_eq!(snapshot.handler_installs, 1);
        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.primary_fd, Some(3));
        assert_eq!(snapshot.exit_fd, Some(4));
        assert_eq!(setups, 1);
        assert_eq!(INSTALLED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    #[serial]
    fn test_shutdown_runs_once() {
        let session = session();
        session
            .acquire(&primary(), || Ok(ExitSetup::Device(exit_device())))
            .unwrap();

        assert!(session.shutdown().unwrap());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.snapshot().exit_fd, None);

        // Repeated notifications are no-ops; the mock would panic on a second pass
        session.on_exit(Some(libc::SIGTERM));
        session.on_exit(None);
        assert!(!session.shutdown().unwrap());
    }

    #[test]
    #[serial]
    fn test_unavailable_exit_descriptor() {
        let session = session();
        session.acquire(&primary(), || Ok(ExitSetup::Unavailable)).unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.handler_installs, 1);
        assert_eq!(snapshot.state, SessionState::Closed);
        assert!(!session.shutdown().unwrap());
    }

    #[test]
    #[serial]
    fn test_not_needed_leaves_session_armable() {
        let session = session();
        assert_eq!(session.acquire(&primary(), || Ok(ExitSetup::NotNeeded)).unwrap(), 0);
        assert_eq!(session.acquire(&primary(), || Ok(ExitSetup::NotNeeded)).unwrap(), 0);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.open_count, 0);
        assert_eq!(snapshot.handler_installs, 0);
        assert_eq!(snapshot.state, SessionState::Uninitialized);
        assert_eq!(snapshot.primary_fd, None);

        session
            .acquire(&primary(), || Ok(ExitSetup::Device(exit_device())))
            .unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.open_count, 1);
        assert_eq!(snapshot.handler_installs, 1);
        assert_eq!(snapshot.state, SessionState::Active);
        assert!(session.shutdown().unwrap());
    }

    #[test]
    #[serial]
    fn test_setup_error_is_passed_through() {
        let session = session();
        let err = session
            .acquire(&primary(), || {
                Err(DrmError::Unresponsive(io::Error::from_raw_os_error(libc::EIO)))
            })
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(session.open_count(), 1);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    #[serial]
    fn test_last_release_shuts_down() {
        let session = session();
        session
            .acquire(&primary(), || Ok(ExitSetup::Device(exit_device())))
            .unwrap();
        session.acquire(&primary(), || unreachable!()).unwrap();

        assert!(!session.release().unwrap());
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.release().unwrap());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.release().unwrap());
        assert_eq!(session.open_count(), 0);
    }
}
