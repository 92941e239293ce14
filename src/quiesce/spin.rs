//! Registry of injected long-running workloads
//!
//! Fault-injection helpers register a [`Spinner`] for every endless batch
//! they submit. Quiescence terminates all of them before it idles the device,
//! otherwise the final wait would never return.

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

/// A workload that can be told to stop
pub trait Spinner: Send + Sync {
    /// End the workload; must not block on the device
    fn terminate(&self);
}

/// Handle returned by [`register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpinnerId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static SPINNERS: Mutex<Vec<(SpinnerId, Arc<dyn Spinner>)>> = Mutex::new(Vec::new());

fn registry() -> Option<MutexGuard<'static, Vec<(SpinnerId, Arc<dyn Spinner>)>>> {
    match SPINNERS.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        // Only reachable when a signal handler interrupts a registry update
        Err(TryLockError::WouldBlock) => None,
    }
}

/// Track a running workload until it is unregistered or terminated
pub fn register(spinner: Arc<dyn Spinner>) -> SpinnerId {
    let id = SpinnerId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    SPINNERS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push((id, spinner));
    id
}

/// Stop tracking a workload that ended on its own
pub fn unregister(id: SpinnerId) -> bool {
    let mut spinners = SPINNERS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let before = spinners.len();
    spinners.retain(|(other, _)| *other != id);
    spinners.len() != before
}

/// Number of tracked workloads
pub fn active() -> usize {
    registry().map_or(0, |spinners| spinners.len())
}

/// Terminate and forget every tracked workload, returning how many there were
pub fn terminate_all() -> usize {
    let drained: Vec<_> = match registry() {
        Some(mut spinners) => spinners.drain(..).collect(),
        None => {
            warn!("spinner registry busy, not terminating spinners");
            return 0;
        }
    };

    for (id, spinner) in &drained {
        debug!("terminating spinner {:?}", id);
        spinner.terminate();
    }
    drained.len()
}

/// Spinner backed by a flag the workload polls
#[derive(Debug, Default)]
pub struct StopFlag(AtomicBool);

impl StopFlag {
    /// New, unset flag
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether termination was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Spinner for StopFlag {
    fn terminate(&self) {
        self.0.store(true, Ordering::Release);
    }
}
