//! Bringing a device to an idle, cache-neutral state
//!
//! Quiescence submits a batch containing nothing but the end-of-batch marker
//! to every engine selector value, waits for the last of them and then asks
//! the driver to retire and free what it has cached. It runs when a device is
//! first opened and again from the exit handlers.

pub mod spin;

use log::{debug, trace, warn};
use serde::Serialize;

use crate::device::{DrmDevice, DropCaches};
use crate::error::{DrmError, DrmResult};

/// MI_BATCH_BUFFER_END
pub const MI_BATCH_BUFFER_END: u32 = 0xa << 23;
/// MI_NOOP
pub const MI_NOOP: u32 = 0;

/// Number of engine selector values swept.
///
/// Covers the 6-bit ring selector of the execbuf flags; engines addressed
/// beyond it are not reached.
pub const ENGINE_SELECTOR_SWEEP: u64 = 1 << 6;

/// Select the video (BSD) engine
pub const I915_EXEC_BSD: u64 = 2 << 0;
/// Pick the second BSD engine explicitly
pub const I915_EXEC_BSD_RING2: u64 = 2 << 13;

const BATCH_SIZE: u64 = 4096;

/// What a quiescence pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuiesceReport {
    /// Spinners terminated before submitting
    pub spinners_terminated: usize,
    /// Submissions the driver accepted
    pub accepted: u32,
    /// Submissions the driver rejected (engine absent)
    pub rejected: u32,
    /// Whether the second BSD engine got its own submission
    pub bsd2: bool,
    /// Whether the cache drop request went through
    pub caches_dropped: bool,
}

/// Idle the device behind `dev`.
///
/// Individual submissions may fail on engines that do not exist. A failure of
/// the final wait means the device is stuck and is returned as
/// [`DrmError::Unresponsive`].
pub fn force_quiescent<D: DrmDevice + ?Sized>(dev: &D) -> DrmResult<QuiesceReport> {
    let mut report = QuiesceReport {
        spinners_terminated: spin::terminate_all(),
        ..Default::default()
    };

    let handle = dev.gem_create(BATCH_SIZE).map_err(DrmError::IoctlFailed)?;

    let mut batch = [0u8; 8];
    batch[..4].copy_from_slice(&MI_BATCH_BUFFER_END.to_ne_bytes());
    batch[4..].copy_from_slice(&MI_NOOP.to_ne_bytes());
    if let Err(e) = dev.gem_write(handle, 0, &batch) {
        close_batch(dev, handle);
        return Err(DrmError::IoctlFailed(e));
    }

    for ring in 0..ENGINE_SELECTOR_SWEEP {
        submit(dev, handle, ring, &mut report);
    }

    if dev.has_bsd2().unwrap_or(false) {
        report.bsd2 = true;
        submit(dev, handle, I915_EXEC_BSD | I915_EXEC_BSD_RING2, &mut report);
    }

    if let Err(e) = dev.gem_sync(handle) {
        close_batch(dev, handle);
        return Err(DrmError::Unresponsive(e));
    }
    close_batch(dev, handle);

    match dev.drop_caches(DropCaches::RETIRE | DropCaches::FREED) {
        Ok(()) => report.caches_dropped = true,
        Err(e) => warn!("fd {}: dropping caches failed: {}", dev.raw_fd(), e),
    }

    debug!(
        "fd {}: quiescent ({} accepted, {} rejected)",
        dev.raw_fd(),
        report.accepted,
        report.rejected
    );
    Ok(report)
}

fn submit<D: DrmDevice + ?Sized>(dev: &D, handle: u32, flags: u64, report: &mut QuiesceReport) {
    match dev.execbuf(handle, flags) {
        Ok(()) => report.accepted += 1,
        Err(e) => {
            trace!("fd {}: execbuf flags 0x{:x} rejected: {}", dev.raw_fd(), flags, e);
            report.rejected += 1;
        }
    }
}

fn close_batch<D: DrmDevice + ?Sized>(dev: &D, handle: u32) {
    if let Err(e) = dev.gem_close(handle) {
        warn!("fd {}: closing batch {} failed: {}", dev.raw_fd(), handle, e);
    }
}
