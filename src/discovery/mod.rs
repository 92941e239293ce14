//! Device node classification
//!
//! Every node is identified by the short driver name returned from the
//! version request. Intel nodes additionally have to report a chipset id
//! that maps to a known hardware generation before they count as intel.

mod scanner;

pub use scanner::{DeviceScanner, NodeKind, NodeReport};

use log::{debug, trace};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::device::DrmDevice;
use crate::error::{DrmError, DrmResult};
use crate::mappings::{ChipsetInfo, DriverFamily, DriverMask};

/// Chipset id of the most recently recognized intel device, 0 if none
static DETECTED_DEVICE_ID: AtomicU32 = AtomicU32::new(0);

/// Driver family reported by the device, if it is one we know
pub fn classify<D: DrmDevice + ?Sized>(dev: &D) -> Option<DriverFamily> {
    match dev.driver_name() {
        Ok(name) => DriverFamily::from_token(&name),
        Err(e) => {
            trace!("fd {}: version query failed: {}", dev.raw_fd(), e);
            None
        }
    }
}

/// True when the device reports the driver name of `family`
pub fn is_family<D: DrmDevice + ?Sized>(dev: &D, family: DriverFamily) -> bool {
    classify(dev) == Some(family)
}

/// Chipset id and generation of an intel device
pub fn chipset_info<D: DrmDevice + ?Sized>(dev: &D) -> Option<ChipsetInfo> {
    match dev.chipset_id() {
        Ok(devid) => Some(ChipsetInfo::from_devid(devid)),
        Err(e) => {
            trace!("fd {}: chipset id query failed: {}", dev.raw_fd(), e);
            None
        }
    }
}

/// True when the chipset id maps to a known generation.
///
/// A recognized id is recorded and readable via [`detected_device_id`].
pub fn has_known_intel_chipset<D: DrmDevice + ?Sized>(dev: &D) -> bool {
    match chipset_info(dev) {
        Some(info) if info.is_known() => {
            DETECTED_DEVICE_ID.store(info.devid, Ordering::Relaxed);
            true
        }
        Some(info) => {
            debug!("fd {}: unrecognized chipset 0x{:04x}", dev.raw_fd(), info.devid);
            false
        }
        None => false,
    }
}

/// Family check used for matching: intel also needs a known chipset
pub fn qualifies<D: DrmDevice + ?Sized>(dev: &D, family: DriverFamily) -> bool {
    is_family(dev, family) && (family != DriverFamily::Intel || has_known_intel_chipset(dev))
}

/// True when the device satisfies at least one capability in `mask`
pub fn matches_mask<D: DrmDevice + ?Sized>(dev: &D, mask: DriverMask) -> bool {
    let family = classify(dev);

    for candidate in DriverFamily::ALL {
        if mask.contains(candidate.mask())
            && family == Some(candidate)
            && (candidate != DriverFamily::Intel || has_known_intel_chipset(dev))
        {
            return true;
        }
    }

    // Only VGEM-specific requests may land on VGEM
    mask.contains(DriverMask::ANY) && family != Some(DriverFamily::Vgem)
}

/// Skip unless the device is intel with a recognized chipset
pub fn require_intel<D: DrmDevice + ?Sized>(dev: &D) -> DrmResult<()> {
    if !is_family(dev, DriverFamily::Intel) {
        return Err(DrmError::NotIntel);
    }
    match chipset_info(dev) {
        Some(info) if info.is_known() => {
            DETECTED_DEVICE_ID.store(info.devid, Ordering::Relaxed);
            Ok(())
        }
        Some(info) => Err(DrmError::UnknownChipset(info.devid)),
        None => Err(DrmError::NotIntel),
    }
}

/// Chipset id of the last recognized intel device in this process
pub fn detected_device_id() -> Option<u32> {
    match DETECTED_DEVICE_ID.load(Ordering::Relaxed) {
        0 => None,
        id => Some(id),
    }
}
