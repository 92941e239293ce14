//! # drmprobe - DRM device selection for GPU driver tests
//!
//! Locates DRM device nodes on Linux, classifies them by kernel driver,
//! opens the one a test asked for and leaves intel devices idle, both when
//! they are handed out and when the process goes away.
//!
//! ## Features
//!
//! - **Capability masks**: ask for intel, vc4, vgem, virtio or "anything real"
//! - **Legacy and render nodes**, with render falling back to legacy
//! - **Quiescence**: flush every engine and drop driver caches
//! - **Exit sessions**: one termination handler per node kind, run once
//! - **Chipset table** covering gen2 to gen11 intel graphics
//!
//! ## Quick Start
//!
//! ```no_run
//! use drmprobe::{DriverMask, DriverOpener};
//!
//! fn main() -> Result<(), drmprobe::DrmError> {
//!     drmprobe::init();
//!     let opener = DriverOpener::system();
//!     let dev = opener.open_driver(DriverMask::INTEL)?;
//!     drmprobe::require_intel(&dev)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod mappings;
pub mod opener;
pub mod quiesce;

pub use config::OpenerConfig;
pub use device::{DeviceHost, DeviceNode, DrmDevice, DrmFile, DropCaches, LinuxHost};
pub use discovery::{detected_device_id, is_family, require_intel, DeviceScanner, NodeReport};
pub use error::{DrmError, DrmResult, FailureKind};
pub use lifecycle::{ExitSession, SessionSnapshot, SessionState};
pub use mappings::{intel_gen, identify_intel_chipset, DriverFamily, DriverMask};
pub use opener::{acquire_master, DriverOpener, LEGACY_SESSION, RENDER_SESSION};
pub use quiesce::{force_quiescent, QuiesceReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set up logging from `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs a logger.
///
/// # Example
///
/// ```no_run
/// drmprobe::init();
/// ```
pub fn init() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("warn"),
        )
        .try_init();
    }
}

/// Find the legacy index of the first intel card with a known chipset
///
/// # Example
///
/// ```no_run
/// match drmprobe::find_card_index() {
///     Ok(index) => println!("card{}", index),
///     Err(e) => eprintln!("{}", e),
/// }
/// ```
pub fn find_card_index() -> DrmResult<u32> {
    DriverOpener::system().find_card_index()
}

/// Get library information
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(version(), VERSION);
    }

    #[test]
    fn test_init_twice() {
        init();
        init();
    }

    #[test]
    fn test_system_sessions_start_uninitialized() {
        assert_eq!(LEGACY_SESSION.state(), SessionState::Uninitialized);
        assert_eq!(RENDER_SESSION.open_count(), 0);
    }
}

/// Prelude module for convenient imports
///
/// ```no_run
/// use drmprobe::prelude::*;
///
/// let dev = DriverOpener::system().open_driver(DriverMask::ANY)?;
/// # Ok::<(), DrmError>(())
/// ```
pub mod prelude {
    pub use crate::device::DrmDevice;
    pub use crate::error::{DrmError, DrmResult};
    pub use crate::mappings::{DriverFamily, DriverMask};
    pub use crate::opener::{acquire_master, DriverOpener};
    pub use crate::quiesce::force_quiescent;
    pub use crate::{init, require_intel, version};
}
