//! Device nodes and the requests issued against them
//!
//! [`DrmDevice`] is the per-descriptor request surface the scanner, opener and
//! quiescence code are written against; [`DeviceHost`] opens nodes and loads
//! kernel modules. [`LinuxHost`] and [`DrmFile`] are the real implementations.

pub(crate) mod ioctl;
mod drm_file;

pub use drm_file::{DrmFile, LinuxHost};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

bitflags! {
    /// Cache classes the driver can be asked to drop
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DropCaches: u64 {
        /// Unbound objects
        const UNBOUND = 1 << 0;
        /// Bound objects
        const BOUND = 1 << 1;
        /// Retire completed requests
        const RETIRE = 1 << 2;
        /// Wait for active objects
        const ACTIVE = 1 << 3;
        /// Free deferred objects
        const FREED = 1 << 4;
        /// Run the shrinker over everything
        const SHRINK_ALL = 1 << 5;
        /// Wait for the GPU to idle
        const IDLE = 1 << 6;
    }
}

/// Requests issued against one open DRM descriptor
#[cfg_attr(test, mockall::automock)]
pub trait DrmDevice {
    /// Raw descriptor, for logging and diagnostics
    fn raw_fd(&self) -> RawFd;

    /// Driver name from the version request, at most
    /// [`DRIVER_NAME_LEN`](crate::mappings::DRIVER_NAME_LEN) bytes
    fn driver_name(&self) -> io::Result<String>;

    /// i915 chipset id parameter
    fn chipset_id(&self) -> io::Result<u32>;

    /// Whether a second video decode/encode engine exists
    fn has_bsd2(&self) -> io::Result<bool>;

    /// Request exclusive mode-setting privilege
    fn set_master(&self) -> io::Result<()>;

    /// Create a buffer object of `size` bytes and return its handle
    fn gem_create(&self, size: u64) -> io::Result<u32>;

    /// Write `data` into a buffer object at `offset`
    fn gem_write(&self, handle: u32, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Submit `handle` as a batch with the given execution flags
    fn execbuf(&self, handle: u32, flags: u64) -> io::Result<()>;

    /// Block until all work referencing `handle` has completed
    fn gem_sync(&self, handle: u32) -> io::Result<()>;

    /// Release a buffer object
    fn gem_close(&self, handle: u32) -> io::Result<()>;

    /// Ask the driver to drop the given caches
    fn drop_caches(&self, flags: DropCaches) -> io::Result<()>;
}

/// Opens device nodes and loads kernel modules
pub trait DeviceHost {
    /// Descriptor type handed out by this host
    type Device: DrmDevice + Send + 'static;

    /// Open a device node read-write
    fn open_node(&self, path: &Path) -> io::Result<Self::Device>;

    /// Best-effort kernel module load
    fn load_module(&self, module: &str) -> io::Result<()>;
}

/// Path template of a family of device nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTemplate {
    /// Path prefix the index is appended to
    pub prefix: PathBuf,
}

impl NodeTemplate {
    /// Template from a prefix such as `/dev/dri/card`
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Node at `index` under this template
    pub fn node(&self, index: u32) -> DeviceNode {
        DeviceNode {
            path: self.path(index),
            index,
        }
    }

    fn path(&self, index: u32) -> PathBuf {
        let mut raw = self.prefix.clone().into_os_string();
        raw.push(index.to_string());
        PathBuf::from(raw)
    }
}

/// One candidate device node, generated on demand during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    /// Rendered node path
    pub path: PathBuf,
    /// Index within its template
    pub index: u32,
}

impl std::fmt::Display for DeviceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.path.display().to_string())
    }
}
