//! Real DRM descriptors backed by `/dev/dri` nodes

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, trace};

use super::ioctl::{self, drm_ioctl, drm_ioctl_none};
use super::{DeviceHost, DrmDevice, DropCaches};
use crate::config::OpenerConfig;
use crate::mappings::DRIVER_NAME_LEN;

/// An open DRM device node
#[derive(Debug)]
pub struct DrmFile {
    file: File,
    path: PathBuf,
    debugfs_root: PathBuf,
    sysfs_char_root: PathBuf,
}

/// First minor of the render node range
const RENDER_MINOR_BASE: u32 = 128;

impl DrmFile {
    /// Open a device node read-write
    pub fn open(path: &Path, debugfs_root: &Path, sysfs_char_root: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            debugfs_root: debugfs_root.to_path_buf(),
            sysfs_char_root: sysfs_char_root.to_path_buf(),
        })
    }

    /// Node path this descriptor was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Device minor number of the node
    pub fn minor(&self) -> io::Result<u32> {
        let rdev = self.file.metadata()?.rdev();
        Ok((((rdev >> 12) & 0xffff_ff00) | (rdev & 0xff)) as u32)
    }

    /// Device major number of the node
    pub fn major(&self) -> io::Result<u32> {
        let rdev = self.file.metadata()?.rdev();
        Ok((((rdev >> 32) & 0xffff_f000) | ((rdev >> 8) & 0xfff)) as u32)
    }

    /// Minor of the primary node of this device; debugfs only has entries
    /// for primary minors, render nodes included
    pub fn primary_minor(&self) -> io::Result<u32> {
        let minor = self.minor()?;
        if minor < RENDER_MINOR_BASE {
            return Ok(minor);
        }
        primary_minor_from_sysfs(&self.sysfs_char_root, self.major()?, minor)
    }

    fn getparam(&self, param: libc::c_int) -> io::Result<libc::c_int> {
        let mut value: libc::c_int = 0;
        let mut gp = ioctl::I915GetParam {
            param,
            value: &mut value,
        };
        drm_ioctl(self.raw_fd(), ioctl::DRM_IOCTL_I915_GETPARAM, &mut gp)?;
        Ok(value)
    }
}

impl AsRawFd for DrmFile {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl DrmDevice for DrmFile {
    fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn driver_name(&self) -> io::Result<String> {
        let mut name = [0u8; DRIVER_NAME_LEN + 1];
        let mut version = ioctl::DrmVersion {
            version_major: 0,
            version_minor: 0,
            version_patchlevel: 0,
            name_len: DRIVER_NAME_LEN,
            name: name.as_mut_ptr() as *mut libc::c_char,
            date_len: 0,
            date: std::ptr::null_mut(),
            desc_len: 0,
            desc: std::ptr::null_mut(),
        };
        drm_ioctl(self.raw_fd(), ioctl::DRM_IOCTL_VERSION, &mut version)?;

        // name_len now holds the full length; only DRIVER_NAME_LEN bytes were copied
        let copied = version.name_len.min(DRIVER_NAME_LEN);
        let end = name[..copied].iter().position(|&b| b == 0).unwrap_or(copied);
        Ok(String::from_utf8_lossy(&name[..end]).into_owned())
    }

    fn chipset_id(&self) -> io::Result<u32> {
        self.getparam(ioctl::I915_PARAM_CHIPSET_ID).map(|id| id as u32)
    }

    fn has_bsd2(&self) -> io::Result<bool> {
        self.getparam(ioctl::I915_PARAM_HAS_BSD2).map(|v| v > 0)
    }

    fn set_master(&self) -> io::Result<()> {
        drm_ioctl_none(self.raw_fd(), ioctl::DRM_IOCTL_SET_MASTER)
    }

    fn gem_create(&self, size: u64) -> io::Result<u32> {
        let mut create = ioctl::GemCreate {
            size,
            ..Default::default()
        };
        drm_ioctl(self.raw_fd(), ioctl::DRM_IOCTL_I915_GEM_CREATE, &mut create)?;
        Ok(create.handle)
    }

    fn gem_write(&self, handle: u32, offset: u64, data: &[u8]) -> io::Result<()> {
        let mut pwrite = ioctl::GemPwrite {
            handle,
            offset,
            size: data.len() as u64,
            data_ptr: data.as_ptr() as u64,
            ..Default::default()
        };
        drm_ioctl(self.raw_fd(), ioctl::DRM_IOCTL_I915_GEM_PWRITE, &mut pwrite)
    }

    fn execbuf(&self, handle: u32, flags: u64) -> io::Result<()> {
        let obj = ioctl::GemExecObject2 {
            handle,
            ..Default::default()
        };
        let mut execbuf = ioctl::GemExecbuffer2 {
            buffers_ptr: &obj as *const ioctl::GemExecObject2 as u64,
            buffer_count: 1,
            flags,
            ..Default::default()
        };
        drm_ioctl(self.raw_fd(), ioctl::DRM_IOCTL_I915_GEM_EXECBUFFER2, &mut execbuf)
    }

    fn gem_sync(&self, handle: u32) -> io::Result<()> {
        let mut wait = ioctl::GemWait {
            bo_handle: handle,
            flags: 0,
            timeout_ns: -1,
        };
        if let Err(e) = drm_ioctl(self.raw_fd(), ioctl::DRM_IOCTL_I915_GEM_WAIT, &mut wait) {
            trace!("{}: gem wait failed ({}), falling back to set-domain", self.path.display(), e);
            let mut domain = ioctl::GemSetDomain {
                handle,
                read_domains: ioctl::I915_GEM_DOMAIN_GTT,
                write_domain: ioctl::I915_GEM_DOMAIN_GTT,
            };
            drm_ioctl(self.raw_fd(), ioctl::DRM_IOCTL_I915_GEM_SET_DOMAIN, &mut domain)?;
        }
        Ok(())
    }

    fn gem_close(&self, handle: u32) -> io::Result<()> {
        let mut close = ioctl::GemClose { handle, pad: 0 };
        drm_ioctl(self.raw_fd(), ioctl::DRM_IOCTL_GEM_CLOSE, &mut close)
    }

    fn drop_caches(&self, flags: DropCaches) -> io::Result<()> {
        let path = self
            .debugfs_root
            .join(self.primary_minor()?.to_string())
            .join("i915_gem_drop_caches");
        debug!("dropping caches 0x{:x} via {}", flags.bits(), path.display());
        let mut file = OpenOptions::new().write(true).open(&path)?;
        write!(file, "0x{:x}", flags.bits())
    }
}

/// Host backed by the running Linux system
#[derive(Debug, Clone)]
pub struct LinuxHost {
    modprobe: PathBuf,
    debugfs_root: PathBuf,
    sysfs_char_root: PathBuf,
}

impl LinuxHost {
    /// Host using the paths from `config`
    pub fn new(config: &OpenerConfig) -> Self {
        Self {
            modprobe: config.modprobe.clone(),
            debugfs_root: config.debugfs_root.clone(),
            sysfs_char_root: config.sysfs_char_root.clone(),
        }
    }
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self::new(&OpenerConfig::default())
    }
}

impl DeviceHost for LinuxHost {
    type Device = DrmFile;

    fn open_node(&self, path: &Path) -> io::Result<DrmFile> {
        DrmFile::open(path, &self.debugfs_root, &self.sysfs_char_root)
    }

    fn load_module(&self, module: &str) -> io::Result<()> {
        let status = Command::new(&self.modprobe).arg("-s").arg(module).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} -s {} exited with {}", self.modprobe.display(), module, status),
            ))
        }
    }
}

/// Index of the `cardN` sibling listed under
/// `<sysfs_char_root>/<major>:<minor>/device/drm`
fn primary_minor_from_sysfs(sysfs_char_root: &Path, major: u32, minor: u32) -> io::Result<u32> {
    let dir = sysfs_char_root
        .join(format!("{}:{}", major, minor))
        .join("device")
        .join("drm");

    for entry in fs::read_dir(&dir)? {
        let name = entry?.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix("card"))
            .and_then(|n| n.parse().ok());
        if let Some(index) = index {
            trace!("{}:{} belongs to card{}", major, minor, index);
            return Ok(index);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no primary node under {}", dir.display()),
    ))
}
