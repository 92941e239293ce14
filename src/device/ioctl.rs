//! DRM and i915 request numbers and argument layouts

use std::io;
use std::os::unix::io::RawFd;

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// DRM ioctl type ('d')
const DRM_IOCTL_BASE: u32 = 0x64;
/// First driver-private request number
const DRM_COMMAND_BASE: u32 = 0x40;

const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | (DRM_IOCTL_BASE << 8) | nr
}

const fn io(nr: u32) -> u32 {
    ioc(IOC_NONE, nr, 0)
}

const fn iow<T>(nr: u32) -> u32 {
    ioc(IOC_WRITE, nr, std::mem::size_of::<T>())
}

const fn iowr<T>(nr: u32) -> u32 {
    ioc(IOC_READ | IOC_WRITE, nr, std::mem::size_of::<T>())
}

#[repr(C)]
#[derive(Debug)]
pub struct DrmVersion {
    pub version_major: libc::c_int,
    pub version_minor: libc::c_int,
    pub version_patchlevel: libc::c_int,
    pub name_len: libc::size_t,
    pub name: *mut libc::c_char,
    pub date_len: libc::size_t,
    pub date: *mut libc::c_char,
    pub desc_len: libc::size_t,
    pub desc: *mut libc::c_char,
}

#[repr(C)]
#[derive(Debug)]
pub struct I915GetParam {
    pub param: libc::c_int,
    pub value: *mut libc::c_int,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct GemClose {
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct GemCreate {
    pub size: u64,
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct GemPwrite {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
    pub size: u64,
    pub data_ptr: u64,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct GemSetDomain {
    pub handle: u32,
    pub read_domains: u32,
    pub write_domain: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct GemWait {
    pub bo_handle: u32,
    pub flags: u32,
    pub timeout_ns: i64,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct GemExecObject2 {
    pub handle: u32,
    pub relocation_count: u32,
    pub relocs_ptr: u64,
    pub alignment: u64,
    pub offset: u64,
    pub flags: u64,
    pub rsvd1: u64,
    pub rsvd2: u64,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct GemExecbuffer2 {
    pub buffers_ptr: u64,
    pub buffer_count: u32,
    pub batch_start_offset: u32,
    pub batch_len: u32,
    pub dr1: u32,
    pub dr4: u32,
    pub num_cliprects: u32,
    pub cliprects_ptr: u64,
    pub flags: u64,
    pub rsvd1: u64,
    pub rsvd2: u64,
}

pub const DRM_IOCTL_VERSION: u32 = iowr::<DrmVersion>(0x00);
pub const DRM_IOCTL_GEM_CLOSE: u32 = iow::<GemClose>(0x09);
pub const DRM_IOCTL_SET_MASTER: u32 = io(0x1e);

pub const DRM_IOCTL_I915_GETPARAM: u32 = iowr::<I915GetParam>(DRM_COMMAND_BASE + 0x06);
pub const DRM_IOCTL_I915_GEM_CREATE: u32 = iowr::<GemCreate>(DRM_COMMAND_BASE + 0x1b);
pub const DRM_IOCTL_I915_GEM_PWRITE: u32 = iow::<GemPwrite>(DRM_COMMAND_BASE + 0x1d);
pub const DRM_IOCTL_I915_GEM_SET_DOMAIN: u32 = iow::<GemSetDomain>(DRM_COMMAND_BASE + 0x1f);
pub const DRM_IOCTL_I915_GEM_EXECBUFFER2: u32 = iow::<GemExecbuffer2>(DRM_COMMAND_BASE + 0x29);
pub const DRM_IOCTL_I915_GEM_WAIT: u32 = iowr::<GemWait>(DRM_COMMAND_BASE + 0x2c);

pub const I915_PARAM_CHIPSET_ID: libc::c_int = 4;
pub const I915_PARAM_HAS_BSD2: libc::c_int = 31;

pub const I915_GEM_DOMAIN_GTT: u32 = 0x40;

/// Submit a request, restarting it while the kernel reports EINTR or EAGAIN
pub fn drm_ioctl<T>(fd: RawFd, cmd: u32, arg: &mut T) -> io::Result<()> {
    loop {
        let ret = unsafe { libc::ioctl(fd, cmd as _, arg as *mut T) };
        if ret >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => return Err(err),
        }
    }
}

/// Submit an argument-less request
pub fn drm_ioctl_none(fd: RawFd, cmd: u32) -> io::Result<()> {
    loop {
        let ret = unsafe { libc::ioctl(fd, cmd as _, 0usize) };
        if ret >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => return Err(err),
        }
    }
}
