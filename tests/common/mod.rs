//! Shared fixtures: a fake host with scripted device nodes
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use drmprobe::device::{DeviceHost, DrmDevice, DropCaches};
use drmprobe::lifecycle::{ExitHandler, ExitSession, SessionKind};
use drmprobe::OpenerConfig;

pub const DEV_ROOT: &str = "/fake/dri";

/// Skylake GT2
pub const SKL_DEVID: u32 = 0x1912;

/// Something the host was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Modprobe(String),
    Open(PathBuf),
}

/// State shared by the host and every descriptor it hands out
#[derive(Default)]
pub struct World {
    pub events: Mutex<Vec<Event>>,
    pub submitted: AtomicUsize,
    pub pending: AtomicUsize,
    pub waits: AtomicUsize,
    pub caches_dropped: AtomicUsize,
    pub master_held: AtomicBool,
    next_fd: AtomicI32,
}

impl World {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Open(path) => Some(path),
                Event::Modprobe(_) => None,
            })
            .collect()
    }
}

#[derive(Clone, Copy)]
struct NodeSpec {
    name: &'static str,
    devid: u32,
}

/// Host whose `/fake/dri` nodes are declared up front
pub struct FakeHost {
    nodes: HashMap<PathBuf, NodeSpec>,
    pub world: Arc<World>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            world: Arc::new(World {
                next_fd: AtomicI32::new(3),
                ..World::default()
            }),
        }
    }

    /// Legacy node `cardN` served by driver `name`
    pub fn card(mut self, index: u32, name: &'static str, devid: u32) -> Self {
        self.nodes.insert(Self::path("card", index), NodeSpec { name, devid });
        self
    }

    /// Render node `renderDN` served by driver `name`
    pub fn render(mut self, index: u32, name: &'static str, devid: u32) -> Self {
        self.nodes.insert(Self::path("renderD", index), NodeSpec { name, devid });
        self
    }

    pub fn config() -> OpenerConfig {
        OpenerConfig::with_dev_root(Path::new(DEV_ROOT))
    }

    pub fn path(prefix: &str, index: u32) -> PathBuf {
        PathBuf::from(format!("{}/{}{}", DEV_ROOT, prefix, index))
    }
}

impl DeviceHost for FakeHost {
    type Device = FakeDevice;

    fn open_node(&self, path: &Path) -> io::Result<FakeDevice> {
        self.world.events.lock().unwrap().push(Event::Open(path.to_path_buf()));
        let node = self
            .nodes
            .get(path)
            .copied()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;

        Ok(FakeDevice {
            fd: self.world.next_fd.fetch_add(1, Ordering::SeqCst),
            path: path.to_path_buf(),
            name: node.name,
            devid: node.devid,
            world: Arc::clone(&self.world),
        })
    }

    fn load_module(&self, module: &str) -> io::Result<()> {
        self.world
            .events
            .lock()
            .unwrap()
            .push(Event::Modprobe(module.to_string()));
        Ok(())
    }
}

/// Descriptor of a scripted node
#[derive(Debug)]
pub struct FakeDevice {
    pub fd: RawFd,
    pub path: PathBuf,
    name: &'static str,
    devid: u32,
    world: Arc<World>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("submitted", &self.submitted)
            .field("pending", &self.pending)
            .finish()
    }
}

impl DrmDevice for FakeDevice {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn driver_name(&self) -> io::Result<String> {
        Ok(self.name.to_string())
    }

    fn chipset_id(&self) -> io::Result<u32> {
        if self.name == "i915" {
            Ok(self.devid)
        } else {
            Err(io::Error::from_raw_os_error(libc::EINVAL))
        }
    }

    fn has_bsd2(&self) -> io::Result<bool> {
        Ok(false)
    }

    fn set_master(&self) -> io::Result<()> {
        if self.world.master_held.swap(true, Ordering::SeqCst) {
            Err(io::Error::from_raw_os_error(libc::EBUSY))
        } else {
            Ok(())
        }
    }

    fn gem_create(&self, _size: u64) -> io::Result<u32> {
        Ok(1)
    }

    fn gem_write(&self, _handle: u32, _offset: u64, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn execbuf(&self, _handle: u32, flags: u64) -> io::Result<()> {
        // render, bsd, blt and vebox
        if flags > 4 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.world.submitted.fetch_add(1, Ordering::SeqCst);
        self.world.pending.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn gem_sync(&self, _handle: u32) -> io::Result<()> {
        self.world.waits.fetch_add(1, Ordering::SeqCst);
        self.world.pending.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn gem_close(&self, _handle: u32) -> io::Result<()> {
        Ok(())
    }

    fn drop_caches(&self, _flags: DropCaches) -> io::Result<()> {
        self.world.caches_dropped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn no_hooks(_handler: &'static dyn ExitHandler) {}

/// Fresh legacy and render sessions that never touch process hooks
pub fn sessions() -> (
    &'static ExitSession<FakeDevice>,
    &'static ExitSession<FakeDevice>,
) {
    (
        Box::leak(Box::new(ExitSession::with_installer(SessionKind::Legacy, no_hooks))),
        Box::leak(Box::new(ExitSession::with_installer(SessionKind::Render, no_hooks))),
    )
}
