//! Opening a device by capability
//!
//! Legacy nodes are tried highest index first so the most recently created
//! node wins. A freshly opened intel device is idled before it is handed out,
//! and the first intel open of each session kind arms the matching exit
//! session.

use log::{debug, info, warn};

use crate::config::OpenerConfig;
use crate::device::{DeviceHost, DrmDevice, DrmFile, LinuxHost};
use crate::discovery::{is_family, matches_mask, qualifies, DeviceScanner};
use crate::error::{DrmError, DrmResult};
use crate::lifecycle::{ExitSession, ExitSetup, SessionKind};
use crate::mappings::{DriverFamily, DriverMask};
use crate::quiesce::force_quiescent;

/// Exit session for legacy nodes opened through [`DriverOpener::system`]
pub static LEGACY_SESSION: ExitSession<DrmFile> = ExitSession::new(SessionKind::Legacy);
/// Exit session for render nodes opened through [`DriverOpener::system`]
pub static RENDER_SESSION: ExitSession<DrmFile> = ExitSession::new(SessionKind::Render);

/// Picks one device node for a capability mask
pub struct DriverOpener<H: DeviceHost> {
    host: H,
    config: OpenerConfig,
    legacy: &'static ExitSession<H::Device>,
    render: &'static ExitSession<H::Device>,
}

impl DriverOpener<LinuxHost> {
    /// Opener over the real `/dev/dri` nodes with default paths
    pub fn system() -> Self {
        Self::with_config(OpenerConfig::default())
    }

    /// Opener over the real system with custom paths
    pub fn with_config(config: OpenerConfig) -> Self {
        let host = LinuxHost::new(&config);
        Self::with_sessions(host, config, &LEGACY_SESSION, &RENDER_SESSION)
    }
}

impl<H: DeviceHost> DriverOpener<H> {
    /// Opener over an arbitrary host and its own exit sessions
    pub fn with_sessions(
        host: H,
        config: OpenerConfig,
        legacy: &'static ExitSession<H::Device>,
        render: &'static ExitSession<H::Device>,
    ) -> Self {
        Self {
            host,
            config,
            legacy,
            render,
        }
    }

    /// Host used to open nodes
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Paths and index ranges in use
    pub fn config(&self) -> &OpenerConfig {
        &self.config
    }

    /// Scanner over the same host and paths
    pub fn scanner(&self) -> DeviceScanner<'_, H> {
        DeviceScanner::new(&self.host, &self.config)
    }

    /// Exit session tracking legacy opens
    pub fn legacy_session(&self) -> &'static ExitSession<H::Device> {
        self.legacy
    }

    /// Exit session tracking render opens
    pub fn render_session(&self) -> &'static ExitSession<H::Device> {
        self.render
    }

    /// Open the first legacy node satisfying `mask`, without any session
    /// bookkeeping. `None` when no node matches.
    pub fn try_open_driver(&self, mask: DriverMask) -> Option<H::Device> {
        if mask.contains(DriverMask::VGEM) {
            if let Err(e) = self.host.load_module("vgem") {
                debug!("loading vgem failed: {}", e);
            }
        }

        let indices = self.config.open_indices.clone().rev();
        self.scanner()
            .scan(&self.config.card_template(), indices, |dev| matches_mask(dev, mask))
            .map(|(node, dev)| {
                info!("opened {} for {:?}", node, mask);
                dev
            })
    }

    /// Open a legacy node satisfying `mask`.
    ///
    /// Fails with [`DrmError::NoDevice`] (a skip) when nothing matches. Only
    /// intel opens are counted by the legacy session, so opening another
    /// driver first does not stop a later intel open from arming it.
    pub fn open_driver(&self, mask: DriverMask) -> DrmResult<H::Device> {
        let dev = self.try_open_driver(mask).ok_or(DrmError::NoDevice(mask))?;
        if is_family(&dev, DriverFamily::Intel) {
            self.legacy.acquire(&dev, || self.exit_setup(&dev, mask))?;
        }
        Ok(dev)
    }

    /// Open a legacy node and become DRM master on it.
    ///
    /// On contention the freshly opened descriptor is closed along with the
    /// error. Use [`open_driver`](Self::open_driver) followed by
    /// [`acquire_master`] to keep the descriptor when master is unavailable.
    pub fn open_driver_master(&self, mask: DriverMask) -> DrmResult<H::Device> {
        let dev = self.open_driver(mask)?;
        acquire_master(&dev)?;
        Ok(dev)
    }

    /// Open an intel render node, falling back to [`open_driver`](Self::open_driver)
    /// when there is none or `mask` does not accept intel
    pub fn open_driver_render(&self, mask: DriverMask) -> DrmResult<H::Device> {
        let dev = match self.try_open_render(mask) {
            Some(dev) => dev,
            None => {
                debug!("no render node for {:?}, using legacy node", mask);
                return self.open_driver(mask);
            }
        };
        self.render.acquire(&dev, || self.exit_setup(&dev, mask))?;
        Ok(dev)
    }

    /// Legacy index of the first intel node with a known chipset
    pub fn find_card_index(&self) -> DrmResult<u32> {
        self.scanner().find_card_index()
    }

    fn try_open_render(&self, mask: DriverMask) -> Option<H::Device> {
        if !mask.intersects(DriverMask::INTEL | DriverMask::ANY) {
            return None;
        }
        self.scanner()
            .scan(
                &self.config.render_template(),
                self.config.render_indices.clone(),
                |dev| qualifies(dev, DriverFamily::Intel),
            )
            .map(|(node, dev)| {
                info!("opened {} for {:?}", node, mask);
                dev
            })
    }

    /// Idle the first intel device of a session and open its exit descriptor
    fn exit_setup(&self, primary: &H::Device, mask: DriverMask) -> DrmResult<ExitSetup<H::Device>> {
        force_quiescent(primary)?;

        Ok(match self.try_open_driver(mask) {
            Some(dev) => ExitSetup::Device(dev),
            None => {
                warn!("could not open an exit descriptor for {:?}", mask);
                ExitSetup::Unavailable
            }
        })
    }
}

/// Become DRM master on an open descriptor.
///
/// Contention is reported as [`DrmError::MasterContention`] and is not
/// retried; the descriptor stays open and usable either way.
pub fn acquire_master<D: DrmDevice + ?Sized>(dev: &D) -> DrmResult<()> {
    dev.set_master().map_err(DrmError::MasterContention)
}
