//! Opener configuration

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::device::NodeTemplate;
use crate::error::{DrmError, DrmResult};

/// Where to look for device nodes and helper tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenerConfig {
    /// Legacy (primary) node prefix
    pub card_prefix: PathBuf,
    /// Render node prefix
    pub render_prefix: PathBuf,
    /// Legacy indices tried by the opener, scanned highest first
    pub open_indices: Range<u32>,
    /// Legacy indices walked when looking up the card index
    pub scan_indices: Range<u32>,
    /// Render node indices, scanned lowest first
    pub render_indices: Range<u32>,
    /// modprobe binary used for best-effort module loads
    pub modprobe: PathBuf,
    /// debugfs directory holding one entry per primary DRM minor
    pub debugfs_root: PathBuf,
    /// sysfs directory of character devices, used to map a render node to
    /// its primary node
    pub sysfs_char_root: PathBuf,
}

impl Default for OpenerConfig {
    fn default() -> Self {
        Self {
            card_prefix: PathBuf::from("/dev/dri/card"),
            render_prefix: PathBuf::from("/dev/dri/renderD"),
            open_indices: 0..3,
            scan_indices: 0..16,
            render_indices: 128..144,
            modprobe: PathBuf::from("/sbin/modprobe"),
            debugfs_root: PathBuf::from("/sys/kernel/debug/dri"),
            sysfs_char_root: PathBuf::from("/sys/dev/char"),
        }
    }
}

impl OpenerConfig {
    /// Configuration rooted at a different device directory, e.g. a test fixture
    pub fn with_dev_root(root: &Path) -> Self {
        Self {
            card_prefix: root.join("card"),
            render_prefix: root.join("renderD"),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: &Path) -> DrmResult<Self> {
        let file = File::open(path).map_err(DrmError::Io)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty index ranges
    pub fn validate(&self) -> DrmResult<()> {
        for (name, range) in [
            ("open_indices", &self.open_indices),
            ("scan_indices", &self.scan_indices),
            ("render_indices", &self.render_indices),
        ] {
            if range.is_empty() {
                return Err(DrmError::InvalidParameter(format!("{} is empty", name)));
            }
        }
        Ok(())
    }

    /// Legacy node template
    pub fn card_template(&self) -> NodeTemplate {
        NodeTemplate::new(&self.card_prefix)
    }

    /// Render node template
    pub fn render_template(&self) -> NodeTemplate {
        NodeTemplate::new(&self.render_prefix)
    }
}
