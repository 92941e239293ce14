//! Systematic device node scanner

use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::{chipset_info, classify, qualifies};
use crate::config::OpenerConfig;
use crate::device::{DeviceHost, DeviceNode, DrmDevice, NodeTemplate};
use crate::error::{DrmError, DrmResult};
use crate::mappings::{identify_intel_chipset, ChipsetInfo, DriverFamily};

/// Which node template a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// `/dev/dri/cardN`
    Legacy,
    /// `/dev/dri/renderDN`
    Render,
}

/// Classification of one present device node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node that was opened
    pub node: DeviceNode,
    /// Template the node came from
    pub kind: NodeKind,
    /// Truncated driver name, when the version request succeeded
    pub driver: Option<String>,
    /// Recognized family
    pub family: Option<DriverFamily>,
    /// Chipset id and generation, intel only
    pub chipset: Option<ChipsetInfo>,
    /// Platform codename for known intel chipsets
    pub platform: Option<String>,
    /// Why the node could not be opened
    pub error: Option<String>,
    /// When the node was examined
    pub scanned_at: DateTime<Utc>,
}

/// Opens candidate nodes and classifies them
pub struct DeviceScanner<'a, H: DeviceHost> {
    host: &'a H,
    config: &'a OpenerConfig,
}

impl<'a, H: DeviceHost> DeviceScanner<'a, H> {
    /// Scanner over `host` using the paths in `config`
    pub fn new(host: &'a H, config: &'a OpenerConfig) -> Self {
        Self { host, config }
    }

    /// Open each node of `template` at `indices`, in iteration order, and
    /// return the first one `accept` approves.
    ///
    /// Nodes that cannot be opened are skipped; rejected descriptors are
    /// closed before moving on.
    pub fn scan<I, P>(
        &self,
        template: &NodeTemplate,
        indices: I,
        mut accept: P,
    ) -> Option<(DeviceNode, H::Device)>
    where
        I: IntoIterator<Item = u32>,
        P: FnMut(&H::Device) -> bool,
    {
        for index in indices {
            let node = template.node(index);
            let dev = match self.host.open_node(&node.path) {
                Ok(dev) => dev,
                Err(e) => {
                    trace!("{}: skipped ({})", node, e);
                    continue;
                }
            };

            if accept(&dev) {
                debug!("{}: accepted", node);
                return Some((node, dev));
            }
            trace!("{}: rejected", node);
        }
        None
    }

    /// Legacy index of the first intel node with a known chipset.
    ///
    /// This is the minor of the legacy node, not of a render node.
    pub fn find_card_index(&self) -> DrmResult<u32> {
        self.scan(
            &self.config.card_template(),
            self.config.scan_indices.clone(),
            |dev| qualifies(dev, DriverFamily::Intel),
        )
        .map(|(node, _)| node.index)
        .ok_or(DrmError::NotIntel)
    }

    /// Classify every present legacy and render node
    pub fn list_nodes(&self) -> Vec<NodeReport> {
        let mut reports = Vec::new();
        let templates = [
            (NodeKind::Legacy, self.config.card_template(), self.config.scan_indices.clone()),
            (NodeKind::Render, self.config.render_template(), self.config.render_indices.clone()),
        ];

        for (kind, template, indices) in templates {
            for index in indices {
                if let Some(report) = self.report(kind, template.node(index)) {
                    reports.push(report);
                }
            }
        }
        reports
    }

    fn report(&self, kind: NodeKind, node: DeviceNode) -> Option<NodeReport> {
        let mut report = NodeReport {
            node,
            kind,
            driver: None,
            family: None,
            chipset: None,
            platform: None,
            error: None,
            scanned_at: Utc::now(),
        };

        let dev = match self.host.open_node(&report.node.path) {
            Ok(dev) => dev,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                report.error = Some(e.to_string());
                return Some(report);
            }
        };

        match dev.driver_name() {
            Ok(name) => report.driver = Some(name),
            Err(e) => report.error = Some(e.to_string()),
        }
        report.family = classify(&dev);

        if report.family == Some(DriverFamily::Intel) {
            report.chipset = chipset_info(&dev);
            report.platform = report
                .chipset
                .and_then(|c| identify_intel_chipset(c.devid))
                .map(|c| c.platform.to_string());
        }
        Some(report)
    }
}
