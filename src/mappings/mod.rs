//! Driver families, capability masks and the chipset database

pub mod intel;

// Re-exports for convenient usage
pub use intel::{intel_gen, identify_intel_chipset, ChipsetInfo, IntelChipset, INTEL_CHIPSETS};

use bitflags::bitflags;

bitflags! {
    /// Driver capabilities a caller is willing to accept.
    ///
    /// Every value has its own bit so masks can be OR'd and tested
    /// independently. `ANY` accepts every node that is not VGEM; VGEM only
    /// ever matches when asked for explicitly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct DriverMask: u32 {
        /// Intel i915 with a recognized chipset
        const INTEL = 1 << 0;
        /// Broadcom VideoCore IV
        const VC4 = 1 << 1;
        /// Virtual GEM provider
        const VGEM = 1 << 2;
        /// virtio-gpu
        const VIRTIO = 1 << 3;
        /// Anything but VGEM
        const ANY = 1 << 4;
    }
}

/// Driver families this library can recognize on a device node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DriverFamily {
    /// Intel i915
    Intel,
    /// Broadcom VideoCore IV
    Vc4,
    /// Virtual GEM provider
    Vgem,
    /// virtio-gpu
    Virtio,
}

impl DriverFamily {
    /// All families, in the order the opener tests them
    pub const ALL: [DriverFamily; 4] = [
        DriverFamily::Intel,
        DriverFamily::Vc4,
        DriverFamily::Vgem,
        DriverFamily::Virtio,
    ];

    /// Driver name as reported by the version request, truncated to
    /// [`DRIVER_NAME_LEN`] bytes
    pub fn token(self) -> &'static str {
        match self {
            DriverFamily::Intel => "i915",
            DriverFamily::Vc4 => "vc4",
            DriverFamily::Vgem => "vgem",
            DriverFamily::Virtio => "virt",
        }
    }

    /// Capability bit selecting this family
    pub fn mask(self) -> DriverMask {
        match self {
            DriverFamily::Intel => DriverMask::INTEL,
            DriverFamily::Vc4 => DriverMask::VC4,
            DriverFamily::Vgem => DriverMask::VGEM,
            DriverFamily::Virtio => DriverMask::VIRTIO,
        }
    }

    /// Look up a family from a (possibly truncated) driver name
    pub fn from_token(name: &str) -> Option<DriverFamily> {
        DriverFamily::ALL.into_iter().find(|f| f.token() == name)
    }
}

impl std::fmt::Display for DriverFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverFamily::Intel => write!(f, "Intel i915"),
            DriverFamily::Vc4 => write!(f, "Broadcom VC4"),
            DriverFamily::Vgem => write!(f, "VGEM"),
            DriverFamily::Virtio => write!(f, "virtio-gpu"),
        }
    }
}

/// Number of driver-name bytes requested from the version query
pub const DRIVER_NAME_LEN: usize = 4;

impl std::str::FromStr for DriverMask {
    type Err = crate::error::DrmError;

    /// Parse a comma separated list such as `intel,vgem` or `any`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = DriverMask::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            mask |= match part.to_ascii_lowercase().as_str() {
                "intel" | "i915" => DriverMask::INTEL,
                "vc4" => DriverMask::VC4,
                "vgem" => DriverMask::VGEM,
                "virtio" | "virt" => DriverMask::VIRTIO,
                "any" => DriverMask::ANY,
                other => {
                    return Err(crate::error::DrmError::InvalidParameter(format!(
                        "unknown driver '{}'",
                        other
                    )))
                }
            };
        }
        if mask.is_empty() {
            return Err(crate::error::DrmError::InvalidParameter(
                "empty driver mask".to_string(),
            ));
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_fit_name_buffer() {
        for family in DriverFamily::ALL {
            assert!(family.token().len() <= DRIVER_NAME_LEN);
            assert_eq!(DriverFamily::from_token(family.token()), Some(family));
        }
        assert_eq!(DriverFamily::from_token("amdg"), None);
    }

    #[test]
    fn test_parse_mask() {
        let mask: DriverMask = "intel, vgem".parse().unwrap();
        assert_eq!(mask, DriverMask::INTEL | DriverMask::VGEM);
        assert_eq!("ANY".parse::<DriverMask>().unwrap(), DriverMask::ANY);
        assert!("nouveau".parse::<DriverMask>().is_err());
        assert!("".parse::<DriverMask>().is_err());
    }

    #[test]
    fn test_any_is_distinct_from_families() {
        for family in DriverFamily::ALL {
            assert!(!DriverMask::ANY.contains(family.mask()));
        }
    }
}
