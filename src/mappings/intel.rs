//! Intel chipset database

use serde::{Deserialize, Serialize};

/// Intel GPU chipset entry used for generation lookup
#[derive(Debug, Clone, Serialize)]
pub struct IntelChipset {
    /// PCI device id
    pub devid: u16,
    /// Platform codename
    pub platform: &'static str,
    /// Hardware generation (never 0 in the table)
    pub generation: u32,
}

/// Chipset id and the generation it maps to.
///
/// `generation == 0` means the id is not in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipsetInfo {
    /// Raw chipset id as returned by the driver
    pub devid: u32,
    /// Hardware generation, 0 when unrecognized
    pub generation: u32,
}

impl ChipsetInfo {
    /// Build from a raw chipset id
    pub fn from_devid(devid: u32) -> Self {
        Self {
            devid,
            generation: intel_gen(devid),
        }
    }

    /// True when the id maps to a known generation
    pub fn is_known(&self) -> bool {
        self.generation != 0
    }
}

macro_rules! chipsets {
    ($($platform:literal, $gen:literal => [$($id:literal),* $(,)?];)*) => {
        &[$($(IntelChipset { devid: $id, platform: $platform, generation: $gen },)*)*]
    };
}

/// Known Intel chipsets
pub const INTEL_CHIPSETS: &[IntelChipset] = chipsets! {
    "i830", 2 => [0x3577];
    "i845g", 2 => [0x2562];
    "i85x", 2 => [0x3582, 0x358e];
    "i865g", 2 => [0x2572];

    "i915g", 3 => [0x2582, 0x258a];
    "i915gm", 3 => [0x2592];
    "i945g", 3 => [0x2772];
    "i945gm", 3 => [0x27a2, 0x27ae];
    "g33", 3 => [0x29c2, 0x29b2, 0x29d2];
    "pineview", 3 => [0xa001, 0xa011];

    "i965g", 4 => [0x29a2, 0x2982, 0x2992, 0x2972];
    "i965gm", 4 => [0x2a02, 0x2a12];
    "gm45", 4 => [0x2a42];
    "g45", 4 => [0x2e02, 0x2e12, 0x2e22, 0x2e32, 0x2e42, 0x2e92];

    "ironlake", 5 => [0x0042, 0x0046];

    "sandybridge", 6 => [0x0102, 0x0112, 0x0122, 0x0106, 0x0116, 0x0126, 0x010a];

    "ivybridge", 7 => [0x0156, 0x0166, 0x0152, 0x0162, 0x015a, 0x016a];
    "valleyview", 7 => [0x0f30, 0x0f31, 0x0f32, 0x0f33, 0x0157, 0x0155];
    "haswell", 7 => [
        0x0402, 0x0412, 0x0422, 0x0406, 0x0416, 0x0426, 0x040a, 0x041a, 0x042a,
        0x0a02, 0x0a12, 0x0a22, 0x0a06, 0x0a16, 0x0a26, 0x0a0e, 0x0a1e, 0x0a2e,
        0x0d02, 0x0d12, 0x0d22, 0x0d26,
    ];

    "broadwell", 8 => [
        0x1602, 0x1606, 0x160a, 0x160b, 0x160d, 0x160e, 0x1612, 0x1616, 0x161a,
        0x161b, 0x161d, 0x161e, 0x1622, 0x1626, 0x162a, 0x162b, 0x162d, 0x162e,
    ];
    "cherryview", 8 => [0x22b0, 0x22b1, 0x22b2, 0x22b3];

    "skylake", 9 => [
        0x1902, 0x1906, 0x190a, 0x190b, 0x190e, 0x1912, 0x1913, 0x1915, 0x1916,
        0x1917, 0x191a, 0x191b, 0x191d, 0x191e, 0x1921, 0x1923, 0x1926, 0x1927,
        0x192a, 0x192b, 0x192d, 0x1932, 0x193a, 0x193b, 0x193d,
    ];
    "broxton", 9 => [0x0a84, 0x1a84, 0x1a85, 0x5a84, 0x5a85];
    "kabylake", 9 => [
        0x5902, 0x5906, 0x590b, 0x5912, 0x5916, 0x5917, 0x591b, 0x591c, 0x591d,
        0x591e, 0x5921, 0x5923, 0x5926, 0x5927, 0x593b, 0x87c0,
    ];
    "geminilake", 9 => [0x3184, 0x3185];
    "coffeelake", 9 => [
        0x3e90, 0x3e91, 0x3e92, 0x3e93, 0x3e94, 0x3e96, 0x3e98, 0x3e99, 0x3e9a,
        0x3e9b, 0x3e9c, 0x3ea0, 0x3ea5, 0x3ea6, 0x3ea7, 0x3ea8, 0x3ea9,
    ];

    "cannonlake", 10 => [0x5a40, 0x5a41, 0x5a42, 0x5a44, 0x5a49, 0x5a4a, 0x5a4c, 0x5a50, 0x5a51, 0x5a52, 0x5a54, 0x5a59, 0x5a5a, 0x5a5c];

    "icelake", 11 => [0x8a50, 0x8a51, 0x8a52, 0x8a53, 0x8a56, 0x8a57, 0x8a58, 0x8a59, 0x8a5a, 0x8a5b, 0x8a5c, 0x8a5d, 0x8a71];
    "elkhartlake", 11 => [0x4500, 0x4541, 0x4551, 0x4555, 0x4557, 0x4571];
};

/// Find the chipset entry for a PCI device id
pub fn identify_intel_chipset(devid: u32) -> Option<&'static IntelChipset> {
    let devid = u16::try_from(devid).ok()?;
    INTEL_CHIPSETS.iter().find(|c| c.devid == devid)
}

/// Hardware generation for a PCI device id, or 0 when unknown
pub fn intel_gen(devid: u32) -> u32 {
    identify_intel_chipset(devid).map_or(0, |c| c.generation)
}
