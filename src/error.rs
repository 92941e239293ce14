//! Error types for the drmprobe library

use std::io;
use thiserror::Error;

use crate::mappings::DriverMask;

/// How a failure should be treated by the test that hit it
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// The environment lacks what the test needs; skip the test
    EnvironmentAbsence,
    /// A hard requirement of the current test is not met
    PrivilegeContention,
    /// The device can no longer be trusted; abort
    DeviceUnresponsive,
}

/// Main error type for drmprobe operations
#[derive(Error, Debug)]
pub enum DrmError {
    /// No device node matched the requested capabilities
    #[error("No known gpu found (requested {0:?})")]
    NoDevice(DriverMask),

    /// The device is not an intel device with a recognized chipset
    #[error("No intel gpu found")]
    NotIntel,

    /// Chipset id does not map to a known hardware generation
    #[error("Unrecognized chipset id 0x{0:04x}")]
    UnknownChipset(u32),

    /// Another client holds DRM master
    #[error("Can't become DRM master, please check if no other DRM client is running: {0}")]
    MasterContention(io::Error),

    /// The final quiescence wait failed
    #[error("Device did not become idle: {0}")]
    Unresponsive(io::Error),

    /// The device refused the buffer used to idle it
    #[error("IOCTL execution failed: {0}")]
    IoctlFailed(io::Error),

    /// Invalid parameter or configuration
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Failed to open a device node
    #[error("Failed to open: {0}")]
    Open(io::Error),

    /// Any other I/O failure, e.g. reading a configuration file
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DrmError {
    /// Classify this error by how the calling test must react.
    ///
    /// `None` for usage and configuration errors, which say nothing about
    /// the device or the environment.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            DrmError::NoDevice(_)
            | DrmError::NotIntel
            | DrmError::UnknownChipset(_)
            | DrmError::Open(_) => Some(FailureKind::EnvironmentAbsence),
            DrmError::MasterContention(_) => Some(FailureKind::PrivilegeContention),
            DrmError::Unresponsive(_) | DrmError::IoctlFailed(_) => {
                Some(FailureKind::DeviceUnresponsive)
            }
            DrmError::InvalidParameter(_) | DrmError::Io(_) | DrmError::Json(_) => None,
        }
    }

    /// True when the failure should skip the test rather than fail it
    pub fn is_skip(&self) -> bool {
        self.kind() == Some(FailureKind::EnvironmentAbsence)
    }

    /// True when the failure must abort the whole run
    pub fn is_fatal(&self) -> bool {
        self.kind() == Some(FailureKind::DeviceUnresponsive)
    }
}

impl From<io::Error> for DrmError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => DrmError::Open(err),
            _ => DrmError::Io(err),
        }
    }
}

/// Result type for drmprobe operations
pub type DrmResult<T> = std::result::Result<T, DrmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn os(errno: i32) -> io::Error {
        io::Error::from_raw_os_error(errno)
    }

    #[rstest]
    #[case(DrmError::NoDevice(DriverMask::VC4), Some(FailureKind::EnvironmentAbsence))]
    #[case(DrmError::NotIntel, Some(FailureKind::EnvironmentAbsence))]
    #[case(DrmError::UnknownChipset(0xffff), Some(FailureKind::EnvironmentAbsence))]
    #[case(DrmError::Open(os(libc::ENOENT)), Some(FailureKind::EnvironmentAbsence))]
    #[case(DrmError::MasterContention(os(libc::EBUSY)), Some(FailureKind::PrivilegeContention))]
    #[case(DrmError::Unresponsive(os(libc::EIO)), Some(FailureKind::DeviceUnresponsive))]
    #[case(DrmError::IoctlFailed(os(libc::ENOSPC)), Some(FailureKind::DeviceUnresponsive))]
    #[case(DrmError::InvalidParameter("x".into()), None)]
    #[case(DrmError::Io(os(libc::ENOTTY)), None)]
    fn test_kinds(#[case] err: DrmError, #[case] kind: Option<FailureKind>) {
        assert_eq!(err.kind(), kind);
        assert_eq!(err.is_skip(), kind == Some(FailureKind::EnvironmentAbsence));
        assert_eq!(err.is_fatal(), kind == Some(FailureKind::DeviceUnresponsive));
    }

    #[test]
    fn test_config_errors_are_not_device_failures() {
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DrmError::from(json);
        assert_eq!(err.kind(), None);
        assert!(!err.is_skip());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let err: DrmError = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(err, DrmError::Open(_)));

        // e.g. a version request on something that is not a DRM node
        let err: DrmError = os(libc::ENOTTY).into();
        assert!(matches!(err, DrmError::Io(_)));
        assert!(!err.is_fatal());
    }
}
