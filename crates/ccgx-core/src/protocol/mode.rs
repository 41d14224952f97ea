//! Firmware operating mode of a dual-image controller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Image the controller is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FwMode {
    /// Bootloader only, no valid application image.
    Boot,
    /// Application image slot 1.
    Fw1,
    /// Application image slot 2.
    Fw2,
}

impl FwMode {
    /// Decode the `operating_mode` byte of the Info report.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FwMode::Boot),
            1 => Some(FwMode::Fw1),
            2 => Some(FwMode::Fw2),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            FwMode::Boot => 0,
            FwMode::Fw1 => 1,
            FwMode::Fw2 => 2,
        }
    }

    /// The image that must be flashed while running in this mode.
    ///
    /// Boot and FW2 both write FW1; FW1 writes FW2.
    pub fn alternate(self) -> Self {
        match self {
            FwMode::Boot | FwMode::Fw2 => FwMode::Fw1,
            FwMode::Fw1 => FwMode::Fw2,
        }
    }

    /// Slot number passed to SetBoot for an application image.
    pub fn image_slot(self) -> Option<u8> {
        match self {
            FwMode::Boot => None,
            FwMode::Fw1 => Some(1),
            FwMode::Fw2 => Some(2),
        }
    }

    /// Lowercase name, also used as the logical device id.
    pub fn as_str(self) -> &'static str {
        match self {
            FwMode::Boot => "boot",
            FwMode::Fw1 => "fw1",
            FwMode::Fw2 => "fw2",
        }
    }
}

impl fmt::Display for FwMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FwMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boot" => Ok(FwMode::Boot),
            "fw1" => Ok(FwMode::Fw1),
            "fw2" => Ok(FwMode::Fw2),
            other => Err(format!("unknown firmware mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternate() {
        assert_eq!(FwMode::Boot.alternate(), FwMode::Fw1);
        assert_eq!(FwMode::Fw1.alternate(), FwMode::Fw2);
        assert_eq!(FwMode::Fw2.alternate(), FwMode::Fw1);
    }

    #[test]
    fn test_alternate_is_involution_on_app_images() {
        for mode in [FwMode::Fw1, FwMode::Fw2] {
            assert_eq!(mode.alternate().alternate(), mode);
        }
        // Boot never comes back
        assert_ne!(FwMode::Boot.alternate().alternate(), FwMode::Boot);
    }

    #[test]
    fn test_from_u8() {
        assert_eq!(FwMode::from_u8(1), Some(FwMode::Fw1));
        assert_eq!(FwMode::from_u8(3), None);
        for mode in [FwMode::Boot, FwMode::Fw1, FwMode::Fw2] {
            assert_eq!(FwMode::from_u8(mode.as_u8()), Some(mode));
        }
    }

    #[test]
    fn test_parse_name() {
        assert_eq!("FW2".parse::<FwMode>().unwrap(), FwMode::Fw2);
        assert!("fw3".parse::<FwMode>().is_err());
    }
}
