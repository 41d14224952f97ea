//! Quirk keys accepted by the device.

use std::fmt;
use std::str::FromStr;

use crate::error::{CcgxError, Result};

/// Device-specific configuration applied from the quirk database or config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuirkKey {
    /// Expected silicon id, overridden by the Info report on setup.
    SiliconId,
    /// Flash row size in bytes.
    FlashRowSize,
    /// Total flash size in bytes.
    FlashSize,
}

impl QuirkKey {
    pub fn name(self) -> &'static str {
        match self {
            QuirkKey::SiliconId => "SiliconId",
            QuirkKey::FlashRowSize => "CcgxFlashRowSize",
            QuirkKey::FlashSize => "CcgxFlashSize",
        }
    }

    /// Largest accepted value.
    pub fn max(self) -> u64 {
        match self {
            QuirkKey::SiliconId => u16::MAX as u64,
            QuirkKey::FlashRowSize | QuirkKey::FlashSize => u32::MAX as u64,
        }
    }

    /// Parse and range-check a value for this key.
    pub fn parse_value(self, value: &str) -> Result<u64> {
        let value = value.trim();
        let parsed = match value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => value.parse::<u64>(),
        }
        .map_err(|e| {
            CcgxError::InvalidArgument(format!("{}: cannot parse {:?}: {}", self, value, e))
        })?;

        if parsed > self.max() {
            return Err(CcgxError::InvalidArgument(format!(
                "{}: value {} is out of range [0, {}]",
                self,
                parsed,
                self.max()
            )));
        }
        Ok(parsed)
    }
}

impl fmt::Display for QuirkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QuirkKey {
    type Err = CcgxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SiliconId" => Ok(QuirkKey::SiliconId),
            "CcgxFlashRowSize" => Ok(QuirkKey::FlashRowSize),
            "CcgxFlashSize" => Ok(QuirkKey::FlashSize),
            other => Err(CcgxError::NotSupported(format!("quirk key {other} not supported"))),
        }
    }
}
