//! Firmware container types and parsing.
//!
//! The device consumes a parsed `FirmwareImage`: silicon id, target image
//! and the ordered flash rows. Producing it from a file is the job of a
//! `ContainerParser`; `CyacdParser` handles the Cypress `.cyacd` text format.

pub(crate) mod cyacd;

pub use cyacd::CyacdParser;

use thiserror::Error;

use crate::protocol::FwMode;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Firmware file is empty")]
    Empty,
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Line {line}: invalid hex data")]
    InvalidHex { line: usize },
    #[error("Line {line}: record too short")]
    RecordTooShort { line: usize },
    #[error("Line {line}: length field says {expected} bytes, found {actual}")]
    LengthMismatch {
        line: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Line {line}: checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { line: usize, expected: u8, actual: u8 },
    #[error("Firmware contains no flash rows")]
    NoRecords,
    #[error("Cannot determine target image: {0}")]
    UnknownTargetMode(String),
    #[error("Firmware cannot target {0}")]
    InvalidTargetMode(FwMode),
}

/// One flash row, written as a single Write report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareRecord {
    pub row_address: u16,
    pub payload: Vec<u8>,
}

impl FirmwareRecord {
    pub fn new(row_address: u16, payload: Vec<u8>) -> Self {
        Self {
            row_address,
            payload,
        }
    }
}

/// A parsed firmware container. Record order is write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    silicon_id: u16,
    target_mode: FwMode,
    records: Vec<FirmwareRecord>,
}

impl FirmwareImage {
    pub fn new(
        silicon_id: u16,
        target_mode: FwMode,
        records: Vec<FirmwareRecord>,
    ) -> Result<Self, ParseError> {
        if target_mode == FwMode::Boot {
            return Err(ParseError::InvalidTargetMode(target_mode));
        }
        Ok(Self {
            silicon_id,
            target_mode,
            records,
        })
    }

    pub fn silicon_id(&self) -> u16 {
        self.silicon_id
    }

    pub fn target_mode(&self) -> FwMode {
        self.target_mode
    }

    pub fn records(&self) -> &[FirmwareRecord] {
        &self.records
    }

    /// Total payload bytes across all rows.
    pub fn payload_size(&self) -> usize {
        self.records.iter().map(|r| r.payload.len()).sum()
    }
}

/// Flash layout known from quirks; zero means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashGeometry {
    pub row_size: u32,
    pub flash_size: u32,
}

impl FlashGeometry {
    /// Number of rows in flash, if both dimensions are known.
    pub fn row_count(&self) -> Option<u32> {
        if self.row_size == 0 || self.flash_size == 0 {
            None
        } else {
            Some(self.flash_size / self.row_size)
        }
    }
}

/// Decodes a firmware file into a `FirmwareImage`.
pub trait ContainerParser: Send + Sync {
    fn parse(&self, data: &[u8], geometry: FlashGeometry) -> Result<FirmwareImage, ParseError>;
}
