//! Fixed-layout HID report bodies.
//!
//! Every exchange with the controller is one of four reports, selected by
//! the leading report-ID byte:
//!
//! | ID   | Report  | Direction      | Size        |
//! |------|---------|----------------|-------------|
//! | 0xE0 | Info    | feature, in    | 64          |
//! | 0xE1 | Command | output         | 8           |
//! | 0xE2 | Write   | output         | 4 + 128     |
//! | 0xE4 | Custom  | feature, out   | 8           |

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::*;
use super::mode::FwMode;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Unexpected report id: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedReportId { expected: u8, actual: u8 },
    #[error("Invalid signature: expected 0x{expected:04X}, got 0x{actual:04X}")]
    InvalidSignature { expected: u16, actual: u16 },
    #[error("Unknown operating mode 0x{0:02X}")]
    UnknownMode(u8),
    #[error("Row payload of {actual} bytes exceeds capacity of {capacity}")]
    PayloadTooLarge { actual: usize, capacity: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed firmware info reply (report 0xE0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoReport {
    pub operating_mode: FwMode,
    pub bootloader_info: u8,
    pub bootmode_reason: u8,
    pub silicon_id: u32,
    pub bl_version: u32,
    pub image1_version: u32,
    pub image2_version: u32,
    pub image1_row: u32,
    pub image2_row: u32,
    pub device_uid: [u8; 6],
}

impl InfoReport {
    pub fn parse(buf: &[u8]) -> Result<Self, ReportError> {
        if buf.len() < INFO_LAYOUT_SIZE {
            return Err(ReportError::BufferTooSmall {
                expected: INFO_LAYOUT_SIZE,
                actual: buf.len(),
            });
        }
        if buf[0] != REPORT_ID_INFO {
            return Err(ReportError::UnexpectedReportId {
                expected: REPORT_ID_INFO,
                actual: buf[0],
            });
        }

        let mut cursor = Cursor::new(&buf[2..]);
        let signature = cursor.read_u16::<LittleEndian>()?;
        if signature != INFO_SIGNATURE {
            return Err(ReportError::InvalidSignature {
                expected: INFO_SIGNATURE,
                actual: signature,
            });
        }
        let mode = cursor.read_u8()?;
        let operating_mode = FwMode::from_u8(mode).ok_or(ReportError::UnknownMode(mode))?;
        let bootloader_info = cursor.read_u8()?;
        let bootmode_reason = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        let silicon_id = cursor.read_u32::<LittleEndian>()?;
        let bl_version = cursor.read_u32::<LittleEndian>()?;
        let _bl_version_reserved = cursor.read_u32::<LittleEndian>()?;
        let image1_version = cursor.read_u32::<LittleEndian>()?;
        let _image1_version_reserved = cursor.read_u32::<LittleEndian>()?;
        let image2_version = cursor.read_u32::<LittleEndian>()?;
        let _image2_version_reserved = cursor.read_u32::<LittleEndian>()?;
        let image1_row = cursor.read_u32::<LittleEndian>()?;
        let image2_row = cursor.read_u32::<LittleEndian>()?;
        let mut device_uid = [0u8; 6];
        std::io::Read::read_exact(&mut cursor, &mut device_uid)?;

        Ok(Self {
            operating_mode,
            bootloader_info,
            bootmode_reason,
            silicon_id,
            bl_version,
            image1_version,
            image2_version,
            image1_row,
            image2_row,
            device_uid,
        })
    }

    /// Base version of the image running in `mode`, if it is an application.
    pub fn image_version(&self, mode: FwMode) -> Option<u32> {
        match mode {
            FwMode::Boot => None,
            FwMode::Fw1 => Some(self.image1_version),
            FwMode::Fw2 => Some(self.image2_version),
        }
    }
}

/// Command report (0xE1): `[id, opcode, arg, 0x00, 0xCC x4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandReport {
    pub opcode: u8,
    pub arg: u8,
}

impl CommandReport {
    pub const SIZE: usize = COMMAND_REPORT_SIZE;

    pub fn new(opcode: u8, arg: u8) -> Self {
        Self { opcode, arg }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = REPORT_ID_COMMAND;
        buf[1] = self.opcode;
        buf[2] = self.arg;
        buf[3] = 0x00;
        buf[4..8].copy_from_slice(&COMMAND_PADDING);
        buf
    }
}

/// Row write report (0xE2).
#[derive(Clone, PartialEq, Eq)]
pub struct WriteReport {
    buf: [u8; WRITE_REPORT_SIZE],
}

impl WriteReport {
    pub const SIZE: usize = WRITE_REPORT_SIZE;

    /// Build a write report; short payloads are zero-padded to the row size.
    pub fn new(pd_resp: u8, address: u16, payload: &[u8]) -> Result<Self, ReportError> {
        if payload.len() > WRITE_ROW_CAPACITY {
            return Err(ReportError::PayloadTooLarge {
                actual: payload.len(),
                capacity: WRITE_ROW_CAPACITY,
            });
        }
        let mut buf = [0u8; WRITE_REPORT_SIZE];
        buf[0] = REPORT_ID_WRITE;
        buf[1] = pd_resp;
        buf[2..4].copy_from_slice(&address.to_le_bytes());
        buf[WRITE_HEADER_SIZE..WRITE_HEADER_SIZE + payload.len()].copy_from_slice(payload);
        Ok(Self { buf })
    }

    pub fn address(&self) -> u16 {
        u16::from_le_bytes([self.buf[2], self.buf[3]])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl std::fmt::Debug for WriteReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteReport")
            .field("pd_resp", &self.buf[1])
            .field("address", &format_args!("0x{:04X}", self.address()))
            .finish()
    }
}

/// Custom report (0xE4) carrying the magic unlock signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomReport {
    pub signature: u8,
}

impl CustomReport {
    pub const SIZE: usize = CUSTOM_REPORT_SIZE;

    pub fn unlock() -> Self {
        Self {
            signature: PD_RESP_BRIDGE_MODE_CMD_SIG,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [
            REPORT_ID_CUSTOM,
            self.signature,
            0x43,
            0x59,
            0x00,
            0x00,
            0x00,
            0x0B,
        ]
    }
}
