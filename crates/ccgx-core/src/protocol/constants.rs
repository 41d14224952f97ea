//! Protocol constants for the CCGx native HID flashing interface.

// ============================================================================
// Report IDs
// ============================================================================

/// Firmware info (feature, device -> host).
pub const REPORT_ID_INFO: u8 = 0xE0;
/// Command (output).
pub const REPORT_ID_COMMAND: u8 = 0xE1;
/// Row write (output).
pub const REPORT_ID_WRITE: u8 = 0xE2;
/// Row read. Defined by the device, never issued here.
pub const REPORT_ID_READ: u8 = 0xE3;
/// Custom / magic unlock (feature).
pub const REPORT_ID_CUSTOM: u8 = 0xE4;

// ============================================================================
// Command opcodes (param1 of the Command report)
// ============================================================================

pub const CMD_JUMP: u8 = 0x01;
pub const CMD_FLASH: u8 = 0x02;
pub const CMD_SET_BOOT: u8 = 0x04;
pub const CMD_MODE: u8 = 0x06;

// ============================================================================
// PD response signatures (param2 / header byte)
// ============================================================================

pub const PD_RESP_BRIDGE_MODE_CMD_SIG: u8 = b'B';
pub const PD_RESP_ENTER_FLASHING_MODE_CMD_SIG: u8 = b'P';
pub const PD_RESP_FLASH_READ_WRITE_CMD_SIG: u8 = b'F';
pub const PD_RESP_DEVICE_RESET_CMD_SIG: u8 = b'R';

// ============================================================================
// Report sizes
// ============================================================================

/// Size of the Info feature report buffer.
pub const INFO_REPORT_SIZE: usize = 0x40;
/// Bytes of the Info report that carry the fixed firmware-info layout.
pub const INFO_LAYOUT_SIZE: usize = 60;
/// "CY" little-endian, found at offset 2 of every Info reply.
pub const INFO_SIGNATURE: u16 = 0x5943;

pub const COMMAND_REPORT_SIZE: usize = 8;
pub const CUSTOM_REPORT_SIZE: usize = 8;

/// Write report header: report id, pd response, address (u16 LE).
pub const WRITE_HEADER_SIZE: usize = 4;
/// Row payload bytes carried by one Write report.
pub const WRITE_ROW_CAPACITY: usize = 128;
pub const WRITE_REPORT_SIZE: usize = WRITE_HEADER_SIZE + WRITE_ROW_CAPACITY;

/// Trailing bytes of the Command report.
pub const COMMAND_PADDING: [u8; 4] = [0xCC; 4];

// ============================================================================
// Timing
// ============================================================================

/// Timeout applied to every HID transaction.
pub const TRANSACTION_TIMEOUT_MS: u64 = 5000;
/// Delay between attempts when transaction retry is enabled.
pub const RETRY_DELAY_MS: u64 = 30;
/// Attempts per transaction when transaction retry is enabled.
pub const RETRY_COUNT: u32 = 5;
/// Grace period for the device to disappear after reset.
pub const DEFAULT_REMOVE_DELAY_MS: u32 = 5000;

// ============================================================================
// Device identification
// ============================================================================

/// Cypress Semiconductor (Infineon) vendor ID.
pub const CYPRESS_VENDOR_ID: u16 = 0x04B4;
/// USB interface class for HID.
pub const USB_CLASS_HID: u8 = 0x03;

/// Update protocol identifier.
pub const PROTOCOL_ID: &str = "com.infineon.ccgx";
