//! HID transport layer abstraction.
//!
//! Defines the `HidTransport` trait for timed report transactions,
//! allowing different implementations (nusb, mock, retry decorator).

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("No HID interface found")]
    InterfaceNotFound,

    #[error("Set report 0x{report_id:02X} failed: {message}")]
    SetReportFailed { report_id: u8, message: String },

    #[error("Get report 0x{report_id:02X} failed: {message}")]
    GetReportFailed { report_id: u8, message: String },

    #[error("Short read: expected {expected}, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Device not open")]
    NotOpen,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HID report type, as carried in the high byte of `wValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Input = 0x01,
    Output = 0x02,
    Feature = 0x03,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::Input => write!(f, "input"),
            ReportType::Output => write!(f, "output"),
            ReportType::Feature => write!(f, "feature"),
        }
    }
}

/// Abstract HID transport interface.
///
/// One handle is owned exclusively by one device instance; every call is a
/// single blocking transaction bounded by `timeout_ms`.
pub trait HidTransport: Send + Sync {
    /// Read a feature report into `buf`. `buf[0]` receives the report ID.
    fn get_feature_report(
        &self,
        report_id: u8,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<(), TransportError>;

    /// Send an output or feature report. `data[0]` is the report ID.
    fn set_report(
        &self,
        report_id: u8,
        data: &[u8],
        timeout_ms: u64,
        report_type: ReportType,
    ) -> Result<(), TransportError>;

    /// Base transport setup performed before any protocol traffic.
    fn setup(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Release the underlying handle.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

impl<T: HidTransport + ?Sized> HidTransport for Box<T> {
    fn get_feature_report(
        &self,
        report_id: u8,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<(), TransportError> {
        (**self).get_feature_report(report_id, buf, timeout_ms)
    }

    fn set_report(
        &self,
        report_id: u8,
        data: &[u8],
        timeout_ms: u64,
        report_type: ReportType,
    ) -> Result<(), TransportError> {
        (**self).set_report(report_id, data, timeout_ms, report_type)
    }

    fn setup(&mut self) -> Result<(), TransportError> {
        (**self).setup()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn vendor_id(&self) -> u16 {
        (**self).vendor_id()
    }

    fn product_id(&self) -> u16 {
        (**self).product_id()
    }
}
