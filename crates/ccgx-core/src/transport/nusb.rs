//! nusb-based HID transport using class control transfers.
//!
//! HID GET_REPORT / SET_REPORT are issued on the default control pipe,
//! addressed to the HID interface:
//! - `bmRequestType` = class | interface
//! - `wValue` = report type << 8 | report id
//! - `wIndex` = interface number

use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{HidTransport, ReportType, TransportError};
use crate::protocol::constants::USB_CLASS_HID;

const HID_REQ_GET_REPORT: u8 = 0x01;
const HID_REQ_SET_REPORT: u8 = 0x09;

/// nusb-based HID transport.
pub struct NusbHidTransport {
    interface: Option<Interface>,
    interface_number: u8,
    vid: u16,
    pid: u16,
}

impl NusbHidTransport {
    /// Open the first device matching VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    /// Open the first HID-class device from `vid`.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid)))]
    pub fn open_vendor(vid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| {
                d.vendor_id() == vid && d.interfaces().any(|i| i.class() == USB_CLASS_HID)
            })
            .ok_or(TransportError::DeviceNotFound { vid, pid: 0 })?;

        Self::open_device_info(device_info)
    }

    /// Whether a device with VID/PID is currently enumerated.
    pub fn is_present(vid: u16, pid: u16) -> Result<bool, TransportError> {
        Ok(list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .any(|d| d.vendor_id() == vid && d.product_id() == pid))
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let config = device
            .active_configuration()
            .map_err(|e| TransportError::OpenFailed(format!("Failed to get config: {}", e)))?;

        let interface_number = config
            .interface_alt_settings()
            .find(|alt| alt.class() == USB_CLASS_HID)
            .map(|alt| alt.interface_number())
            .ok_or(TransportError::InterfaceNotFound)?;

        // hid-generic usually owns the interface
        let interface = device
            .detach_and_claim_interface(interface_number)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: interface_number,
                message: e.to_string(),
            })?;

        info!(interface = interface_number, "Device opened successfully");

        Ok(Self {
            interface: Some(interface),
            interface_number,
            vid,
            pid,
        })
    }

    fn interface(&self) -> Result<&Interface, TransportError> {
        self.interface.as_ref().ok_or(TransportError::NotOpen)
    }
}

impl HidTransport for NusbHidTransport {
    #[instrument(skip(self, buf), fields(report_id = format!("0x{:02X}", report_id), len = buf.len()))]
    fn get_feature_report(
        &self,
        report_id: u8,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<(), TransportError> {
        let length = u16::try_from(buf.len()).map_err(|_| TransportError::GetReportFailed {
            report_id,
            message: format!("buffer of {} bytes too large", buf.len()),
        })?;

        let data = self
            .interface()?
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: HID_REQ_GET_REPORT,
                    value: ((ReportType::Feature as u16) << 8) | report_id as u16,
                    index: self.interface_number as u16,
                    length,
                },
                Duration::from_millis(timeout_ms),
            )
            .wait()
            .map_err(|e| TransportError::GetReportFailed {
                report_id,
                message: e.to_string(),
            })?;

        if data.len() < buf.len() {
            return Err(TransportError::ShortRead {
                expected: buf.len(),
                actual: data.len(),
            });
        }
        buf.copy_from_slice(&data[..buf.len()]);

        debug!(bytes_read = data.len(), "Get report complete");
        Ok(())
    }

    #[instrument(skip(self, data), fields(report_id = format!("0x{:02X}", report_id), len = data.len()))]
    fn set_report(
        &self,
        report_id: u8,
        data: &[u8],
        timeout_ms: u64,
        report_type: ReportType,
    ) -> Result<(), TransportError> {
        self.interface()?
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: HID_REQ_SET_REPORT,
                    value: ((report_type as u16) << 8) | report_id as u16,
                    index: self.interface_number as u16,
                    data,
                },
                Duration::from_millis(timeout_ms),
            )
            .wait()
            .map_err(|e| TransportError::SetReportFailed {
                report_id,
                message: e.to_string(),
            })?;

        debug!(bytes_written = data.len(), report_type = %report_type, "Set report complete");
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.interface.take().is_some() {
            debug!("Released HID interface");
        }
        Ok(())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
