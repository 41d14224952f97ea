//! Command reports, magic unlock and firmware info.
//!
//! The phase functions take the transport and the identity explicitly so
//! each step's inputs and outputs are visible at the call site.

use tracing::{debug, info};

use crate::error::{CcgxError, Result};
use crate::events::{CcgxEvent, CcgxObserver};
use crate::protocol::constants::*;
use crate::protocol::{CommandReport, CustomReport, InfoReport};
use crate::transport::{HidTransport, ReportType, TransportError};

use super::{CcgxHidDevice, DeviceIdentity};

/// How a failed Command transaction is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return the failure to the caller.
    Propagate,
    /// The device is known not to acknowledge this command; log and continue.
    Expected,
}

/// Send one Command report.
pub fn send_command<T: HidTransport + ?Sized>(
    transport: &T,
    opcode: u8,
    arg: u8,
    policy: FailurePolicy,
) -> std::result::Result<(), TransportError> {
    let report = CommandReport::new(opcode, arg);
    match transport.set_report(
        REPORT_ID_COMMAND,
        &report.to_bytes(),
        TRANSACTION_TIMEOUT_MS,
        ReportType::Output,
    ) {
        Ok(()) => Ok(()),
        Err(e) if policy == FailurePolicy::Expected => {
            debug!(
                opcode = %format!("0x{:02X}", opcode),
                "Expected command failure: {}", e
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Enable flashing-related commands on the HID interface.
///
/// The trailing Mode command always fails on this device family even though
/// it takes effect, so its failure is swallowed.
pub fn magic_unlock<T: HidTransport + ?Sized>(transport: &T) -> Result<()> {
    let report = CustomReport::unlock();
    transport
        .set_report(
            REPORT_ID_CUSTOM,
            &report.to_bytes(),
            TRANSACTION_TIMEOUT_MS,
            ReportType::Feature,
        )
        .map_err(|e| CcgxError::transport("magic enable command error", e))?;

    send_command(
        transport,
        CMD_MODE,
        PD_RESP_BRIDGE_MODE_CMD_SIG,
        FailurePolicy::Expected,
    )
    .map_err(|e| CcgxError::transport("bridge mode command error", e))
}

pub fn enter_flashing_mode<T: HidTransport + ?Sized>(transport: &T) -> Result<()> {
    send_command(
        transport,
        CMD_FLASH,
        PD_RESP_ENTER_FLASHING_MODE_CMD_SIG,
        FailurePolicy::Propagate,
    )
    .map_err(|e| CcgxError::transport("flashing enable command error", e))
}

/// Read the Info report, enter flashing mode and refresh `identity`.
///
/// The application version is only taken from the slot that is running;
/// in Boot mode it keeps its previous value. The bootloader version is
/// always updated.
pub fn ensure_firmware_info<T: HidTransport + ?Sized>(
    transport: &T,
    identity: &mut DeviceIdentity,
) -> Result<InfoReport> {
    let mut buf = [0u8; INFO_REPORT_SIZE];
    buf[0] = REPORT_ID_INFO;
    transport
        .get_feature_report(REPORT_ID_INFO, &mut buf, TRANSACTION_TIMEOUT_MS)
        .map_err(|e| CcgxError::transport("firmware info report error", e))?;

    enter_flashing_mode(transport)?;

    let info = InfoReport::parse(&buf)?;
    let silicon_id = u16::try_from(info.silicon_id).map_err(|_| {
        CcgxError::MalformedReport(format!(
            "silicon id 0x{:08X} does not fit 16 bits",
            info.silicon_id
        ))
    })?;

    identity.silicon_id = silicon_id;
    identity.operating_mode = Some(info.operating_mode);
    if let Some(version) = info.image_version(info.operating_mode) {
        identity.version = Some(version);
    }
    identity.bootloader_version = info.bl_version;

    info!(
        silicon_id = %format!("0x{:04X}", silicon_id),
        mode = %info.operating_mode,
        bl_version = %format!("0x{:08X}", info.bl_version),
        "Firmware info"
    );
    Ok(info)
}

impl<T: HidTransport, O: CcgxObserver + 'static> CcgxHidDevice<T, O> {
    pub fn magic_unlock(&self) -> Result<()> {
        magic_unlock(&self.transport)
    }

    pub fn enter_flashing_mode(&self) -> Result<()> {
        enter_flashing_mode(&self.transport)
    }

    /// Refresh the device identity from the controller.
    pub fn ensure_firmware_info(&mut self) -> Result<InfoReport> {
        let info = ensure_firmware_info(&self.transport, &mut self.identity)?;
        self.emit(CcgxEvent::IdentityResolved {
            silicon_id: self.identity.silicon_id,
            mode: info.operating_mode,
            version: self.identity.version,
            bootloader_version: self.identity.bootloader_version,
        });
        Ok(info)
    }
}
