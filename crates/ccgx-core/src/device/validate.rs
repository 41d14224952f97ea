//! Firmware/device compatibility checks, run before any write begins.

use crate::error::{CcgxError, Result};
use crate::firmware::{FirmwareImage, FlashGeometry};

use super::DeviceIdentity;

/// Check that `image` may be flashed onto a device with `identity`.
///
/// The image must be built for this silicon and must target the image slot
/// that is not currently running. Flash geometry, when known from quirks,
/// bounds row size and row addresses.
pub fn validate_image(
    image: &FirmwareImage,
    identity: &DeviceIdentity,
    geometry: FlashGeometry,
) -> Result<()> {
    if image.silicon_id() != identity.silicon_id {
        return Err(CcgxError::NotSupported(format!(
            "silicon id mismatch, expected 0x{:x}, got 0x{:x}",
            identity.silicon_id,
            image.silicon_id()
        )));
    }

    let mode = identity.operating_mode.ok_or_else(|| {
        CcgxError::InvalidState("operating mode unknown, device not set up".into())
    })?;
    let expected = mode.alternate();
    if image.target_mode() != expected {
        return Err(CcgxError::NotSupported(format!(
            "FwMode mismatch, expected {}, got {}",
            expected,
            image.target_mode()
        )));
    }

    if geometry.row_size > 0
        && let Some(record) = image
            .records()
            .iter()
            .find(|r| r.payload.len() > geometry.row_size as usize)
    {
        return Err(CcgxError::InvalidArgument(format!(
            "row 0x{:04x} has {} bytes, flash row size is {}",
            record.row_address,
            record.payload.len(),
            geometry.row_size
        )));
    }

    if let Some(rows) = geometry.row_count()
        && let Some(record) = image
            .records()
            .iter()
            .find(|r| r.row_address as u32 >= rows)
    {
        return Err(CcgxError::NotSupported(format!(
            "row 0x{:04x} is outside flash of {} rows",
            record.row_address, rows
        )));
    }

    Ok(())
}
