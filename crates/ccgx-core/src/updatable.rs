//! Capability interface for devices driven by an update front end.

use crate::error::Result;
use crate::progress::Progress;

/// Entry points an update front end calls, in roughly this order:
/// `set_quirk_kv`* → `setup` → `prepare_firmware` → `write_firmware` →
/// (device re-enumerates) → `attach` → `close`.
pub trait UpdatableDevice {
    /// Parsed and validated firmware accepted by `write_firmware`.
    type Firmware;

    /// Bring the device up and read its identity.
    fn setup(&mut self) -> Result<()>;

    /// Called once the device has reappeared after a restart.
    fn attach(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Parse `data` and check it against the device.
    fn prepare_firmware(&self, data: &[u8]) -> Result<Self::Firmware>;

    fn write_firmware(&mut self, firmware: &Self::Firmware, progress: &mut Progress)
    -> Result<()>;

    /// Apply a quirk given as strings.
    fn set_quirk_kv(&mut self, key: &str, value: &str) -> Result<()>;

    /// Add the steps of a whole update to `progress`.
    fn set_progress(&self, progress: &mut Progress);
}
