//! CCGx dual-image controller reached through native HID reports.
//!
//! This module is split into submodules by functionality:
//! - `commands`: Command reports, magic unlock, firmware info
//! - `validate`: Firmware/device compatibility checks
//! - `flash`: Row writing and the boot-switch/reset sequence
//! - `lifecycle`: `UpdatableDevice` entry points
//! - `quirks`: Quirk keys
//! - `version`: Version formatting

pub mod commands;
pub mod flash;
mod lifecycle;
pub mod quirks;
pub mod validate;
pub mod version;

use std::fmt;
use std::sync::Arc;

use crate::error::{CcgxError, Result};
use crate::events::{CcgxEvent, CcgxObserver, LogLevel, TracingObserver};
use crate::firmware::{ContainerParser, CyacdParser, FlashGeometry};
use crate::protocol::FwMode;
use crate::protocol::constants::PROTOCOL_ID;
use crate::transport::HidTransport;

pub use commands::FailurePolicy;
pub use quirks::QuirkKey;
pub use version::version_from_u32;

/// Identity reported by the controller's Info report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub silicon_id: u16,
    /// `None` until the first Info report has been read.
    pub operating_mode: Option<FwMode>,
    /// Base version of the running application image.
    pub version: Option<u32>,
    pub bootloader_version: u32,
}

/// Externally visible device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFlags {
    pub updatable: bool,
    pub dual_image: bool,
    pub unsigned_payload: bool,
    /// Running the bootloader; any application version is an upgrade.
    pub is_bootloader: bool,
    /// The device will disappear and re-enumerate.
    pub wait_for_replug: bool,
}

impl Default for DeviceFlags {
    fn default() -> Self {
        Self {
            updatable: true,
            dual_image: true,
            unsigned_payload: true,
            is_bootloader: false,
            wait_for_replug: false,
        }
    }
}

/// A CCGx controller behind one exclusively owned HID transport.
pub struct CcgxHidDevice<T: HidTransport, O: CcgxObserver = TracingObserver> {
    transport: T,
    observer: Arc<O>,
    identity: DeviceIdentity,
    flags: DeviceFlags,
    /// Device is resetting; its handle must not be closed.
    in_restart: bool,
    flash_row_size: u32,
    flash_size: u32,
    remove_delay_ms: u32,
    logical_id: Option<String>,
    instance_ids: Vec<String>,
    quirk_instance_ids: Vec<String>,
    parser: Box<dyn ContainerParser>,
}

impl<T: HidTransport> CcgxHidDevice<T, TracingObserver> {
    /// Create a device with the default tracing observer.
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver))
    }
}

impl<T: HidTransport, O: CcgxObserver + 'static> CcgxHidDevice<T, O> {
    pub fn with_observer(transport: T, observer: Arc<O>) -> Self {
        Self {
            transport,
            observer,
            identity: DeviceIdentity::default(),
            flags: DeviceFlags::default(),
            in_restart: false,
            flash_row_size: 0,
            flash_size: 0,
            remove_delay_ms: 0,
            logical_id: None,
            instance_ids: Vec::new(),
            quirk_instance_ids: Vec::new(),
            parser: Box::new(CyacdParser::new()),
        }
    }

    /// Replace the firmware container parser.
    pub fn with_parser(mut self, parser: Box<dyn ContainerParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn is_in_restart(&self) -> bool {
        self.in_restart
    }

    pub fn protocol(&self) -> &'static str {
        PROTOCOL_ID
    }

    pub fn logical_id(&self) -> Option<&str> {
        self.logical_id.as_deref()
    }

    pub fn instance_ids(&self) -> &[String] {
        &self.instance_ids
    }

    /// Ids used only for quirk matching.
    pub fn quirk_instance_ids(&self) -> &[String] {
        &self.quirk_instance_ids
    }

    pub fn remove_delay_ms(&self) -> u32 {
        self.remove_delay_ms
    }

    pub fn set_remove_delay_ms(&mut self, delay_ms: u32) {
        self.remove_delay_ms = delay_ms;
    }

    pub fn geometry(&self) -> FlashGeometry {
        FlashGeometry {
            row_size: self.flash_row_size,
            flash_size: self.flash_size,
        }
    }

    /// Formatted application version, if known.
    pub fn version(&self) -> Option<String> {
        self.identity.version.map(version_from_u32)
    }

    pub fn version_bootloader(&self) -> String {
        version_from_u32(self.identity.bootloader_version)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Swap in the handle of a re-enumerated device, returning the old one.
    pub fn replace_transport(&mut self, transport: T) -> T {
        std::mem::replace(&mut self.transport, transport)
    }

    /// Apply one quirk key/value pair.
    pub fn apply_quirk(&mut self, key: QuirkKey, value: &str) -> Result<()> {
        let value = key.parse_value(value)?;
        match key {
            QuirkKey::SiliconId => self.identity.silicon_id = value as u16,
            QuirkKey::FlashRowSize => self.flash_row_size = value as u32,
            QuirkKey::FlashSize => self.flash_size = value as u32,
        }
        Ok(())
    }

    pub(crate) fn operating_mode(&self) -> Result<FwMode> {
        self.identity.operating_mode.ok_or_else(|| {
            CcgxError::InvalidState("operating mode unknown, device not set up".into())
        })
    }

    pub(crate) fn emit(&self, event: CcgxEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(CcgxEvent::Log {
            level,
            message: message.into(),
        });
    }
}

impl<T: HidTransport, O: CcgxObserver> fmt::Display for CcgxHidDevice<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  SiliconId:          0x{:x}", self.identity.silicon_id)?;
        match self.identity.operating_mode {
            Some(mode) => writeln!(f, "  FwMode:             {}", mode)?,
            None => writeln!(f, "  FwMode:             unknown")?,
        }
        if let Some(version) = self.identity.version {
            writeln!(f, "  Version:            {}", version_from_u32(version))?;
        }
        writeln!(
            f,
            "  VersionBootloader:  {}",
            version_from_u32(self.identity.bootloader_version)
        )?;
        if self.flash_row_size > 0 {
            writeln!(f, "  CcgxFlashRowSize:   0x{:x}", self.flash_row_size)?;
        }
        if self.flash_size > 0 {
            writeln!(f, "  CcgxFlashSize:      0x{:x}", self.flash_size)?;
        }
        for id in &self.instance_ids {
            writeln!(f, "  InstanceId:         {}", id)?;
        }
        if self.in_restart {
            writeln!(f, "  PrivateFlags:       is-in-restart")?;
        }
        Ok(())
    }
}
