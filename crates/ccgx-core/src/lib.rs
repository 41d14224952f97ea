//! CCGx-Core: firmware update for Cypress/Infineon CCGx USB-PD controllers
//! over their native HID interface.
//!
//! The controller holds two application images (FW1, FW2) plus a bootloader.
//! An update always writes the image that is not running, selects it with a
//! boot-switch command and resets the controller, which then re-enumerates
//! running the new image.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Report ids, opcodes, signatures and the report codec
//! - **Transport**: HID report transactions (nusb, mock, retry decorator)
//! - **Device**: Unlock, firmware info, validation, flash sequence, lifecycle
//! - **Firmware**: Parsed firmware images and the `.cyacd` parser
//! - **State**: Flash sequence state machine
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use ccgx_core::session::{SessionConfig, UpdateSession};
//!
//! let config = SessionConfig {
//!     product_id: Some(0x5215),
//!     firmware_path: Some("firmware.cyacd".to_string()),
//!     ..Default::default()
//! };
//!
//! let session = UpdateSession::new(config);
//! let device = session.flash().expect("update failed");
//! println!("{}", device);
//! ```

pub mod device;
pub mod error;
pub mod events;
pub mod firmware;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod updatable;

// Re-exports for convenience
pub use device::{CcgxHidDevice, DeviceFlags, DeviceIdentity, FailurePolicy, QuirkKey};
pub use error::{CcgxError, Result};
pub use events::{CcgxEvent, CcgxObserver, LogLevel, NullObserver, TracingObserver};
pub use firmware::{
    ContainerParser, CyacdParser, FirmwareImage, FirmwareRecord, FlashGeometry, ParseError,
};
pub use progress::Progress;
pub use protocol::FwMode;
pub use session::{DeviceSummary, SessionConfig, UpdateSession};
pub use state::{FlashState, FlashStateMachine};
pub use transport::{HidTransport, MockTransport, NusbHidTransport, TransportError};
pub use updatable::UpdatableDevice;
