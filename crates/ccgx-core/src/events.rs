//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to follow an update without
//! tight coupling to the protocol logic.

use std::fmt;

use crate::protocol::FwMode;
use crate::state::FlashState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by the device and session.
#[derive(Debug, Clone)]
pub enum CcgxEvent {
    /// Device opened.
    DeviceConnected { vid: u16, pid: u16 },
    /// Device reset and is expected to re-enumerate.
    DeviceDisconnected,
    /// Identity read from the Info report.
    IdentityResolved {
        silicon_id: u16,
        mode: FwMode,
        version: Option<u32>,
        bootloader_version: u32,
    },
    /// Flash sequencer state changed.
    StateChanged { from: FlashState, to: FlashState },
    /// Overall progress of the running operation.
    Progress {
        step: String,
        percentage: u8,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// HID report sent or received.
    Report {
        direction: ReportDirection,
        report_id: u8,
        length: usize,
    },
    /// Update finished; device is running the new image.
    Complete,
}

/// HID report direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for ReportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportDirection::Tx => write!(f, "TX"),
            ReportDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving events.
pub trait CcgxObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &CcgxEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl CcgxObserver for NullObserver {
    fn on_event(&self, _event: &CcgxEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl CcgxObserver for TracingObserver {
    fn on_event(&self, event: &CcgxEvent) {
        match event {
            CcgxEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            CcgxEvent::DeviceDisconnected => {
                tracing::info!("Device disconnected for restart");
            }
            CcgxEvent::IdentityResolved {
                silicon_id,
                mode,
                version,
                bootloader_version,
            } => {
                tracing::info!(
                    silicon_id = %format!("0x{:04X}", silicon_id),
                    mode = %mode,
                    version = %version.map(|v| format!("0x{:08X}", v)).unwrap_or_else(|| "-".into()),
                    bootloader = %format!("0x{:08X}", bootloader_version),
                    "Identity resolved"
                );
            }
            CcgxEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "State changed");
            }
            CcgxEvent::Progress { step, percentage } => {
                tracing::debug!(step = %step, progress = %format!("{}%", percentage), "Progress");
            }
            CcgxEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            CcgxEvent::Report {
                direction,
                report_id,
                length,
            } => {
                tracing::trace!(
                    dir = %direction,
                    report_id = %format!("0x{:02X}", report_id),
                    len = length,
                    "HID report"
                );
            }
            CcgxEvent::Complete => {
                tracing::info!("Update complete");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Observer that keeps every event for inspection.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub events: Mutex<Vec<CcgxEvent>>,
    }

    impl RecordingObserver {
        pub fn states(&self) -> Vec<FlashState> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    CcgxEvent::StateChanged { to, .. } => Some(*to),
                    _ => None,
                })
                .collect()
        }

        pub fn percentages(&self) -> Vec<u8> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    CcgxEvent::Progress { percentage, .. } => Some(*percentage),
                    _ => None,
                })
                .collect()
        }
    }

    impl CcgxObserver for RecordingObserver {
        fn on_event(&self, event: &CcgxEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
