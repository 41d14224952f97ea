//! Protocol module - CCGx native HID report definitions.

pub mod constants;
pub mod mode;
pub mod report;

pub use constants::*;
pub use mode::FwMode;
pub use report::{CommandReport, CustomReport, InfoReport, ReportError, WriteReport};
