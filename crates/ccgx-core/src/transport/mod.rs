//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod retry;
pub mod traits;

pub use mock::{MockTransport, Transaction};
pub use nusb::NusbHidTransport;
pub use retry::RetryingTransport;
pub use traits::{HidTransport, ReportType, TransportError};
