//! Uniform retry policy for HID transactions.

use std::thread;
use std::time::Duration;

use tracing::debug;

use super::traits::{HidTransport, ReportType, TransportError};
use crate::protocol::constants::{RETRY_COUNT, RETRY_DELAY_MS};

/// Transport decorator that retries every transaction with a fixed delay.
///
/// A disconnected device is never retried.
pub struct RetryingTransport<T: HidTransport> {
    inner: T,
    attempts: u32,
    delay: Duration,
}

impl<T: HidTransport> RetryingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self::with_policy(inner, RETRY_COUNT, Duration::from_millis(RETRY_DELAY_MS))
    }

    pub fn with_policy(inner: T, attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            delay,
        }
    }

    fn retry<R>(
        &self,
        mut op: impl FnMut() -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(r) => return Ok(r),
                Err(TransportError::Disconnected) => return Err(TransportError::Disconnected),
                Err(e) if attempt < self.attempts => {
                    debug!(attempt, error = %e, "Transaction failed, retrying");
                    attempt += 1;
                    thread::sleep(self.delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: HidTransport> HidTransport for RetryingTransport<T> {
    fn get_feature_report(
        &self,
        report_id: u8,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<(), TransportError> {
        self.retry(|| self.inner.get_feature_report(report_id, buf, timeout_ms))
    }

    fn set_report(
        &self,
        report_id: u8,
        data: &[u8],
        timeout_ms: u64,
        report_type: ReportType,
    ) -> Result<(), TransportError> {
        self.retry(|| {
            self.inner
                .set_report(report_id, data, timeout_ms, report_type)
        })
    }

    fn setup(&mut self) -> Result<(), TransportError> {
        self.inner.setup()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close()
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}
