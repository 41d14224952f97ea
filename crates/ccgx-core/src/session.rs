//! Update session - high-level orchestrator for one device.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::device::CcgxHidDevice;
use crate::events::{CcgxEvent, CcgxObserver, ReportDirection, TracingObserver};
use crate::firmware::CyacdParser;
use crate::progress::Progress;
use crate::protocol::FwMode;
use crate::protocol::constants::CYPRESS_VENDOR_ID;
use crate::transport::{
    HidTransport, NusbHidTransport, ReportType, RetryingTransport, TransportError,
};
use crate::updatable::UpdatableDevice;

const DEFAULT_REPLUG_TIMEOUT_SECS: u64 = 30;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for an update session.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// USB vendor id; Cypress when unset.
    pub vendor_id: Option<u16>,
    /// USB product id; first HID device of the vendor when unset.
    pub product_id: Option<u16>,
    /// Path to the `.cyacd` firmware.
    pub firmware_path: Option<String>,
    /// Image the firmware targets, when it cannot be inferred from the file.
    pub target_mode: Option<FwMode>,
    /// How long to wait for the device to come back after reset.
    pub replug_timeout_secs: u64,
    /// Retry failed HID transactions.
    pub transaction_retries: bool,
    /// Quirk key/value pairs, e.g. `CcgxFlashSize = "0x20000"`.
    pub quirks: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn replug_timeout(&self) -> Duration {
        match self.replug_timeout_secs {
            0 => Duration::from_secs(DEFAULT_REPLUG_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

/// Snapshot of a set-up device.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub protocol: &'static str,
    pub mode: Option<FwMode>,
    pub version: Option<String>,
    pub version_bootloader: String,
    pub instance_ids: Vec<String>,
    pub quirk_instance_ids: Vec<String>,
    /// Full device dump.
    pub details: String,
}

impl DeviceSummary {
    fn from_device<T: HidTransport, O: CcgxObserver + 'static>(
        device: &CcgxHidDevice<T, O>,
    ) -> Self {
        Self {
            vendor_id: device.transport().vendor_id(),
            product_id: device.transport().product_id(),
            protocol: device.protocol(),
            mode: device.identity().operating_mode,
            version: device.version(),
            version_bootloader: device.version_bootloader(),
            instance_ids: device.instance_ids().to_vec(),
            quirk_instance_ids: device.quirk_instance_ids().to_vec(),
            details: device.to_string(),
        }
    }
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "CCGx device {:04X}:{:04X}",
            self.vendor_id, self.product_id
        )?;
        writeln!(f, "  Protocol:           {}", self.protocol)?;
        for id in &self.quirk_instance_ids {
            writeln!(f, "  QuirkId:            {}", id)?;
        }
        write!(f, "{}", self.details)
    }
}

type SessionDevice<O> = CcgxHidDevice<ObservableTransport<Box<dyn HidTransport>, O>, O>;

/// Update session - opens the device and drives it through setup, write
/// and re-enumeration.
pub struct UpdateSession<O: CcgxObserver> {
    config: SessionConfig,
    observer: Arc<O>,
}

impl UpdateSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: CcgxObserver + 'static> UpdateSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Set up the device and report what it is running.
    #[instrument(skip(self))]
    pub fn info(&self) -> Result<DeviceSummary> {
        let mut device = self.open_device()?;
        device.setup().context("Device setup failed")?;
        let summary = DeviceSummary::from_device(&device);
        device.close()?;
        Ok(summary)
    }

    /// Flash the configured firmware into the inactive image and wait for
    /// the device to come back running it.
    #[instrument(skip(self))]
    pub fn flash(&self) -> Result<DeviceSummary> {
        let path = self
            .config
            .firmware_path
            .as_deref()
            .ok_or_else(|| anyhow!("No firmware file configured"))?;
        info!(path = %path, "Loading firmware");
        let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;

        let mut device = self.open_device()?;
        device.setup().context("Device setup failed")?;
        let old_version = device.version();

        let mut progress = Progress::new(self.observer.clone());
        device.set_progress(&mut progress);

        let image = device
            .prepare_firmware(&data)
            .context("Firmware rejected")?;
        info!(
            target = %image.target_mode(),
            rows = image.records().len(),
            bytes = image.payload_size(),
            "Firmware accepted"
        );
        // no detach needed, the runtime interface takes the update directly
        progress.step_done();

        let mut write_progress = progress.child();
        device
            .write_firmware(&image, &mut write_progress)
            .context("Firmware write failed")?;
        progress.step_done();

        let vid = device.transport().vendor_id();
        let pid = device.transport().product_id();
        let remove_delay = Duration::from_millis(device.remove_delay_ms() as u64);
        device.close()?;

        let transport = self.wait_for_replug(vid, pid, remove_delay)?;
        drop(device.replace_transport(ObservableTransport::new(
            transport,
            self.observer.clone(),
        )));
        device.attach()?;
        progress.step_done();

        device
            .setup()
            .context("Device setup after restart failed")?;
        progress.step_done();

        let mode = device.identity().operating_mode;
        if mode != Some(image.target_mode()) {
            warn!(
                expected = %image.target_mode(),
                actual = ?mode,
                "Device did not boot the new image"
            );
        }
        info!(
            old = %old_version.unwrap_or_default(),
            new = %device.version().unwrap_or_default(),
            "Firmware updated"
        );
        self.observer.on_event(&CcgxEvent::Complete);

        let summary = DeviceSummary::from_device(&device);
        device.close()?;
        Ok(summary)
    }

    fn open_device(&self) -> Result<SessionDevice<O>> {
        let vid = self.config.vendor_id.unwrap_or(CYPRESS_VENDOR_ID);
        let transport = match self.config.product_id {
            Some(pid) => NusbHidTransport::open_with_ids(vid, pid)?,
            None => NusbHidTransport::open_vendor(vid)?,
        };
        self.build_device(self.wrap(transport))
    }

    fn wrap(&self, transport: NusbHidTransport) -> Box<dyn HidTransport> {
        if self.config.transaction_retries {
            Box::new(RetryingTransport::new(transport))
        } else {
            Box::new(transport)
        }
    }

    /// Create the device on `transport` and apply the configured quirks.
    fn build_device<T: HidTransport>(
        &self,
        transport: T,
    ) -> Result<CcgxHidDevice<ObservableTransport<T, O>, O>> {
        self.observer.on_event(&CcgxEvent::DeviceConnected {
            vid: transport.vendor_id(),
            pid: transport.product_id(),
        });

        let parser = CyacdParser::new().with_target_mode(self.config.target_mode);
        let mut device = CcgxHidDevice::with_observer(
            ObservableTransport::new(transport, self.observer.clone()),
            self.observer.clone(),
        )
        .with_parser(Box::new(parser));

        for (key, value) in &self.config.quirks {
            device
                .set_quirk_kv(key, value)
                .with_context(|| format!("Invalid quirk {} = {}", key, value))?;
        }
        Ok(device)
    }

    /// Wait for the reset device to drop off the bus and come back.
    fn wait_for_replug(
        &self,
        vid: u16,
        pid: u16,
        remove_delay: Duration,
    ) -> Result<Box<dyn HidTransport>> {
        info!("Device resetting, waiting for re-enumeration...");
        let start = Instant::now();
        let mut removed = false;
        while start.elapsed() < remove_delay {
            if !NusbHidTransport::is_present(vid, pid)? {
                removed = true;
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        if !removed {
            warn!(
                delay_ms = remove_delay.as_millis() as u64,
                "Device still present after remove delay, reopening anyway"
            );
        }

        let timeout = self.config.replug_timeout();
        let start = Instant::now();
        let mut poll_count = 0u64;
        loop {
            poll_count += 1;

            match NusbHidTransport::open_with_ids(vid, pid) {
                Ok(t) => {
                    info!(
                        vid = format!("{:04X}", vid),
                        pid = format!("{:04X}", pid),
                        "Device found after {} polls",
                        poll_count
                    );
                    self.observer
                        .on_event(&CcgxEvent::DeviceConnected { vid, pid });
                    return Ok(self.wrap(t));
                }
                // the interface may not be claimable right after enumeration
                Err(TransportError::DeviceNotFound { .. })
                | Err(TransportError::ClaimInterfaceFailed { .. }) => {
                    if start.elapsed() > timeout {
                        return Err(anyhow!(
                            "Timeout waiting for device after {}s",
                            timeout.as_secs()
                        ));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Transport wrapper that emits report events.
pub struct ObservableTransport<T: HidTransport, O: CcgxObserver> {
    inner: T,
    observer: Arc<O>,
}

impl<T: HidTransport, O: CcgxObserver> ObservableTransport<T, O> {
    pub fn new(inner: T, observer: Arc<O>) -> Self {
        Self { inner, observer }
    }
}

impl<T: HidTransport, O: CcgxObserver> HidTransport for ObservableTransport<T, O> {
    fn get_feature_report(
        &self,
        report_id: u8,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<(), TransportError> {
        let res = self.inner.get_feature_report(report_id, buf, timeout_ms);
        if res.is_ok() {
            self.observer.on_event(&CcgxEvent::Report {
                direction: ReportDirection::Rx,
                report_id,
                length: buf.len(),
            });
        }
        res
    }

    fn set_report(
        &self,
        report_id: u8,
        data: &[u8],
        timeout_ms: u64,
        report_type: ReportType,
    ) -> Result<(), TransportError> {
        let res = self
            .inner
            .set_report(report_id, data, timeout_ms, report_type);
        if res.is_ok() {
            self.observer.on_event(&CcgxEvent::Report {
                direction: ReportDirection::Tx,
                report_id,
                length: data.len(),
            });
        }
        res
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
