//! `UpdatableDevice` entry points.

use tracing::{debug, info, instrument};

use crate::error::{CcgxError, Result};
use crate::events::{CcgxEvent, CcgxObserver, LogLevel};
use crate::firmware::FirmwareImage;
use crate::progress::Progress;
use crate::protocol::FwMode;
use crate::protocol::constants::DEFAULT_REMOVE_DELAY_MS;
use crate::transport::HidTransport;
use crate::updatable::UpdatableDevice;

use super::CcgxHidDevice;
use super::quirks::QuirkKey;
use super::validate::validate_image;

impl<T: HidTransport, O: CcgxObserver + 'static> UpdatableDevice for CcgxHidDevice<T, O> {
    type Firmware = FirmwareImage;

    #[instrument(skip(self))]
    fn setup(&mut self) -> Result<()> {
        self.transport
            .setup()
            .map_err(|e| CcgxError::transport("HID device setup error", e))?;

        self.magic_unlock()?;
        self.ensure_firmware_info()?;
        let mode = self.operating_mode()?;

        self.logical_id = Some(mode.as_str().to_string());
        self.instance_ids = vec![format!(
            "USB\\VID_{:04X}&PID_{:04X}&MODE_{}",
            self.transport.vendor_id(),
            self.transport.product_id(),
            mode.as_str().to_ascii_uppercase()
        )];
        self.quirk_instance_ids = vec![format!("CCGX\\SID_{:04X}", self.identity.silicon_id)];

        if mode == FwMode::Boot {
            // any application version is an upgrade
            self.flags.is_bootloader = true;
            self.identity.version = Some(0);
        } else {
            self.flags.is_bootloader = false;
        }

        if self.remove_delay_ms == 0 {
            self.remove_delay_ms = DEFAULT_REMOVE_DELAY_MS;
        }

        info!(
            mode = %mode,
            version = %self.version().unwrap_or_default(),
            "Device set up"
        );
        Ok(())
    }

    fn attach(&mut self) -> Result<()> {
        self.flags.wait_for_replug = false;
        self.in_restart = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.in_restart {
            debug!("Device restarting, keeping handle");
            return Ok(());
        }
        self.transport
            .close()
            .map_err(|e| CcgxError::transport("HID device close error", e))
    }

    fn prepare_firmware(&self, data: &[u8]) -> Result<FirmwareImage> {
        let geometry = self.geometry();
        let image = self.parser.parse(data, geometry)?;
        validate_image(&image, &self.identity, geometry)?;
        Ok(image)
    }

    #[instrument(skip_all)]
    fn write_firmware(&mut self, firmware: &FirmwareImage, progress: &mut Progress) -> Result<()> {
        let mode = self.operating_mode()?;
        debug!("Operating mode: {}", mode);

        // the image that is not running
        let image_slot = mode.alternate().image_slot().ok_or_else(|| {
            CcgxError::InvalidState(format!("no application image to write from {}", mode))
        })?;
        self.log(LogLevel::Info, format!("Flashing image {}", image_slot));
        self.flash_firmware_image(firmware, image_slot, progress)?;

        self.flags.wait_for_replug = true;
        self.in_restart = true;
        self.emit(CcgxEvent::DeviceDisconnected);
        Ok(())
    }

    fn set_quirk_kv(&mut self, key: &str, value: &str) -> Result<()> {
        let key: QuirkKey = key.parse()?;
        self.apply_quirk(key, value)
    }

    fn set_progress(&self, progress: &mut Progress) {
        progress.add_step("detach", 5);
        progress.add_step("write", 45);
        progress.add_step("attach", 5);
        progress.add_step("reload", 45);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::events::NullObserver;
    use crate::events::tests::RecordingObserver;
    use crate::firmware::cyacd::tests::cyacd;
    use crate::protocol::constants::*;
    use crate::protocol::report::tests::info_reply;
    use crate::transport::MockTransport;

    fn device(mock: &MockTransport) -> CcgxHidDevice<MockTransport, NullObserver> {
        CcgxHidDevice::with_observer(mock.clone(), Arc::new(NullObserver))
    }

    #[test]
    fn test_setup_fw1() {
        let mock = MockTransport::new();
        mock.set_info(&info_reply(FwMode::Fw1, 0x11B0, 0x01020300, 0, 0x42));
        let mut dev = device(&mock);

        dev.setup().unwrap();
        assert_eq!(mock.setup_count(), 1);
        assert_eq!(dev.logical_id(), Some("fw1"));
        assert_eq!(dev.instance_ids(), ["USB\\VID_04B4&PID_5215&MODE_FW1"]);
        assert_eq!(dev.quirk_instance_ids(), ["CCGX\\SID_11B0"]);
        assert_eq!(dev.version().as_deref(), Some("0.1.2.768"));
        assert!(!dev.flags().is_bootloader);
        assert_eq!(dev.remove_delay_ms(), DEFAULT_REMOVE_DELAY_MS);

        // unlock, info read, flashing mode
        assert_eq!(mock.commands(), vec![(CMD_MODE, b'B'), (CMD_FLASH, b'P')]);
    }

    #[test]
    fn test_setup_boot_forces_version_zero() {
        let mock = MockTransport::new();
        mock.set_info(&info_reply(FwMode::Boot, 0x11B0, 0x01020300, 0, 0x42));
        let mut dev = device(&mock);

        dev.setup().unwrap();
        assert!(dev.flags().is_bootloader);
        assert_eq!(dev.identity().version, Some(0));
        assert_eq!(dev.instance_ids(), ["USB\\VID_04B4&PID_5215&MODE_BOOT"]);

        // a later setup in an application image clears the marking
        mock.set_info(&info_reply(FwMode::Fw1, 0x11B0, 0x01020300, 0, 0x42));
        dev.setup().unwrap();
        assert!(!dev.flags().is_bootloader);
        assert_eq!(dev.instance_ids().len(), 1);
    }

    #[test]
    fn test_setup_keeps_configured_remove_delay() {
        let mock = MockTransport::new();
        mock.set_info(&info_reply(FwMode::Fw2, 0x11B0, 0, 0x01000000, 0));
        let mut dev = device(&mock);
        dev.set_remove_delay_ms(10_000);

        dev.setup().unwrap();
        assert_eq!(dev.remove_delay_ms(), 10_000);
    }

    #[test]
    fn test_setup_unlock_failure() {
        let mock = MockTransport::new();
        mock.set_info(&info_reply(FwMode::Fw1, 0x11B0, 0, 0, 0));
        mock.fail_report(REPORT_ID_CUSTOM, 0);
        let mut dev = device(&mock);

        let err = dev.setup().unwrap_err();
        assert!(err.to_string().starts_with("magic enable command error"));
        assert!(dev.logical_id().is_none());
    }

    #[test]
    fn test_setup_info_read_failure() {
        let mock = MockTransport::new();
        mock.set_info(&info_reply(FwMode::Fw1, 0x11B0, 0, 0, 0));
        mock.fail_get_feature();
        let mut dev = device(&mock);

        let err = dev.setup().unwrap_err();
        assert!(matches!(err, CcgxError::Transport { .. }));
        assert!(err.to_string().starts_with("firmware info report error"));
        assert!(dev.logical_id().is_none());
        assert!(dev.instance_ids().is_empty());
        // unlock went out, flashing mode never entered
        assert_eq!(mock.commands(), vec![(CMD_MODE, b'B')]);
    }

    #[test]
    fn test_prepare_firmware() {
        let mock = MockTransport::new();
        mock.set_info(&info_reply(FwMode::Fw1, 0x11B0, 0, 0, 0));
        let mut dev = device(&mock);
        dev.set_quirk_kv("CcgxFlashRowSize", "128").unwrap();
        dev.set_quirk_kv("CcgxFlashSize", "0x20000").unwrap();
        dev.setup().unwrap();

        // metadata in the second-to-last row: FW2 image
        let fw2 = cyacd(0x11B0, &[(0x200, vec![1; 128]), (0x3FE, vec![0; 128])]);
        let image = dev.prepare_firmware(fw2.as_bytes()).unwrap();
        assert_eq!(image.target_mode(), FwMode::Fw2);

        let fw1 = cyacd(0x11B0, &[(0x30, vec![1; 128]), (0x3FF, vec![0; 128])]);
        assert!(dev.prepare_firmware(fw1.as_bytes()).unwrap_err().is_not_supported());

        let other = cyacd(0x1234, &[(0x3FE, vec![0; 128])]);
        assert!(dev.prepare_firmware(other.as_bytes()).unwrap_err().is_not_supported());

        assert!(matches!(
            dev.prepare_firmware(b"not a firmware"),
            Err(CcgxError::Parse(_))
        ));
    }

    #[test]
    fn test_write_firmware_slot_dispatch() {
        for (mode, slot) in [(FwMode::Boot, 1), (FwMode::Fw2, 1), (FwMode::Fw1, 2)] {
            let mock = MockTransport::new();
            mock.set_info(&info_reply(mode, 0x11B0, 0, 0, 0));
            let mut dev = device(&mock);
            dev.setup().unwrap();

            let image = FirmwareImage::new(
                0x11B0,
                mode.alternate(),
                vec![crate::firmware::FirmwareRecord::new(0x40, vec![0; 128])],
            )
            .unwrap();
            let mut progress = Progress::new(Arc::new(NullObserver));
            dev.write_firmware(&image, &mut progress).unwrap();

            assert!(mock.commands().contains(&(CMD_SET_BOOT, slot)));
            assert!(dev.flags().wait_for_replug);
            assert!(dev.is_in_restart());
        }
    }

    #[test]
    fn test_write_firmware_before_setup() {
        let mock = MockTransport::new();
        let mut dev = device(&mock);
        let image = FirmwareImage::new(0x11B0, FwMode::Fw1, vec![]).unwrap();
        let mut progress = Progress::new(Arc::new(NullObserver));

        assert!(matches!(
            dev.write_firmware(&image, &mut progress),
            Err(CcgxError::InvalidState(_))
        ));
        assert!(mock.transactions().is_empty());
    }

    #[test]
    fn test_failed_write_leaves_markers_clear() {
        let mock = MockTransport::new();
        mock.set_info(&info_reply(FwMode::Fw1, 0x11B0, 0, 0, 0));
        let mut dev = device(&mock);
        dev.setup().unwrap();
        mock.fail_command(CMD_JUMP);

        let image = FirmwareImage::new(
            0x11B0,
            FwMode::Fw2,
            vec![crate::firmware::FirmwareRecord::new(0x40, vec![0; 128])],
        )
        .unwrap();
        let mut progress = Progress::new(Arc::new(NullObserver));
        assert!(dev.write_firmware(&image, &mut progress).is_err());
        assert!(!dev.flags().wait_for_replug);
        assert!(!dev.is_in_restart());
    }

    #[test]
    fn test_close_skipped_during_restart() {
        let mock = MockTransport::new();
        mock.set_info(&info_reply(FwMode::Fw1, 0x11B0, 0, 0, 0));
        let observer = Arc::new(RecordingObserver::default());
        let mut dev = CcgxHidDevice::with_observer(mock.clone(), observer.clone());
        dev.setup().unwrap();

        let image = FirmwareImage::new(
            0x11B0,
            FwMode::Fw2,
            vec![crate::firmware::FirmwareRecord::new(0x40, vec![0; 128])],
        )
        .unwrap();
        let mut progress = Progress::new(observer.clone());
        dev.write_firmware(&image, &mut progress).unwrap();
        assert!(
            observer
                .events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, CcgxEvent::DeviceDisconnected))
        );

        dev.close().unwrap();
        assert_eq!(mock.close_count(), 0);

        dev.attach().unwrap();
        assert!(!dev.flags().wait_for_replug);
        assert!(!dev.is_in_restart());
        dev.close().unwrap();
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_set_quirk_kv() {
        let mock = MockTransport::new();
        let mut dev = device(&mock);

        dev.set_quirk_kv("SiliconId", "0x11B0").unwrap();
        assert_eq!(dev.identity().silicon_id, 0x11B0);
        dev.set_quirk_kv("CcgxFlashRowSize", "0x80").unwrap();
        dev.set_quirk_kv("CcgxFlashSize", "131072").unwrap();
        assert_eq!(dev.geometry().row_count(), Some(0x400));

        assert!(dev.set_quirk_kv("Unknown", "1").unwrap_err().is_not_supported());
        assert!(matches!(
            dev.set_quirk_kv("SiliconId", "0x10000"),
            Err(CcgxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_progress_profile() {
        let mock = MockTransport::new();
        let dev = device(&mock);
        let observer = Arc::new(RecordingObserver::default());
        let mut progress = Progress::new(observer.clone());
        dev.set_progress(&mut progress);

        progress.step_done();
        assert_eq!(progress.current_name(), "write");
        progress.step_done();
        progress.step_done();
        assert_eq!(progress.current_name(), "reload");
        assert_eq!(observer.percentages(), vec![5, 50, 55]);
    }
}
