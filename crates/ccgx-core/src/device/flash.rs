//! Row writing and the boot-switch/reset sequence.

use tracing::{debug, info};

use crate::error::{CcgxError, Result};
use crate::events::{CcgxEvent, CcgxObserver};
use crate::firmware::FirmwareImage;
use crate::progress::Progress;
use crate::protocol::WriteReport;
use crate::protocol::constants::*;
use crate::state::{FlashState, FlashStateMachine};
use crate::transport::{HidTransport, ReportType};

use super::CcgxHidDevice;
use super::commands::{FailurePolicy, magic_unlock, send_command};

/// Write one flash row.
pub fn write_row<T: HidTransport + ?Sized>(transport: &T, address: u16, row: &[u8]) -> Result<()> {
    let report = WriteReport::new(PD_RESP_FLASH_READ_WRITE_CMD_SIG, address, row)
        .map_err(|e| CcgxError::from(e).prefix(format!("row 0x{:04x}", address)))?;
    transport
        .set_report(
            REPORT_ID_WRITE,
            report.as_bytes(),
            TRANSACTION_TIMEOUT_MS,
            ReportType::Output,
        )
        .map_err(|e| {
            CcgxError::transport(format!("write row command error: row 0x{:04x}", address), e)
        })
}

impl<T: HidTransport, O: CcgxObserver + 'static> CcgxHidDevice<T, O> {
    /// Flash `image` into `image_slot` (1 or 2), select it and reset.
    ///
    /// Any failure aborts the sequence; the target slot is then in an
    /// unknown state and a retry must start again from the unlock.
    pub fn flash_firmware_image(
        &mut self,
        image: &FirmwareImage,
        image_slot: u8,
        progress: &mut Progress,
    ) -> Result<()> {
        if !(1..=2).contains(&image_slot) {
            return Err(CcgxError::InvalidArgument(format!(
                "image slot {} is not 1 or 2",
                image_slot
            )));
        }

        let mut machine = FlashStateMachine::new(image.records().len());
        let result = self.run_flash_sequence(image, image_slot, progress, &mut machine);
        if result.is_err() {
            let from = machine.state;
            machine.fail();
            self.emit(CcgxEvent::StateChanged {
                from,
                to: FlashState::Failed,
            });
        }
        result
    }

    fn advance(&self, machine: &mut FlashStateMachine) {
        let from = machine.state;
        let to = machine.advance();
        self.emit(CcgxEvent::StateChanged { from, to });
    }

    fn run_flash_sequence(
        &mut self,
        image: &FirmwareImage,
        image_slot: u8,
        progress: &mut Progress,
        machine: &mut FlashStateMachine,
    ) -> Result<()> {
        progress.add_step("unlock", 5);
        progress.add_step("write", 90);
        progress.add_step("bootswitch", 5);

        self.advance(machine); // Unlocking
        magic_unlock(&self.transport)?;

        // unlocking can change what the device reports
        self.advance(machine); // InfoRefresh
        self.ensure_firmware_info()?;
        progress.step_done();

        self.advance(machine); // Writing
        let total = image.records().len();
        info!(rows = total, slot = image_slot, "Writing firmware rows");
        for (i, record) in image.records().iter().enumerate() {
            debug!("Writing row #{} @0x{:04x}", i, record.row_address);
            if let Err(e) = write_row(&self.transport, record.row_address, &record.payload) {
                machine.failed_row = Some(record.row_address);
                return Err(e);
            }
            machine.row_done();
            progress.set_fraction(i + 1, total);
        }
        progress.step_done();

        self.advance(machine); // BootSwitching
        send_command(
            &self.transport,
            CMD_SET_BOOT,
            image_slot,
            FailurePolicy::Propagate,
        )
        .map_err(|e| CcgxError::transport("bootswitch command error", e))?;
        progress.step_done();

        self.advance(machine); // Resetting
        send_command(
            &self.transport,
            CMD_JUMP,
            PD_RESP_DEVICE_RESET_CMD_SIG,
            FailurePolicy::Propagate,
        )
        .map_err(|e| CcgxError::transport("reset command error", e))?;

        self.advance(machine); // Done
        info!(slot = image_slot, "Reset sent, device will re-enumerate");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::events::tests::RecordingObserver;
    use crate::firmware::FirmwareRecord;
    use crate::protocol::FwMode;
    use crate::protocol::report::tests::info_reply;
    use crate::transport::MockTransport;

    type TestDevice = CcgxHidDevice<MockTransport, RecordingObserver>;

    fn device(mock: &MockTransport) -> (TestDevice, Arc<RecordingObserver>) {
        mock.set_info(&info_reply(FwMode::Fw1, 0x11B0, 0x01020300, 0, 0x42));
        let observer = Arc::new(RecordingObserver::default());
        (
            CcgxHidDevice::with_observer(mock.clone(), observer.clone()),
            observer,
        )
    }

    fn image(rows: &[u16]) -> FirmwareImage {
        let records = rows
            .iter()
            .map(|&row| FirmwareRecord::new(row, vec![row as u8; WRITE_ROW_CAPACITY]))
            .collect();
        FirmwareImage::new(0x11B0, FwMode::Fw2, records).unwrap()
    }

    #[test]
    fn test_full_sequence_order() {
        let mock = MockTransport::new();
        let (mut dev, observer) = device(&mock);
        let mut progress = Progress::new(observer.clone());

        dev.flash_firmware_image(&image(&[0x40, 0x41, 0x42]), 2, &mut progress)
            .unwrap();

        let writes = mock.set_reports(REPORT_ID_WRITE);
        let addresses: Vec<u16> = writes
            .iter()
            .map(|w| u16::from_le_bytes([w[2], w[3]]))
            .collect();
        assert_eq!(addresses, vec![0x40, 0x41, 0x42]);
        assert!(writes.iter().all(|w| w.len() == WRITE_REPORT_SIZE && w[1] == b'F'));

        assert_eq!(
            mock.commands(),
            vec![
                (CMD_MODE, b'B'),
                (CMD_FLASH, b'P'),
                (CMD_SET_BOOT, 2),
                (CMD_JUMP, b'R'),
            ]
        );
        assert_eq!(
            observer.states(),
            vec![
                FlashState::Unlocking,
                FlashState::InfoRefresh,
                FlashState::Writing,
                FlashState::BootSwitching,
                FlashState::Resetting,
                FlashState::Done,
            ]
        );
        assert_eq!(progress.percentage(), 100);
    }

    #[test]
    fn test_write_failure_stops_at_failing_row() {
        let mock = MockTransport::new();
        let (mut dev, observer) = device(&mock);
        mock.fail_report(REPORT_ID_WRITE, 1);
        let mut progress = Progress::new(observer.clone());

        let err = dev
            .flash_firmware_image(&image(&[0x40, 0x41, 0x42]), 2, &mut progress)
            .unwrap_err();

        assert!(matches!(err, CcgxError::Transport { .. }));
        assert!(err.to_string().contains("write row command error: row 0x0041"));
        // exactly one row landed, nothing after the failure was attempted
        assert_eq!(mock.set_reports(REPORT_ID_WRITE).len(), 1);
        assert_eq!(mock.failed_count(), 1);
        let opcodes: Vec<u8> = mock.commands().iter().map(|c| c.0).collect();
        assert!(!opcodes.contains(&CMD_SET_BOOT));
        assert!(!opcodes.contains(&CMD_JUMP));
        assert_eq!(observer.states().last(), Some(&FlashState::Failed));
    }

    #[test]
    fn test_bootswitch_failure() {
        let mock = MockTransport::new();
        let (mut dev, observer) = device(&mock);
        mock.fail_command(CMD_SET_BOOT);
        let mut progress = Progress::new(observer);

        let err = dev
            .flash_firmware_image(&image(&[0x40]), 1, &mut progress)
            .unwrap_err();
        assert!(err.to_string().starts_with("bootswitch command error"));
        assert!(!mock.commands().iter().any(|c| c.0 == CMD_JUMP));
    }

    #[test]
    fn test_reset_failure() {
        let mock = MockTransport::new();
        let (mut dev, observer) = device(&mock);
        mock.fail_command(CMD_JUMP);
        let mut progress = Progress::new(observer);

        let err = dev
            .flash_firmware_image(&image(&[0x40]), 1, &mut progress)
            .unwrap_err();
        assert!(err.to_string().starts_with("reset command error"));
    }

    #[test]
    fn test_unlock_failure_writes_nothing() {
        let mock = MockTransport::new();
        let (mut dev, observer) = device(&mock);
        mock.fail_report(REPORT_ID_CUSTOM, 0);
        let mut progress = Progress::new(observer);

        assert!(dev
            .flash_firmware_image(&image(&[0x40]), 2, &mut progress)
            .is_err());
        assert!(mock.set_reports(REPORT_ID_WRITE).is_empty());
    }

    #[test]
    fn test_oversized_row_is_invalid_argument() {
        let mock = MockTransport::new();
        let (mut dev, observer) = device(&mock);
        let records = vec![FirmwareRecord::new(0x40, vec![0; WRITE_ROW_CAPACITY + 1])];
        let img = FirmwareImage::new(0x11B0, FwMode::Fw2, records).unwrap();
        let mut progress = Progress::new(observer);

        let err = dev.flash_firmware_image(&img, 2, &mut progress).unwrap_err();
        assert!(matches!(err, CcgxError::InvalidArgument(_)));
        assert!(mock.set_reports(REPORT_ID_WRITE).is_empty());
    }

    #[test]
    fn test_bad_slot() {
        let mock = MockTransport::new();
        let (mut dev, observer) = device(&mock);
        let mut progress = Progress::new(observer);

        assert!(matches!(
            dev.flash_firmware_image(&image(&[0x40]), 3, &mut progress),
            Err(CcgxError::InvalidArgument(_))
        ));
        assert!(mock.transactions().is_empty());
    }

    #[test]
    fn test_row_progress() {
        let mock = MockTransport::new();
        let (mut dev, observer) = device(&mock);
        let mut progress = Progress::new(observer.clone());

        dev.flash_firmware_image(&image(&[0x40, 0x41]), 2, &mut progress)
            .unwrap();
        // unlock, two rows, bootswitch
        assert_eq!(observer.percentages(), vec![5, 50, 95, 100]);
    }
}
