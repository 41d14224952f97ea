//! Mock HID transport for testing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{HidTransport, ReportType, TransportError};
use crate::protocol::constants::REPORT_ID_COMMAND;

/// A completed HID transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    GetFeature {
        report_id: u8,
        len: usize,
    },
    SetReport {
        report_id: u8,
        report_type: ReportType,
        data: Vec<u8>,
    },
}

#[derive(Default)]
struct MockState {
    /// One-shot Info replies, served before `info`.
    info_queue: VecDeque<Vec<u8>>,
    /// Reply served on every feature read once the queue is empty.
    info: Option<Vec<u8>>,
    /// Completed transactions in order.
    log: Vec<Transaction>,
    /// Number of failed transactions.
    failed: usize,
    /// Command opcodes that always fail.
    failing_commands: HashSet<u8>,
    /// (report id, occurrence) pairs that fail once.
    failing_reports: HashSet<(u8, usize)>,
    /// Set-report attempts seen per report id.
    attempts: HashMap<u8, usize>,
    fail_get_feature: bool,
    disconnected: bool,
    setup_count: usize,
    close_count: usize,
}

/// Mock transport for unit testing protocol and sequencer logic.
///
/// Clones share state, so a test can keep a handle after moving one into
/// the device under test.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            vid: 0x04B4,
            pid: 0x5215,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Serve `reply` for every Info read.
    pub fn set_info(&self, reply: &[u8]) {
        self.lock().info = Some(reply.to_vec());
    }

    /// Serve `reply` for the next Info read only.
    pub fn queue_info(&self, reply: &[u8]) {
        self.lock().info_queue.push_back(reply.to_vec());
    }

    /// Fail every Command report carrying `opcode`.
    pub fn fail_command(&self, opcode: u8) {
        self.lock().failing_commands.insert(opcode);
    }

    /// Fail the `occurrence`-th (0-based) set-report of `report_id`.
    pub fn fail_report(&self, report_id: u8, occurrence: usize) {
        self.lock().failing_reports.insert((report_id, occurrence));
    }

    /// Fail all feature reads.
    pub fn fail_get_feature(&self) {
        self.lock().fail_get_feature = true;
    }

    /// Get all completed transactions.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().log.clone()
    }

    /// Payloads of completed set-reports for one report id.
    pub fn set_reports(&self, report_id: u8) -> Vec<Vec<u8>> {
        self.lock()
            .log
            .iter()
            .filter_map(|t| match t {
                Transaction::SetReport {
                    report_id: id,
                    data,
                    ..
                } if *id == report_id => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Opcodes of completed Command reports, in order.
    pub fn commands(&self) -> Vec<(u8, u8)> {
        self.set_reports(REPORT_ID_COMMAND)
            .iter()
            .map(|data| (data[1], data[2]))
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.lock().failed
    }

    pub fn setup_count(&self) -> usize {
        self.lock().setup_count
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        self.lock().disconnected = false;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HidTransport for MockTransport {
    fn get_feature_report(
        &self,
        report_id: u8,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.disconnected {
            state.failed += 1;
            return Err(TransportError::Disconnected);
        }
        if state.fail_get_feature {
            state.failed += 1;
            return Err(TransportError::Timeout { timeout_ms });
        }
        let reply = match state.info_queue.pop_front().or_else(|| state.info.clone()) {
            Some(reply) => reply,
            None => {
                state.failed += 1;
                return Err(TransportError::Timeout { timeout_ms });
            }
        };
        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        state.log.push(Transaction::GetFeature {
            report_id,
            len: buf.len(),
        });
        Ok(())
    }

    fn set_report(
        &self,
        report_id: u8,
        data: &[u8],
        timeout_ms: u64,
        report_type: ReportType,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.disconnected {
            state.failed += 1;
            return Err(TransportError::Disconnected);
        }

        let occurrence = {
            let count = state.attempts.entry(report_id).or_insert(0);
            let current = *count;
            *count += 1;
            current
        };
        let failing_command = report_id == REPORT_ID_COMMAND
            && data
                .get(1)
                .is_some_and(|op| state.failing_commands.contains(op));
        if failing_command || state.failing_reports.remove(&(report_id, occurrence)) {
            state.failed += 1;
            return Err(TransportError::Timeout { timeout_ms });
        }

        state.log.push(Transaction::SetReport {
            report_id,
            report_type,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn setup(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.setup_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.lock().close_count += 1;
        Ok(())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_info_replies() {
        let mock = MockTransport::new();
        mock.set_info(&[0xE0, 1]);
        mock.queue_info(&[0xE0, 2]);

        let mut buf = [0u8; 4];
        mock.get_feature_report(0xE0, &mut buf, 100).unwrap();
        assert_eq!(buf, [0xE0, 2, 0, 0]);
        mock.get_feature_report(0xE0, &mut buf, 100).unwrap();
        assert_eq!(buf, [0xE0, 1, 0, 0]);
    }

    #[test]
    fn test_mock_without_info_times_out() {
        let mock = MockTransport::new();
        let mut buf = [0u8; 4];
        assert!(matches!(
            mock.get_feature_report(0xE0, &mut buf, 100),
            Err(TransportError::Timeout { timeout_ms: 100 })
        ));
    }

    #[test]
    fn test_mock_fails_selected_occurrence() {
        let mock = MockTransport::new();
        mock.fail_report(0xE2, 1);

        assert!(mock.set_report(0xE2, &[0xE2], 100, ReportType::Output).is_ok());
        assert!(mock.set_report(0xE2, &[0xE2], 100, ReportType::Output).is_err());
        assert!(mock.set_report(0xE2, &[0xE2], 100, ReportType::Output).is_ok());
        assert_eq!(mock.set_reports(0xE2).len(), 2);
        assert_eq!(mock.failed_count(), 1);
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.disconnect();
        assert!(mock.set_report(0xE1, &[0xE1], 100, ReportType::Output).is_err());
        mock.reconnect();
        assert!(mock.set_report(0xE1, &[0xE1], 100, ReportType::Output).is_ok());
    }
}
