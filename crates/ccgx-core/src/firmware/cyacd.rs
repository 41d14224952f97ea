//! Cypress `.cyacd` firmware parser.
//!
//! Text format, one item per line:
//!
//! ```text
//! 1D0011AA0000           header: silicon id (u32 BE), revision, checksum type
//! :000030008000...C4     record: array id, row (u16 BE), length (u16 BE), data, checksum
//! ```
//!
//! The record checksum is the two's complement of the sum of every byte
//! before it.

use tracing::debug;

use super::{ContainerParser, FirmwareImage, FirmwareRecord, FlashGeometry, ParseError};
use crate::protocol::FwMode;

/// array id + row + length
const RECORD_HEADER_SIZE: usize = 5;
const HEADER_HEX_LEN: usize = 12;

#[derive(Debug, Clone, Default)]
pub struct CyacdParser {
    target_mode: Option<FwMode>,
}

impl CyacdParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `mode` instead of inferring the target from the metadata row.
    pub fn with_target_mode(mut self, mode: Option<FwMode>) -> Self {
        self.target_mode = mode;
        self
    }

    fn parse_header(line: &str) -> Result<u16, ParseError> {
        if line.len() < HEADER_HEX_LEN {
            return Err(ParseError::InvalidHeader(format!(
                "expected {} hex digits, got {}",
                HEADER_HEX_LEN,
                line.len()
            )));
        }
        let bytes = line
            .get(..HEADER_HEX_LEN)
            .and_then(|digits| hex::decode(digits).ok())
            .ok_or_else(|| ParseError::InvalidHeader("not hex".into()))?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn parse_record(line: &str, line_no: usize) -> Result<FirmwareRecord, ParseError> {
        let bytes = hex::decode(line).map_err(|_| ParseError::InvalidHex { line: line_no })?;
        if bytes.len() < RECORD_HEADER_SIZE + 1 {
            return Err(ParseError::RecordTooShort { line: line_no });
        }

        let row = u16::from_be_bytes([bytes[1], bytes[2]]);
        let len = u16::from_be_bytes([bytes[3], bytes[4]]) as usize;
        let data = &bytes[RECORD_HEADER_SIZE..bytes.len() - 1];
        if data.len() != len {
            return Err(ParseError::LengthMismatch {
                line: line_no,
                expected: len,
                actual: data.len(),
            });
        }

        let (body, checksum) = bytes.split_at(bytes.len() - 1);
        let expected = body
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b))
            .wrapping_neg();
        if expected != checksum[0] {
            return Err(ParseError::ChecksumMismatch {
                line: line_no,
                expected,
                actual: checksum[0],
            });
        }

        Ok(FirmwareRecord::new(row, data.to_vec()))
    }

    /// FW1 keeps its metadata in the last flash row, FW2 in the one before.
    fn infer_target_mode(
        records: &[FirmwareRecord],
        geometry: FlashGeometry,
    ) -> Result<FwMode, ParseError> {
        let rows = geometry.row_count().ok_or_else(|| {
            ParseError::UnknownTargetMode("flash geometry unknown and no target given".into())
        })?;
        let fw1_meta = rows.checked_sub(1);
        let fw2_meta = rows.checked_sub(2);

        let mut found = None;
        for record in records {
            let row = Some(record.row_address as u32);
            let mode = if row == fw1_meta {
                FwMode::Fw1
            } else if row == fw2_meta {
                FwMode::Fw2
            } else {
                continue;
            };
            if found.is_some_and(|m| m != mode) {
                return Err(ParseError::UnknownTargetMode(
                    "metadata rows for both images present".into(),
                ));
            }
            found = Some(mode);
        }
        found.ok_or_else(|| ParseError::UnknownTargetMode("no metadata row".into()))
    }
}

impl ContainerParser for CyacdParser {
    fn parse(&self, data: &[u8], geometry: FlashGeometry) -> Result<FirmwareImage, ParseError> {
        let text = String::from_utf8_lossy(data);
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('@'));

        let (_, header) = lines.next().ok_or(ParseError::Empty)?;
        let silicon_id = Self::parse_header(header)?;

        let mut records = Vec::new();
        for (line_no, line) in lines {
            let hex = line
                .strip_prefix(':')
                .ok_or(ParseError::InvalidHex { line: line_no })?;
            records.push(Self::parse_record(hex, line_no)?);
        }
        if records.is_empty() {
            return Err(ParseError::NoRecords);
        }

        let target_mode = match self.target_mode {
            Some(mode) => mode,
            None => Self::infer_target_mode(&records, geometry)?,
        };

        debug!(
            silicon_id = %format!("0x{:04X}", silicon_id),
            target = %target_mode,
            rows = records.len(),
            "Parsed cyacd firmware"
        );
        FirmwareImage::new(silicon_id, target_mode, records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode one record line, checksum included.
    pub(crate) fn record_line(row: u16, data: &[u8]) -> String {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&row.to_be_bytes());
        bytes.extend_from_slice(&(data.len() as u16).to_be_bytes());
        bytes.extend_from_slice(data);
        let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        bytes.push(sum.wrapping_neg());
        let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        format!(":{}", hex)
    }

    pub(crate) fn cyacd(silicon_id: u16, rows: &[(u16, Vec<u8>)]) -> String {
        let mut out = format!("{:04X}11AA0000\n", silicon_id);
        for (row, data) in rows {
            out.push_str(&record_line(*row, data));
            out.push('\n');
        }
        out
    }

    const GEOMETRY: FlashGeometry = FlashGeometry {
        row_size: 128,
        flash_size: 0x20000,
    };

    #[test]
    fn test_parse_with_explicit_target() {
        let text = cyacd(0x1D00, &[(0x30, vec![1; 128]), (0x31, vec![2; 128])]);
        let parser = CyacdParser::new().with_target_mode(Some(FwMode::Fw2));
        let image = parser
            .parse(text.as_bytes(), FlashGeometry::default())
            .unwrap();

        assert_eq!(image.silicon_id(), 0x1D00);
        assert_eq!(image.target_mode(), FwMode::Fw2);
        let rows: Vec<u16> = image.records().iter().map(|r| r.row_address).collect();
        assert_eq!(rows, vec![0x30, 0x31]);
        assert_eq!(image.payload_size(), 256);
    }

    #[test]
    fn test_infer_fw1_from_last_row() {
        let text = cyacd(0x1D00, &[(0x30, vec![1; 128]), (0x3FF, vec![0; 128])]);
        let image = CyacdParser::new().parse(text.as_bytes(), GEOMETRY).unwrap();
        assert_eq!(image.target_mode(), FwMode::Fw1);
    }

    #[test]
    fn test_infer_fw2_from_second_to_last_row() {
        let text = cyacd(0x1D00, &[(0x200, vec![1; 128]), (0x3FE, vec![0; 128])]);
        let image = CyacdParser::new().parse(text.as_bytes(), GEOMETRY).unwrap();
        assert_eq!(image.target_mode(), FwMode::Fw2);
    }

    #[test]
    fn test_infer_needs_geometry() {
        let text = cyacd(0x1D00, &[(0x3FF, vec![0; 128])]);
        assert!(matches!(
            CyacdParser::new().parse(text.as_bytes(), FlashGeometry::default()),
            Err(ParseError::UnknownTargetMode(_))
        ));
    }

    #[test]
    fn test_bad_checksum() {
        let mut text = cyacd(0x1D00, &[(0x30, vec![1; 4])]);
        // corrupt the final checksum digit
        text.pop();
        let last = text.pop().unwrap();
        text.push(if last == '0' { '1' } else { '0' });
        text.push('\n');
        let parser = CyacdParser::new().with_target_mode(Some(FwMode::Fw1));
        assert!(matches!(
            parser.parse(text.as_bytes(), GEOMETRY),
            Err(ParseError::ChecksumMismatch { line: 2, .. })
        ));
    }

    #[test]
    fn test_length_mismatch() {
        let text = "1D0011AA0000\n:0000300004010101C8\n";
        let parser = CyacdParser::new().with_target_mode(Some(FwMode::Fw1));
        assert!(matches!(
            parser.parse(text.as_bytes(), GEOMETRY),
            Err(ParseError::LengthMismatch {
                line: 2,
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_non_ascii_is_rejected() {
        let parser = CyacdParser::new().with_target_mode(Some(FwMode::Fw1));
        assert!(matches!(
            parser.parse(b"1D0011AA000\xff\n:00003000010101CD\n", GEOMETRY),
            Err(ParseError::InvalidHeader(_))
        ));

        let text = "1D0011AA0000\n:000030\u{e9}010101CD\n";
        assert!(matches!(
            parser.parse(text.as_bytes(), GEOMETRY),
            Err(ParseError::InvalidHex { line: 2 })
        ));
    }

    #[test]
    fn test_empty_and_header_only() {
        let parser = CyacdParser::new().with_target_mode(Some(FwMode::Fw1));
        assert!(matches!(parser.parse(b"", GEOMETRY), Err(ParseError::Empty)));
        assert!(matches!(
            parser.parse(b"1D0011AA0000\n", GEOMETRY),
            Err(ParseError::NoRecords)
        ));
    }
}
