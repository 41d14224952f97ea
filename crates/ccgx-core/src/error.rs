//! Device-level error taxonomy.

use thiserror::Error;

use crate::firmware::ParseError;
use crate::protocol::ReportError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum CcgxError {
    /// Timeout, I/O or device gone; always fatal to the running sequence.
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: TransportError,
    },

    /// Reply too short or fields outside the expected range.
    #[error("malformed report: {0}")]
    MalformedReport(String),

    /// Firmware does not match the device.
    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("firmware parse error: {0}")]
    Parse(#[from] ParseError),
}

impl CcgxError {
    pub fn transport(context: impl Into<String>, source: TransportError) -> Self {
        CcgxError::Transport {
            context: context.into(),
            source,
        }
    }

    /// Prepend operation context, keeping the error kind.
    pub fn prefix(self, prefix: impl AsRef<str>) -> Self {
        let prefix = prefix.as_ref();
        match self {
            CcgxError::Transport { context, source } => CcgxError::Transport {
                context: format!("{prefix}: {context}"),
                source,
            },
            CcgxError::MalformedReport(msg) => {
                CcgxError::MalformedReport(format!("{prefix}: {msg}"))
            }
            CcgxError::NotSupported(msg) => CcgxError::NotSupported(format!("{prefix}: {msg}")),
            CcgxError::InvalidArgument(msg) => {
                CcgxError::InvalidArgument(format!("{prefix}: {msg}"))
            }
            CcgxError::InvalidState(msg) => CcgxError::InvalidState(format!("{prefix}: {msg}")),
            CcgxError::Parse(e) => CcgxError::Parse(e),
        }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, CcgxError::NotSupported(_))
    }
}

impl From<ReportError> for CcgxError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::PayloadTooLarge { .. } => CcgxError::InvalidArgument(e.to_string()),
            other => CcgxError::MalformedReport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CcgxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_keeps_kind() {
        let err = CcgxError::transport(
            "write row command error",
            TransportError::Timeout { timeout_ms: 5000 },
        )
        .prefix("fw write error @0x40");
        assert!(matches!(err, CcgxError::Transport { .. }));
        assert_eq!(
            err.to_string(),
            "fw write error @0x40: write row command error: Timeout after 5000ms"
        );

        let err = CcgxError::NotSupported("silicon id mismatch".into()).prefix("prepare");
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_report_error_mapping() {
        let err: CcgxError = ReportError::UnknownMode(9).into();
        assert!(matches!(err, CcgxError::MalformedReport(_)));

        let err: CcgxError = ReportError::PayloadTooLarge {
            actual: 200,
            capacity: 128,
        }
        .into();
        assert!(matches!(err, CcgxError::InvalidArgument(_)));
    }
}
