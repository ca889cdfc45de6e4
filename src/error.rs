use thiserror::Error;

/// Creates an anyhow error with the current file and line number
#[macro_export]
macro_rules! file_error {
    ($($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|f| f.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*)
        )
    };
}

/// Creates an anyhow error with the current file and line number, and includes a source error
#[macro_export]
macro_rules! file_error_with_source {
    ($source:expr, $($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}: {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|f| f.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*),
            $source
        )
    };
}

/// Reasons a whole datagram is discarded before any record is looked at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty datagram")]
    Empty,

    #[error("datagram is not valid UTF-8")]
    NotUtf8,

    #[error("datagram does not start with a [XXXXXX-XXXXXX] header: {0:?}")]
    MissingHeader(String),
}

/// Reasons a single device record is dropped. Other records in the same
/// datagram are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has no type code at field {0}")]
    MissingType(usize),

    #[error("unrecognised device type code {0}")]
    UnknownType(u16),

    #[error("{layout} record needs at least {expected} fields, got {got}")]
    TooFewFields {
        layout: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("field {index} is not numeric: {value:?}")]
    InvalidNumber { index: usize, value: String },

    #[error("slot number {0} is out of range")]
    InvalidSlot(String),

    #[error("record is not enclosed in '<' and '>': {0:?}")]
    Unenclosed(String),
}
