use std::time::Duration;

/// Severity class of a [`TagError`], used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    BadInput,
    Conflict,
    NotFound,
    Unprocessable,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Item with ID '{0}' already exists")]
    DuplicateId(String),

    #[error("Timeout: No NFC tag found within {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Tag discovery was cancelled")]
    Cancelled,

    #[error("No data could be read from the tag")]
    NoDataFound,

    #[error("No valid data found on the tag (all null bytes)")]
    AllZero,

    /// The tag now holds a partial payload.
    #[error("Write failed at block {block} after {written} blocks were written; tag contents are partial: {cause:#}")]
    WriteFailure {
        block: u8,
        written: usize,
        cause: anyhow::Error,
    },

    #[error("Invalid UTF-8 data on NFC tag: {0}")]
    MalformedUtf8(#[from] std::str::Utf8Error),

    #[error("Invalid JSON data on NFC tag: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Invalid item data format on NFC tag: {0}")]
    MissingFields(String),

    #[error("NFC reader error: {0:#}")]
    Reader(anyhow::Error),
}

impl TagError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        TagError::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TagError::InvalidInput(_) => ErrorKind::BadInput,
            TagError::DuplicateId(_) => ErrorKind::Conflict,
            TagError::Timeout(_) => ErrorKind::Timeout,
            TagError::NoDataFound | TagError::AllZero => ErrorKind::NotFound,
            TagError::MalformedUtf8(_) | TagError::MalformedJson(_) | TagError::MissingFields(_) => {
                ErrorKind::Unprocessable
            }
            TagError::Cancelled | TagError::WriteFailure { .. } | TagError::Reader(_) => {
                ErrorKind::Internal
            }
        }
    }
}
