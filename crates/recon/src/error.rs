use thiserror::Error;

/// Failures that make a whole operation impossible.
///
/// Problems found inside the data (missing columns, bad dates, mismatched
/// amounts) are never errors; they are reported as discrepancies.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (bad tolerance, empty list, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// A document kind name that is not recognized.
    #[error("unknown document kind: '{0}'")]
    UnknownDocument(String),

    /// A check name that is not recognized.
    #[error("unknown check: '{0}'")]
    UnknownCheck(String),

    /// A row whose width disagrees with the dataset's column count.
    #[error("row {row} has {found} value(s), expected {expected}")]
    RowWidth { row: usize, expected: usize, found: usize },
}
