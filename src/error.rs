use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the alignment and conditioning core.
///
/// Whole-file and whole-operation failures surface through this type. Per-row
/// problems (a trailing sentinel, one bad metadata cell) are skipped where they
/// occur and never reach the caller as an `Err`, except for
/// [`SyncError::InvalidFieldValue`] which is handed back as a non-fatal warning.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("No records found in {0}")]
    EmptyDataset(String),

    #[error("Spectral data {} missing timestamp column", .0.display())]
    MissingTimestampColumn(PathBuf),

    #[error("Frame time count {frames} does not match spectral row count {spectra}")]
    RowCountMismatch { frames: usize, spectra: usize },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid value in column '{field}': {value:?}")]
    InvalidFieldValue { field: String, value: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Wrap an I/O error with a short description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Open `path` for reading, mapping a missing file to [`SyncError::FileNotFound`].
pub(crate) fn read_to_string(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::FileNotFound(path.to_path_buf())
        } else {
            SyncError::io(format!("reading {}", path.display()), e)
        }
    })
}
