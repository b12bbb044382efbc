//! Error types for each component.
//!
//! Decode failures have no error type: the decoder reports them as an
//! absent detection.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no camera found")]
    NoDevice,

    #[error("camera query failed: {0}")]
    Query(String),

    #[error("failed to open camera '{name}': {reason}")]
    Open { name: String, reason: String },

    #[error("failed to read frame: {0}")]
    Frame(String),

    #[error("capture worker exited before reporting camera state")]
    WorkerLost,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not determine data directory")]
    NoDataDir,

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to read scan history: {0}")]
    Store(#[from] StoreError),

    #[error("XLSX write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("export directory does not exist: {0}")]
    MissingDir(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_names_device() {
        let err = CaptureError::Open {
            name: "Integrated Camera".to_string(),
            reason: "busy".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Integrated Camera"));
        assert!(msg.contains("busy"));
    }

    #[test]
    fn test_export_error_from_store() {
        let err: ExportError = StoreError::NoDataDir.into();
        assert!(matches!(err, ExportError::Store(_)));
        assert!(err.to_string().contains("data directory"));
    }

    #[test]
    fn test_into_anyhow() {
        fn fallible() -> anyhow::Result<()> {
            Err(CaptureError::NoDevice)?
        }
        let err = fallible().unwrap_err();
        assert!(err.to_string().contains("no camera"));
    }
}
