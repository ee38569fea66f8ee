use std::path::PathBuf;

/// Failures while turning a source file into comments.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unsupported file type {extension:?} (expected .xlsx, .xlsm, .xls or .csv)")]
    UnsupportedExtension { extension: String },

    #[error("{path} has no data rows")]
    EmptyFile { path: PathBuf },

    #[error("no comment column found in {path} (headers: {headers})")]
    NoCommentColumn { path: PathBuf, headers: String },

    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
}

impl IngestError {
    pub(crate) fn read(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        IngestError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}
