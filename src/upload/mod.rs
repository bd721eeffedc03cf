use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::UploadConfig;

/// Spreadsheet offered for upload, as described by the browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCandidate {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Invalid file format. Please upload a CSV or Excel file.")]
    InvalidFormat { mime_type: String },

    #[error("File is too large. Maximum file size is {}MB.", .max_bytes / (1024 * 1024))]
    TooLarge { size_bytes: u64, max_bytes: u64 },
}

/// Accept CSV/XLSX/XLS up to the configured ceiling. Type is checked first.
pub fn validate_upload(candidate: &UploadCandidate, config: &UploadConfig) -> Result<(), UploadError> {
    if !config
        .accepted_mime_types
        .iter()
        .any(|accepted| accepted == &candidate.mime_type)
    {
        return Err(UploadError::InvalidFormat {
            mime_type: candidate.mime_type.clone(),
        });
    }

    if candidate.size_bytes > config.max_file_size_bytes {
        return Err(UploadError::TooLarge {
            size_bytes: candidate.size_bytes,
            max_bytes: config.max_file_size_bytes,
        });
    }

    Ok(())
}
