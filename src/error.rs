// ⚠️ Error Taxonomy - per-file and startup failures
// Per-file errors never abort a batch; configuration errors block startup

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// File bytes could not be read as a sheet
    #[error("could not decode {file}: {reason}")]
    Decode { file: String, reason: String },

    /// Sheet decoded but no holding rows were found
    #[error("no holdings found in {file}")]
    NoDataFound { file: String },

    /// Storage or identity is unreachable or unconfigured
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl IngestError {
    pub fn decode(file: &str, reason: impl std::fmt::Display) -> Self {
        IngestError::Decode {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn configuration(reason: impl std::fmt::Display) -> Self {
        IngestError::Configuration(reason.to_string())
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
