use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalesInsightsError {
    #[error("no valid header in file {file_name}")]
    MissingHeader { file_name: String },

    #[error("Could not read file {file_name}: {reason}")]
    UnreadableFile { file_name: String, reason: String },

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Batch write for file {file_id} failed at chunk #{chunk_index} (records from offset {offset}): {reason}")]
    BatchWrite {
        file_id: String,
        chunk_index: usize,
        offset: usize,
        reason: String,
    },

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Text completion failed: {0}")]
    Completion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SalesInsightsError>;
