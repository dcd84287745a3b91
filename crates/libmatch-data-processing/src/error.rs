use thiserror::Error;
pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[cfg(feature = "download_data")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[cfg(feature = "download_data")]
    #[error("Download of {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },
    #[error("Could not parse geometry: {0}")]
    Geometry(String),
    #[error("Line {line}: expected a geometry line after place metadata")]
    MissingGeometryLine { line: usize },
    #[error("Unknown place type '{0}'")]
    UnknownPlaceType(String),
    #[error("No data directory provided and download_data feature is disabled")]
    NoDataDirProvided,
    #[error("Required data files not found in the provided directory")]
    RequiredFilesNotFound,
}
