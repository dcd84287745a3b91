use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibMatchError {
    #[error("Place error: {0}")]
    PlaceError(#[from] crate::place::PlaceError),
    #[error("Resolve error: {0}")]
    ResolveError(#[from] crate::resolve::ResolveError),
    #[error("Coverage error: {0}")]
    CoverageError(#[from] crate::coverage::CoverageError),
    #[error("Library error: {0}")]
    LibraryError(#[from] crate::library::LibraryError),
    #[error("Location error: {0}")]
    LocationError(#[from] crate::location::LocationError),
    #[error("{0}")]
    ReconciliationAborted(#[from] crate::reconcile::Diagnostic),
    #[error("Data processing error: {0}")]
    DataProcessing(#[from] libmatch_data_processing::DataError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LibMatchError>;
