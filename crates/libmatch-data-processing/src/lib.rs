//! Data ingestion for the libmatch registry engine.
//!
//! Two datasets feed the engine:
//!
//! - **Places**: an NDJSON stream of alternating metadata and geometry lines
//!   describing nations, states, counties, cities and postal codes.
//! - **City/ZIP index**: a `{state: {city: [{zipcode}]}}` mapping used as an
//!   external oracle when a city name is unknown to the place store.
//!
//! Both are looked up under `<DATA_DIR>/raw/`. The ZIP index can also be
//! downloaded when the `download_data` feature is enabled.
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

pub mod processed;
pub mod raw;
pub mod test_data;

mod error;

pub use error::{DataError, Result};
pub use processed::{
    AliasRecord, CityZipIndex, PlaceMetadata, PlaceRecord, PlaceType, ZipRecord, parse_geometry,
    read_places_ndjson,
};
pub use test_data::{TestDataConfig, create_test_data};

static TEST_DATA_DIR: Lazy<tempfile::TempDir> = Lazy::new(|| {
    tempfile::TempDir::new().expect("Failed to create global temporary test data directory")
});

pub const DATA_DIR_DEFAULT: &str = "./libmatch_data";

/// Centralized function to determine if we should use test data.
pub fn should_use_test_data() -> bool {
    let is_test_environment = cfg!(test) || cfg!(doctest);

    let explicit_test_data = std::env::var("USE_TEST_DATA")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    is_test_environment || explicit_test_data
}

/// Global data directory path that automatically determines the appropriate location.
pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    if should_use_test_data() {
        let temp_dir = TEST_DATA_DIR.path().to_path_buf();
        warn!(temp_dir = ?temp_dir, "Using temporary data directory for tests");
        temp_dir
    } else if let Ok(dir) = std::env::var("DATA_DIR") {
        PathBuf::from(dir)
    } else {
        system_data_dir().unwrap_or_else(|| PathBuf::from(DATA_DIR_DEFAULT))
    }
});

#[cfg(feature = "system-dirs")]
fn system_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "libmatch", "libmatch")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

#[cfg(not(feature = "system-dirs"))]
fn system_data_dir() -> Option<PathBuf> {
    None
}

pub fn get_data_dir() -> &'static Path {
    DATA_DIR.as_path()
}

/// Places and ZIP index loaded together, plus a record of where they came from.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub places: Vec<PlaceRecord>,
    pub zip_index: CityZipIndex,
    pub metadata: DatasetMetadata,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DatasetMetadata {
    pub source: String,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
    pub place_rows: usize,
    pub zip_states: usize,
}

/// Load the place and ZIP datasets from `dir`.
///
/// The ZIP index is optional: a missing `zipcodes.json` yields an empty index.
#[instrument(name = "Load dataset", level = "info")]
pub fn load_dataset_from(dir: &Path) -> Result<Dataset> {
    let places = raw::load_places(dir)?;
    let zip_index = match raw::load_zip_index(dir) {
        Ok(index) => index,
        Err(DataError::RequiredFilesNotFound) => {
            warn!(dir = ?dir, "No ZIP index found; external postal-code lookups will find nothing");
            CityZipIndex::default()
        }
        Err(e) => return Err(e),
    };

    let metadata = DatasetMetadata {
        source: dir.display().to_string(),
        loaded_at: chrono::Utc::now(),
        place_rows: places.len(),
        zip_states: zip_index.state_count(),
    };
    info!(
        place_rows = metadata.place_rows,
        zip_states = metadata.zip_states,
        "Dataset loaded"
    );

    Ok(Dataset {
        places,
        zip_index,
        metadata,
    })
}

/// Load the datasets from `<DATA_DIR>/raw/`.
pub fn load_dataset() -> Result<Dataset> {
    load_dataset_from(&get_data_dir().join("raw"))
}
