use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, instrument, warn};

#[cfg(feature = "download_data")]
pub mod fetch;

use crate::{CityZipIndex, DataError, PlaceRecord, read_places_ndjson};

pub use super::error::Result;

pub const PLACES_FILE: &str = "places.ndjson";
pub const ZIPCODES_FILE: &str = "zipcodes.json";

/// Environment variable naming a URL the ZIP index can be downloaded from.
pub const ZIPCODES_URL_ENV: &str = "LIBMATCH_ZIPCODES_URL";

/// Read `places.ndjson` from `dir`.
#[instrument(name = "Load raw places", level = "info")]
pub fn load_places(dir: &Path) -> Result<Vec<PlaceRecord>> {
    let path = dir.join(PLACES_FILE);
    if !path.exists() {
        warn!(path = ?path, "Places file not found");
        return Err(DataError::RequiredFilesNotFound);
    }
    info!(path = ?path, "Reading places");
    read_places_ndjson(BufReader::new(File::open(path)?))
}

/// Read `zipcodes.json` from `dir`.
///
/// If the file is missing:
///   - with the `download_data` feature and `LIBMATCH_ZIPCODES_URL` set, the
///     index is downloaded and cached at `dir/zipcodes.json`;
///   - otherwise `RequiredFilesNotFound` is returned.
#[instrument(name = "Load raw ZIP index", level = "info")]
pub fn load_zip_index(dir: &Path) -> Result<CityZipIndex> {
    let path = dir.join(ZIPCODES_FILE);
    if path.exists() {
        return CityZipIndex::from_path(&path);
    }

    warn!(path = ?path, "ZIP index file not found");

    #[cfg(feature = "download_data")]
    {
        if let Ok(url) = std::env::var(ZIPCODES_URL_ENV) {
            info!(url, "Attempting to download ZIP index as download_data feature is enabled.");
            let index = fetch::download_zip_index(&url, fetch::DEFAULT_TIMEOUT)?;
            std::fs::create_dir_all(dir)?;
            serde_json::to_writer(std::io::BufWriter::new(File::create(&path)?), &index)?;
            return Ok(index);
        }
        Err(DataError::RequiredFilesNotFound)
    }
    #[cfg(not(feature = "download_data"))]
    {
        Err(DataError::RequiredFilesNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_data::{TestDataConfig, write_test_data_dir};

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        write_test_data_dir(dir.path(), &TestDataConfig::minimal()).unwrap();

        let places = load_places(dir.path()).unwrap();
        assert!(!places.is_empty());
        let index = load_zip_index(dir.path()).unwrap();
        assert!(!index.is_empty());
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            load_places(dir.path()),
            Err(DataError::RequiredFilesNotFound)
        ));
    }
}
