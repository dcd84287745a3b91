use std::{fs::File, io::BufReader, io::Read, path::Path};

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::Result;

/// One postal code served by a city.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZipRecord {
    pub zipcode: String,
}

/// A state abbreviation → city name → postal codes mapping.
///
/// This is the shape of the external postal-code source: it knows which ZIP
/// codes belong to a city inside a state, even when the place store knows
/// nothing about the city itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityZipIndex {
    states: HashMap<String, HashMap<String, Vec<ZipRecord>>>,
}

impl CityZipIndex {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let index: Self = serde_json::from_reader(reader)?;
        debug!(states = index.state_count(), "Loaded city/ZIP index");
        Ok(index)
    }

    #[instrument(name = "Load city/ZIP index", level = "debug")]
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_reader(json.as_bytes())
    }

    /// Every city known for a state, with its postal codes.
    #[must_use]
    pub fn cities_and_zips_for_state(
        &self,
        state_abbreviation: &str,
    ) -> Option<&HashMap<String, Vec<ZipRecord>>> {
        self.states.get(state_abbreviation)
    }

    /// Postal codes for an exact city name inside a state; empty when unknown.
    #[must_use]
    pub fn zips_for_city(&self, state_abbreviation: &str, city: &str) -> &[ZipRecord] {
        self.cities_and_zips_for_state(state_abbreviation)
            .and_then(|cities| cities.get(city))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn insert<I, S>(&mut self, state_abbreviation: &str, city: &str, zipcodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states
            .entry(state_abbreviation.to_string())
            .or_default()
            .entry(city.to_string())
            .or_default()
            .extend(zipcodes.into_iter().map(|z| ZipRecord { zipcode: z.into() }));
    }

    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
