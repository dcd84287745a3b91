//! Finding a named place inside a containing place.
//!
//! Names may be scoped with commas, most specific first ("Boston, MA"), and
//! are resolved one part at a time from the outermost part inwards.

use tracing::{debug, instrument, warn};

pub use error::{OracleError, ResolveError};
pub(crate) use error::Result;
pub use oracle::{GeocodeOracle, TimeoutOracle};

use crate::place::{Place, PlaceStore, PlaceType, geometry, larger_place_types};

mod oracle;

/// How [`Resolver::lookup_inside`] decides that one place is inside another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupOptions {
    /// Inside means the shapes overlap, not counting a shared border.
    /// Otherwise inside means the container is the candidate's parent.
    pub use_overlap: bool,
    /// Ask the geocode oracle for postal codes when nothing matches.
    pub use_external_source: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            use_overlap: false,
            use_external_source: true,
        }
    }
}

impl LookupOptions {
    pub fn overlap(mut self, enabled: bool) -> Self {
        self.use_overlap = enabled;
        self
    }

    pub fn external_source(mut self, enabled: bool) -> Self {
        self.use_external_source = enabled;
        self
    }
}

/// Split a scoped name into parts, largest place first.
///
/// "Boston, MA" becomes `["MA", "Boston"]` and "Lake County, Ohio, USA"
/// becomes `["USA", "Ohio", "Lake County"]`. Empty parts are dropped.
#[must_use]
pub fn name_parts(name: &str) -> Vec<&str> {
    name.rsplit(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Resolves names against a place store, optionally falling back on a
/// geocode oracle.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    store: &'a dyn PlaceStore,
    oracle: Option<&'a dyn GeocodeOracle>,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn PlaceStore) -> Self {
        Self {
            store,
            oracle: None,
        }
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: Option<&'a dyn GeocodeOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn store(&self) -> &'a dyn PlaceStore {
        self.store
    }

    /// Find the one place called `name` inside `container`.
    ///
    /// Returns `Ok(None)` when nothing matches and
    /// [`ResolveError::AmbiguousPlace`] when more than one place does.
    #[instrument(level = "debug", skip(self, container), fields(container = %container.external_name))]
    pub fn lookup_inside(
        &self,
        container: &'a Place,
        name: &str,
        options: LookupOptions,
    ) -> Result<Option<&'a Place>> {
        let parts = name_parts(name);
        if parts.len() > 1 {
            let mut inside = container;
            for part in parts {
                match self.lookup_inside(inside, part, options)? {
                    Some(place) => inside = place,
                    None => {
                        debug!(part, "Scoped lookup failed");
                        return Ok(None);
                    }
                }
            }
            return Ok(Some(inside));
        }
        let name = parts.first().copied().unwrap_or_default();

        let excluded = larger_place_types(container.place_type);
        let matches: Vec<&'a Place> = self
            .store
            .find_by_name(name, None)
            .into_iter()
            .filter(|p| p.place_type != container.place_type && !excluded.contains(&p.place_type))
            .filter(|p| self.is_inside(p, container, options.use_overlap))
            .collect();

        match matches.as_slice() {
            [] if options.use_external_source => {
                self.lookup_one_through_external_source(container, name)
            }
            [] => Ok(None),
            [place] => Ok(Some(*place)),
            _ => {
                debug!(candidates = matches.len(), "Ambiguous place name");
                Err(ResolveError::AmbiguousPlace {
                    container: container.external_name.clone(),
                    name: name.to_string(),
                })
            }
        }
    }

    fn is_inside(&self, candidate: &Place, container: &Place, use_overlap: bool) -> bool {
        if container.is_everywhere() {
            return true;
        }
        if use_overlap && let Some(outer) = &container.geometry {
            return candidate
                .geometry
                .as_ref()
                .is_some_and(|g| geometry::overlaps_not_counting_border(g, outer));
        }
        match candidate.parent {
            Some(parent) if parent == container.id() => true,
            // Postal codes may be looked up one level higher than their parent.
            Some(parent) if candidate.place_type == PlaceType::PostalCode => self
                .store
                .get(parent)
                .and_then(|p| p.parent)
                .is_some_and(|grandparent| grandparent == container.id()),
            _ => false,
        }
    }

    /// Find a postal code standing in for a city the store does not know.
    ///
    /// Only works inside a state. The oracle supplies the city's postal
    /// codes and the first one present in the store wins. Oracle failures
    /// count as "not found".
    pub fn lookup_one_through_external_source(
        &self,
        container: &'a Place,
        name: &str,
    ) -> Result<Option<&'a Place>> {
        if container.place_type != PlaceType::State {
            return Ok(None);
        }
        let (Some(oracle), Some(state)) = (self.oracle, container.abbreviated_name.as_deref())
        else {
            return Ok(None);
        };

        let zipcodes = match oracle.zipcodes_for_city(state, name) {
            Ok(zipcodes) => zipcodes,
            Err(e) => {
                warn!(state, city = name, error = %e, "External postal code lookup failed");
                return Ok(None);
            }
        };

        let options = LookupOptions::default().external_source(false);
        for zipcode in &zipcodes {
            if let Some(place) = self.lookup_inside(container, zipcode, options)? {
                debug!(state, city = name, zipcode, "Resolved city through postal code");
                return Ok(Some(place));
            }
        }
        Ok(None)
    }
}

mod error {
    use std::time::Duration;

    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ResolveError {
        #[error("More than one place called {name} inside {container}.")]
        AmbiguousPlace { container: String, name: String },
    }
    pub type Result<T> = std::result::Result<T, ResolveError>;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum OracleError {
        #[error("Geocode oracle did not answer within {0:?}")]
        Timeout(Duration),
        #[error("Geocode oracle unavailable: {0}")]
        Unavailable(String),
    }
    pub type OracleResult<T> = std::result::Result<T, OracleError>;
}
