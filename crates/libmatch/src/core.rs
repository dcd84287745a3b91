//! The registry facade tying places, libraries and configuration together.
//!
//! [`LibraryRegistry`] owns a place store and a library store and exposes
//! the operations a library registry needs: resolving coverage statements,
//! finding libraries for a patron, and keeping each library's service areas
//! in step with the coverage it declares.
//!
//! ```rust
//! use libmatch::{Coverage, LibraryRegistry, RegistryConfigBuilder};
//! use libmatch::data_processing::{TestDataConfig, test_data::test_dataset};
//!
//! let config = RegistryConfigBuilder::new().default_nation("US").build();
//! let registry = LibraryRegistry::from_dataset(test_dataset(&TestDataConfig::sample())?, config)?;
//!
//! let coverage: Coverage = r#"["Boston, MA", "Irvine, CA"]"#.parse()?;
//! let resolution = registry.resolve_coverage(&coverage);
//! assert_eq!(resolution.places.len(), 2);
//! # Ok::<(), libmatch::error::LibMatchError>(())
//! ```

use std::sync::Arc;

use geo_types::Point;
use libmatch_data_processing::Dataset;
use tracing::{info, instrument, warn};

use crate::{
    config::RegistryConfig,
    coverage::{Coverage, CoverageResolution, parse_coverage, parse_service_and_focus_area},
    error::{LibMatchError, Result},
    library::{Library, LibraryError, LibraryId, LibraryStore},
    place::{InMemoryPlaceStore, Place, PlaceStore},
    reconcile::{Reconciliation, set_service_areas},
    resolve::{GeocodeOracle, LookupOptions, Resolver, TimeoutOracle},
    search::LibraryMatcher,
};

/// A place store, a library store and the settings used to query them.
///
/// Reads borrow the registry immutably and may run from many threads at
/// once. Service area updates also only need `&self`: they are serialized
/// per library inside the [`LibraryStore`].
pub struct LibraryRegistry {
    places: InMemoryPlaceStore,
    libraries: LibraryStore,
    oracle: Option<Arc<dyn GeocodeOracle>>,
    config: RegistryConfig,
}

impl std::fmt::Debug for LibraryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryRegistry")
            .field("places", &self.places)
            .field("libraries", &self.libraries)
            .field("has_oracle", &self.oracle.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl LibraryRegistry {
    /// Create a registry over already populated stores, without a geocode
    /// oracle.
    ///
    /// The configured default nation, if any, must exist in `places`.
    #[instrument(name = "Create LibraryRegistry", level = "info", skip_all)]
    pub fn new(
        mut places: InMemoryPlaceStore,
        libraries: LibraryStore,
        config: RegistryConfig,
    ) -> Result<Self> {
        apply_default_nation(&mut places, &config)?;
        info!(
            places = places.len(),
            libraries = libraries.len(),
            "LibraryRegistry created"
        );
        Ok(Self {
            places,
            libraries,
            oracle: None,
            config,
        })
    }

    /// Create a registry from a loaded dataset.
    ///
    /// The dataset's ZIP index becomes the geocode oracle. It is in memory,
    /// so it is queried directly rather than through a [`TimeoutOracle`].
    #[instrument(name = "Create LibraryRegistry from Dataset", level = "info", skip_all, fields(source = %dataset.metadata.source))]
    pub fn from_dataset(dataset: Dataset, config: RegistryConfig) -> Result<Self> {
        let t_init = std::time::Instant::now();

        let mut places = InMemoryPlaceStore::new();
        let summary = places.load_records(&dataset.places)?;
        let mut registry = Self::new(places, LibraryStore::new(), config)?;
        registry.oracle = Some(Arc::new(dataset.zip_index));

        info!(
            elapsed_seconds = ?t_init.elapsed(),
            inserted = summary.inserted,
            updated = summary.updated,
            "LibraryRegistry loaded from dataset"
        );
        Ok(registry)
    }

    /// Load the dataset from the data directory and build a registry on it.
    pub fn load(config: RegistryConfig) -> Result<Self> {
        Self::from_dataset(libmatch_data_processing::load_dataset()?, config)
    }

    pub fn builder() -> LibraryRegistryBuilder {
        LibraryRegistryBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    #[must_use]
    pub fn places(&self) -> &InMemoryPlaceStore {
        &self.places
    }

    #[must_use]
    pub fn libraries(&self) -> &LibraryStore {
        &self.libraries
    }

    /// Mutable access to the libraries, e.g. to change their stages.
    pub fn libraries_mut(&mut self) -> &mut LibraryStore {
        &mut self.libraries
    }

    pub fn add_library(&mut self, library: Library) -> LibraryId {
        self.libraries.insert(library)
    }

    /// A resolver over the place store, consulting the oracle when enabled.
    #[must_use]
    pub fn resolver(&self) -> Resolver<'_> {
        let oracle = if self.config.use_external_source {
            self.oracle.as_deref()
        } else {
            None
        };
        Resolver::new(&self.places).with_oracle(oracle)
    }

    fn lookup_options(&self) -> LookupOptions {
        LookupOptions::default().external_source(self.config.use_external_source)
    }

    /// Find the one place called `name` inside `container`.
    pub fn lookup_inside<'s>(
        &'s self,
        container: &'s Place,
        name: &str,
        options: LookupOptions,
    ) -> Result<Option<&'s Place>> {
        Ok(self.resolver().lookup_inside(container, name, options)?)
    }

    /// Resolve a coverage statement against the default nation.
    pub fn resolve_coverage(&self, coverage: &Coverage) -> CoverageResolution {
        parse_coverage(
            &self.resolver(),
            coverage,
            self.places.default_nation(),
            self.lookup_options(),
        )
    }

    /// Libraries matching a free-text query, at most
    /// `strategy_limit` from each search strategy.
    pub fn search(&self, origin: Option<Point<f64>>, text: &str, production_only: bool) -> Vec<&Library> {
        self.matcher().search(origin, text, production_only)
    }

    /// Libraries serving somewhere within `radius_km` of `origin`, nearest
    /// first. Uses the configured radius when none is given.
    pub fn nearby(
        &self,
        origin: Point<f64>,
        radius_km: Option<f64>,
        production_only: bool,
    ) -> Vec<(&Library, f64)> {
        self.matcher().nearby(
            origin,
            radius_km.unwrap_or(self.config.nearby_radius_km),
            production_only,
        )
    }

    pub fn served_by(&self, place: &Place) -> Vec<&Library> {
        self.matcher().served_by(place)
    }

    fn matcher(&self) -> LibraryMatcher<'_> {
        LibraryMatcher::new(&self.places, &self.libraries).with_limit(self.config.strategy_limit)
    }

    /// Replace a library's service areas with already resolved coverage.
    pub fn reconcile_service_areas(
        &self,
        library: LibraryId,
        eligibility: &CoverageResolution,
        focus: &CoverageResolution,
    ) -> Result<Reconciliation> {
        Ok(set_service_areas(&self.libraries, library, eligibility, focus)?)
    }

    /// Resolve a library's declared service and focus areas and store the
    /// result.
    ///
    /// Fails with [`LibMatchError::ReconciliationAborted`] when any part of
    /// either area is unknown or ambiguous; the library's service areas are
    /// left untouched in that case.
    #[instrument(name = "Register Coverage", level = "info", skip(self, service_area, focus_area))]
    pub fn register_coverage(
        &self,
        library: LibraryId,
        service_area: Option<&Coverage>,
        focus_area: Option<&Coverage>,
    ) -> Result<Reconciliation> {
        if self.libraries.get(library).is_none() {
            return Err(LibraryError::UnknownLibrary(library).into());
        }
        let (eligibility, focus) = parse_service_and_focus_area(
            &self.resolver(),
            service_area,
            focus_area,
            self.places.default_nation(),
            self.lookup_options(),
        );
        match self.reconcile_service_areas(library, &eligibility, &focus)? {
            Reconciliation::Aborted(diagnostic) => {
                Err(LibMatchError::ReconciliationAborted(diagnostic))
            }
            outcome => Ok(outcome),
        }
    }

    /// A short description of the area a library serves, e.g. "Boston, MA".
    #[must_use]
    pub fn service_area_name(&self, library: LibraryId) -> Option<String> {
        self.libraries.service_area_name(library, &self.places)
    }
}

fn apply_default_nation(places: &mut InMemoryPlaceStore, config: &RegistryConfig) -> Result<()> {
    match config.default_nation.as_deref() {
        Some(abbreviation) => {
            places.set_default_nation(abbreviation)?;
        }
        None => warn!("No default nation configured; coverage must name its nations"),
    }
    Ok(())
}

/// Builder for creating a [`LibraryRegistry`] piece by piece.
#[derive(Default)]
pub struct LibraryRegistryBuilder {
    places: InMemoryPlaceStore,
    libraries: Vec<Library>,
    oracle: Option<Arc<dyn GeocodeOracle>>,
    config: RegistryConfig,
}

impl LibraryRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn places(mut self, places: InMemoryPlaceStore) -> Self {
        self.places = places;
        self
    }

    #[must_use]
    pub fn library(mut self, library: Library) -> Self {
        self.libraries.push(library);
        self
    }

    /// Consult `oracle` for cities missing from the place store. Its calls
    /// are bounded by the configured timeout.
    #[must_use]
    pub fn oracle(mut self, oracle: Arc<dyn GeocodeOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    #[must_use]
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<LibraryRegistry> {
        let mut libraries = LibraryStore::new();
        for library in self.libraries {
            libraries.insert(library);
        }
        let timeout = self.config.external_source_timeout;
        let mut registry = LibraryRegistry::new(self.places, libraries, self.config)?;
        registry.oracle = match self.oracle {
            Some(inner) => {
                let bounded: Arc<dyn GeocodeOracle> = Arc::new(TimeoutOracle::new(inner, timeout)?);
                Some(bounded)
            }
            None => None,
        };
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use libmatch_data_processing::{TestDataConfig, test_data::test_dataset};

    use super::*;
    use crate::{
        config::RegistryConfigBuilder,
        library::{LibraryStage, ServiceAreaRole},
        place::PlaceType,
    };

    fn setup_test_env() {
        let _ = crate::init_logging(tracing::Level::WARN);
    }

    fn build_registry(config: RegistryConfig) -> LibraryRegistry {
        LibraryRegistry::from_dataset(test_dataset(&TestDataConfig::sample()).unwrap(), config)
            .unwrap()
    }

    fn us_registry() -> LibraryRegistry {
        build_registry(RegistryConfigBuilder::new().default_nation("US").build())
    }

    fn place<'r>(registry: &'r LibraryRegistry, name: &str, place_type: PlaceType) -> &'r Place {
        let found = registry.places().find_by_name(name, Some(place_type));
        assert_eq!(found.len(), 1, "{name}");
        found[0]
    }

    #[test]
    fn test_unknown_default_nation_is_an_error() {
        setup_test_env();
        let config = RegistryConfigBuilder::new().default_nation("ZZ").build();
        let result =
            LibraryRegistry::from_dataset(test_dataset(&TestDataConfig::minimal()).unwrap(), config);
        assert!(matches!(result, Err(LibMatchError::PlaceError(_))));
    }

    #[test]
    fn test_resolve_coverage_uses_default_nation() {
        setup_test_env();
        let registry = us_registry();
        let coverage: Coverage = r#"["Boston, MA", "Kern County, CA", "94103"]"#.parse().unwrap();
        let resolution = registry.resolve_coverage(&coverage);
        assert!(resolution.is_resolved(), "{resolution:?}");
        assert_eq!(resolution.places.len(), 3);

        let no_nation = build_registry(RegistryConfig::default());
        let resolution = no_nation.resolve_coverage(&coverage);
        assert!(resolution.places.is_empty());
        assert!(resolution.unknown.contains_key("??"));
    }

    #[test]
    fn test_oracle_respects_config() {
        setup_test_env();
        let coverage: Coverage = r#"{"US": "Calabasas, CA"}"#.parse().unwrap();

        let registry = us_registry();
        let resolution = registry.resolve_coverage(&coverage);
        let zip = place(&registry, "91302", PlaceType::PostalCode);
        assert_eq!(resolution.places, vec![zip.id()]);

        let strict = build_registry(RegistryConfigBuilder::strict().default_nation("US").build());
        let resolution = strict.resolve_coverage(&coverage);
        assert!(resolution.places.is_empty());
        assert_eq!(resolution.unknown.len(), 1);
    }

    #[test]
    fn test_dataset_oracle_is_not_timed() {
        setup_test_env();
        // A zero timeout would fail every call made through a worker thread.
        let config = RegistryConfigBuilder::new()
            .default_nation("US")
            .external_source_timeout(Duration::ZERO)
            .build();
        let registry = build_registry(config);
        let coverage: Coverage = r#"{"US": "Calabasas, CA"}"#.parse().unwrap();
        let zip = place(&registry, "91302", PlaceType::PostalCode);
        assert_eq!(registry.resolve_coverage(&coverage).places, vec![zip.id()]);
    }

    #[test]
    fn test_lookup_inside() {
        setup_test_env();
        let registry = us_registry();
        let us = place(&registry, "US", PlaceType::Nation);
        let found = registry
            .lookup_inside(us, "Irvine, CA", LookupOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.external_name, "Irvine");

        let inside_us = LookupOptions::default().overlap(true);
        let ambiguous = registry.lookup_inside(us, "Springfield", inside_us);
        assert!(matches!(ambiguous, Err(LibMatchError::ResolveError(_))));
    }

    #[test]
    fn test_register_coverage() {
        setup_test_env();
        let mut registry = us_registry();
        let id = registry.add_library(Library::new("Boston Public Library"));

        let service: Coverage = r#"["Boston, MA"]"#.parse().unwrap();
        let outcome = registry.register_coverage(id, Some(&service), None).unwrap();
        assert!(matches!(outcome, Reconciliation::Replaced(_)));
        let boston = place(&registry, "Boston", PlaceType::City).id();
        assert_eq!(
            registry.libraries().places_with_role(id, ServiceAreaRole::Focus),
            vec![boston]
        );
        assert_eq!(registry.service_area_name(id).as_deref(), Some("Boston, MA"));

        let bad: Coverage = r#"["Boston, MA", "Atlantis"]"#.parse().unwrap();
        let err = registry.register_coverage(id, Some(&bad), None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown"), "{message}");
        assert!(message.contains("Atlantis"), "{message}");
        assert_eq!(registry.libraries().service_area_places(id), vec![boston]);
    }

    #[test]
    fn test_register_coverage_unknown_library() {
        setup_test_env();
        let registry = us_registry();
        let result = registry.register_coverage(LibraryId(42), None, None);
        assert!(matches!(result, Err(LibMatchError::LibraryError(_))));
    }

    #[test]
    fn test_builder() {
        setup_test_env();
        let dataset = test_dataset(&TestDataConfig::minimal()).unwrap();
        let mut places = InMemoryPlaceStore::new();
        places.load_records(&dataset.places).unwrap();

        let registry = LibraryRegistry::builder()
            .places(places)
            .library(
                Library::new("Chicago Public Library")
                    .with_stages(LibraryStage::Production, LibraryStage::Production),
            )
            .oracle(Arc::new(dataset.zip_index))
            .config(RegistryConfigBuilder::strict().default_nation("US").build())
            .build()
            .unwrap();

        assert_eq!(registry.libraries().len(), 1);
        assert_eq!(registry.config().strategy_limit, 5);
        let found = registry.search(None, "chicago public library", true);
        assert_eq!(found.len(), 1);
    }
}
