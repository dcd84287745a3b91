//! Finding libraries by name, by the places they serve and by distance.
//!
//! [`LibraryMatcher::search`] runs three strategies over the same query and
//! merges them:
//!
//! 1. libraries whose name or alias matches the query,
//! 2. libraries serving a place whose name matches the query with any
//!    "library" wording removed,
//! 3. libraries whose description mentions the query.
//!
//! Each strategy is capped separately. Location matches already found by
//! name are dropped; description matches are appended as they are.

use std::cmp::Ordering;

use geo_types::{Geometry, Point};
use rayon::prelude::*;
use tracing::{debug, info, instrument};

pub use matching::{MAX_EDIT_DISTANCE, MIN_FUZZY_LENGTH, fuzzy_match, partial_match};
pub use query::{QueryParts, as_postal_code, normalize_query, query_parts};

use crate::{
    library::{Library, LibraryStore},
    place::{Place, PlaceStore, PlaceType, geometry},
};

mod matching;
mod query;

/// Results per strategy when nothing else is configured.
pub const DEFAULT_STRATEGY_LIMIT: usize = 10;
/// `nearby` radius when nothing else is configured.
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 150.0;

/// Runs library searches against a place store and a library store.
#[derive(Clone, Copy)]
pub struct LibraryMatcher<'a> {
    places: &'a dyn PlaceStore,
    libraries: &'a LibraryStore,
    limit: usize,
}

/// Nearest first, then unknown distances, each group in id order.
fn by_distance(a: &(&Library, Option<f64>), b: &(&Library, Option<f64>)) -> Ordering {
    match (a.1, b.1) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.0.id().cmp(&b.0.id()))
}

fn min_distance<'g>(origin: Point<f64>, geometries: impl Iterator<Item = &'g Geometry<f64>>) -> Option<f64> {
    geometries
        .filter_map(|g| geometry::distance_meters(origin, g))
        .min_by(f64::total_cmp)
}

impl<'a> LibraryMatcher<'a> {
    pub fn new(places: &'a dyn PlaceStore, libraries: &'a LibraryStore) -> Self {
        Self {
            places,
            libraries,
            limit: DEFAULT_STRATEGY_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Geometries of the places serving a library.
    fn service_geometries(&self, library: &Library) -> Vec<&'a Geometry<f64>> {
        self.libraries
            .service_area_places(library.id())
            .into_iter()
            .filter_map(|id| self.places.get(id))
            .filter_map(|p| p.geometry.as_ref())
            .collect()
    }

    /// Libraries matching `predicate`, nearest service area to `origin`
    /// first, capped at the strategy limit.
    fn matching_libraries<F>(
        &self,
        origin: Option<Point<f64>>,
        production_only: bool,
        predicate: F,
    ) -> Vec<&'a Library>
    where
        F: Fn(&Library) -> bool + Sync,
    {
        let candidates: Vec<&'a Library> = self.libraries.visible(production_only).collect();
        let mut ranked: Vec<(&'a Library, Option<f64>)> = candidates
            .into_par_iter()
            .filter(|library| predicate(*library))
            .map(|library| {
                let distance = origin.and_then(|origin| {
                    min_distance(origin, self.service_geometries(library).into_iter())
                });
                (library, distance)
            })
            .collect();
        self.rank(&mut ranked)
    }

    fn rank(&self, ranked: &mut [(&'a Library, Option<f64>)]) -> Vec<&'a Library> {
        ranked.sort_by(by_distance);
        ranked.iter().take(self.limit).map(|(l, _)| *l).collect()
    }

    /// Libraries whose name or alias fuzzily matches `name`, or whose name
    /// contains it.
    #[instrument(level = "debug", skip(self))]
    pub fn search_by_library_name(
        &self,
        name: &str,
        origin: Option<Point<f64>>,
        production_only: bool,
    ) -> Vec<&'a Library> {
        self.matching_libraries(origin, production_only, |library| {
            library.names().any(|n| fuzzy_match(n, name)) || partial_match(&library.name, name)
        })
    }

    /// Libraries with a service area intersecting a place whose name or
    /// alias fuzzily matches `query`. With an origin, the nearest matching
    /// place decides the order.
    #[instrument(level = "debug", skip(self))]
    pub fn search_by_location_name(
        &self,
        query: &str,
        place_type: Option<PlaceType>,
        origin: Option<Point<f64>>,
        production_only: bool,
    ) -> Vec<&'a Library> {
        let named: Vec<&'a Place> = self
            .places
            .places()
            .filter(|p| p.geometry.is_some())
            .filter(|p| place_type.is_none_or(|t| p.place_type == t))
            .filter(|p| {
                fuzzy_match(&p.external_name, query)
                    || p.aliases.iter().any(|a| fuzzy_match(&a.name, query))
            })
            .collect();
        debug!(places = named.len(), "Places matching location query");
        if named.is_empty() {
            return Vec::new();
        }

        let candidates: Vec<&'a Library> = self.libraries.visible(production_only).collect();
        let mut ranked: Vec<(&'a Library, Option<f64>)> = candidates
            .into_par_iter()
            .filter_map(|library| {
                let served = self.service_geometries(library);
                let hits: Vec<&Geometry<f64>> = named
                    .iter()
                    .filter_map(|p| p.geometry.as_ref())
                    .filter(|g| served.iter().any(|s| geometry::intersects(s, g)))
                    .collect();
                if hits.is_empty() {
                    return None;
                }
                let distance = origin.and_then(|origin| min_distance(origin, hits.into_iter()));
                Some((library, distance))
            })
            .collect();
        self.rank(&mut ranked)
    }

    /// Libraries whose description fuzzily matches or contains `query`.
    #[instrument(level = "debug", skip(self))]
    pub fn search_within_description(
        &self,
        query: &str,
        origin: Option<Point<f64>>,
        production_only: bool,
    ) -> Vec<&'a Library> {
        self.matching_libraries(origin, production_only, |library| {
            library
                .description
                .as_deref()
                .is_some_and(|d| fuzzy_match(d, query) || partial_match(d, query))
        })
    }

    /// Find a small number of libraries matching a free-text query.
    ///
    /// A postal code is only looked up as a place. An empty query finds
    /// nothing.
    #[instrument(name = "Library Search", level = "info", skip(self))]
    pub fn search(
        &self,
        origin: Option<Point<f64>>,
        query: &str,
        production_only: bool,
    ) -> Vec<&'a Library> {
        let t_start = std::time::Instant::now();
        if query.trim().is_empty() {
            return Vec::new();
        }

        let parts = query_parts(query);
        let Some(library_query) = parts.library_query.as_deref() else {
            let results = self.search_by_location_name(
                &parts.place_query,
                parts.place_type,
                origin,
                production_only,
            );
            info!(elapsed_seconds = ?t_start.elapsed(), results = results.len(), "Postal code search complete");
            return results;
        };

        let ((by_name, by_location), by_description) = rayon::join(
            || {
                rayon::join(
                    || self.search_by_library_name(library_query, origin, production_only),
                    || {
                        if parts.place_query.is_empty() {
                            Vec::new()
                        } else {
                            self.search_by_location_name(
                                &parts.place_query,
                                parts.place_type,
                                origin,
                                production_only,
                            )
                        }
                    },
                )
            },
            || self.search_within_description(query, origin, production_only),
        );

        let by_location: Vec<&'a Library> = by_location
            .into_iter()
            .filter(|l| !by_name.iter().any(|n| n.id() == l.id()))
            .collect();
        let mut results = by_name;
        results.extend(by_location);
        results.extend(by_description);

        info!(
            elapsed_seconds = ?t_start.elapsed(),
            results = results.len(),
            "Library search complete"
        );
        results
    }

    /// Libraries serving a place within `max_radius_km` of `origin`, with
    /// the distance in meters to their nearest such place, nearest first.
    ///
    /// Service areas are first screened in degrees using the circle's reach
    /// at the origin's latitude, then kept only if their great-circle
    /// distance is within the radius.
    #[instrument(name = "Nearby Libraries", level = "info", skip(self))]
    pub fn nearby(
        &self,
        origin: Point<f64>,
        max_radius_km: f64,
        production_only: bool,
    ) -> Vec<(&'a Library, f64)> {
        let t_start = std::time::Instant::now();
        let max_meters = max_radius_km * 1000.0;
        let radius = geometry::degree_radius(origin, max_meters);

        let candidates: Vec<&'a Library> = self.libraries.visible(production_only).collect();
        let mut ranked: Vec<(&'a Library, f64)> = candidates
            .into_par_iter()
            .filter_map(|library| {
                let within = self
                    .service_geometries(library)
                    .into_iter()
                    .filter(|g| geometry::degree_distance(origin, g).is_some_and(|d| d <= radius));
                min_distance(origin, within)
                    .filter(|&d| d <= max_meters)
                    .map(|d| (library, d))
            })
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id().cmp(&b.0.id())));

        info!(
            elapsed_seconds = ?t_start.elapsed(),
            radius_degrees = radius,
            results = ranked.len(),
            "Nearby search complete"
        );
        ranked
    }

    /// Every library, whatever its stage, with a service area overlapping
    /// `place` by more than a shared border.
    #[instrument(level = "debug", skip_all, fields(place = %place))]
    pub fn served_by(&self, place: &Place) -> Vec<&'a Library> {
        let Some(target) = place.geometry.as_ref() else {
            return Vec::new();
        };
        self.libraries
            .libraries()
            .filter(|library| {
                self.service_geometries(library)
                    .iter()
                    .any(|g| geometry::overlaps_not_counting_border(g, target))
            })
            .collect()
    }
}
