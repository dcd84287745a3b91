//! Turning resolved coverage into a library's service area rows.

use std::{collections::BTreeMap, fmt};

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    coverage::{CoverageResolution, CoverageValue},
    library::{LibraryId, LibraryStore, ReplaceSummary, Result, ServiceAreaRole},
};

/// Why a library's service areas were left alone: parts of its coverage
/// named no place, or more than one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub unknown: BTreeMap<String, CoverageValue>,
    pub ambiguous: BTreeMap<String, CoverageValue>,
}

fn to_json(map: &BTreeMap<String, CoverageValue>) -> String {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()).to_string()
}

impl Diagnostic {
    /// The diagnostic for a resolution, if it has unknown or ambiguous parts.
    #[must_use]
    pub fn for_resolution(resolution: &CoverageResolution) -> Option<Self> {
        (!resolution.is_resolved()).then(|| Self {
            unknown: resolution.unknown.clone(),
            ambiguous: resolution.ambiguous.clone(),
        })
    }

    /// A message for the person who wrote the coverage.
    #[must_use]
    pub fn message(&self) -> String {
        let mut messages = Vec::with_capacity(2);
        if !self.unknown.is_empty() {
            messages.push(format!(
                "The following service area was unknown: {}.",
                to_json(&self.unknown)
            ));
        }
        if !self.ambiguous.is_empty() {
            messages.push(format!(
                "The following service area was ambiguous: {}.",
                to_json(&self.ambiguous)
            ));
        }
        messages.join(" ")
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Diagnostic {}

/// What [`set_service_areas`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Neither area said anything; existing rows were kept.
    Unchanged,
    Replaced(ReplaceSummary),
    /// Nothing was changed.
    Aborted(Diagnostic),
}

impl Reconciliation {
    #[must_use]
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Aborted(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }
}

/// Replace a library's service areas with the places of its resolved
/// eligibility and focus areas.
///
/// Two empty resolutions change nothing, so a library never loses coverage
/// it was granted elsewhere. When the focus area is empty or equal to the
/// eligibility area, the places are stored once, as focus. Otherwise each
/// area is stored under its own role. Any unknown or ambiguous part in
/// either area aborts the whole update.
#[instrument(level = "info", skip(libraries, eligibility, focus))]
pub fn set_service_areas(
    libraries: &LibraryStore,
    library: LibraryId,
    eligibility: &CoverageResolution,
    focus: &CoverageResolution,
) -> Result<Reconciliation> {
    if eligibility.is_empty() && focus.is_empty() {
        info!("No coverage given, keeping existing service areas");
        return Ok(Reconciliation::Unchanged);
    }

    if let Some(diagnostic) =
        Diagnostic::for_resolution(eligibility).or_else(|| Diagnostic::for_resolution(focus))
    {
        warn!(%diagnostic, "Refusing to update service areas");
        return Ok(Reconciliation::Aborted(diagnostic));
    }

    let same_area = (focus.is_empty() && !eligibility.is_empty()) || eligibility == focus;
    let areas: Vec<_> = if same_area {
        eligibility
            .places
            .iter()
            .map(|&place| (place, ServiceAreaRole::Focus))
            .collect()
    } else {
        eligibility
            .places
            .iter()
            .map(|&place| (place, ServiceAreaRole::Eligibility))
            .chain(focus.places.iter().map(|&place| (place, ServiceAreaRole::Focus)))
            .collect()
    };

    libraries
        .replace_service_areas(library, &areas)
        .map(Reconciliation::Replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{library::Library, place::PlaceId};

    fn resolved(places: &[usize]) -> CoverageResolution {
        CoverageResolution {
            places: places.iter().map(|&p| PlaceId(p)).collect(),
            ..CoverageResolution::default()
        }
    }

    fn store_with_library() -> (LibraryStore, LibraryId) {
        let mut store = LibraryStore::new();
        let id = store.insert(Library::new("Test"));
        (store, id)
    }

    #[test]
    fn test_empty_coverage_keeps_existing_rows() {
        let (store, id) = store_with_library();
        store
            .replace_service_areas(id, &[(PlaceId(1), ServiceAreaRole::Focus)])
            .unwrap();
        let empty = CoverageResolution::default();
        let outcome = set_service_areas(&store, id, &empty, &empty).unwrap();
        assert_eq!(outcome, Reconciliation::Unchanged);
        assert_eq!(store.service_areas(id).len(), 1);
    }

    #[test]
    fn test_identical_areas_are_stored_once_as_focus() {
        let (store, id) = store_with_library();
        let area = resolved(&[1, 2]);
        set_service_areas(&store, id, &area, &area).unwrap();
        assert_eq!(
            store.places_with_role(id, ServiceAreaRole::Focus),
            vec![PlaceId(1), PlaceId(2)]
        );
        assert!(store.places_with_role(id, ServiceAreaRole::Eligibility).is_empty());

        // A missing focus area means the same.
        set_service_areas(&store, id, &resolved(&[3]), &CoverageResolution::default()).unwrap();
        assert_eq!(store.places_with_role(id, ServiceAreaRole::Focus), vec![PlaceId(3)]);
        assert_eq!(store.service_areas(id).len(), 1);
    }

    #[test]
    fn test_different_areas_get_their_own_roles() {
        let (store, id) = store_with_library();
        store
            .replace_service_areas(id, &[(PlaceId(9), ServiceAreaRole::Focus)])
            .unwrap();
        let outcome = set_service_areas(&store, id, &resolved(&[1]), &resolved(&[2])).unwrap();
        assert_eq!(
            outcome,
            Reconciliation::Replaced(ReplaceSummary {
                created: 2,
                kept: 0,
                deleted: 1
            })
        );
        assert_eq!(store.places_with_role(id, ServiceAreaRole::Eligibility), vec![PlaceId(1)]);
        assert_eq!(store.places_with_role(id, ServiceAreaRole::Focus), vec![PlaceId(2)]);
    }

    #[test]
    fn test_unresolved_coverage_aborts() {
        let (store, id) = store_with_library();
        store
            .replace_service_areas(id, &[(PlaceId(9), ServiceAreaRole::Focus)])
            .unwrap();

        let mut focus = resolved(&[1]);
        focus
            .unknown
            .insert("US".to_string(), CoverageValue::Names(vec!["Narnia".to_string()]));
        focus
            .ambiguous
            .insert("US".to_string(), CoverageValue::Names(vec!["Springfield".to_string()]));

        let outcome = set_service_areas(&store, id, &resolved(&[1]), &focus).unwrap();
        let diagnostic = outcome.diagnostic().unwrap();
        assert_eq!(
            diagnostic.to_string(),
            "The following service area was unknown: {\"US\":[\"Narnia\"]}. \
             The following service area was ambiguous: {\"US\":[\"Springfield\"]}."
        );
        assert_eq!(store.places_with_role(id, ServiceAreaRole::Focus), vec![PlaceId(9)]);
    }

    #[test]
    fn test_unknown_library() {
        let store = LibraryStore::new();
        assert!(set_service_areas(&store, LibraryId(0), &resolved(&[1]), &resolved(&[1])).is_err());
    }

    #[test]
    fn test_concurrent_updates_never_mix() {
        const WRITERS: usize = 8;
        const ROUNDS: usize = 50;

        let (store, id) = store_with_library();
        let submitted: Vec<(CoverageResolution, CoverageResolution)> = (0..WRITERS)
            .map(|w| (resolved(&[w * 10, w * 10 + 1]), resolved(&[w * 10 + 2])))
            .collect();
        let expected: Vec<Vec<(PlaceId, ServiceAreaRole)>> = (0..WRITERS)
            .map(|w| {
                vec![
                    (PlaceId(w * 10), ServiceAreaRole::Eligibility),
                    (PlaceId(w * 10 + 1), ServiceAreaRole::Eligibility),
                    (PlaceId(w * 10 + 2), ServiceAreaRole::Focus),
                ]
            })
            .collect();
        let rows = |store: &LibraryStore| {
            let mut rows: Vec<_> = store
                .service_areas(id)
                .into_iter()
                .map(|a| (a.place, a.role))
                .collect();
            rows.sort_by_key(|&(place, _)| place);
            rows
        };

        std::thread::scope(|s| {
            for (eligibility, focus) in &submitted {
                let store = &store;
                s.spawn(move || {
                    for _ in 0..ROUNDS {
                        let outcome = set_service_areas(store, id, eligibility, focus).unwrap();
                        assert!(matches!(outcome, Reconciliation::Replaced(_)));
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..ROUNDS * WRITERS {
                    let seen = rows(&store);
                    assert!(seen.is_empty() || expected.contains(&seen), "{seen:?}");
                }
            });
        });

        let last = rows(&store);
        assert!(expected.contains(&last), "{last:?}");
        assert_eq!(store.service_areas(id).len(), 3);
    }
}
