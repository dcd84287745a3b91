use std::io::BufRead;

use ahash::AHashMap as HashMap;
use libmatch_data_processing::{PlaceRecord, read_places_ndjson};
use tracing::{debug, info, instrument, warn};

use super::{Place, PlaceAlias, PlaceError, PlaceId, PlaceType, Result, geometry, parse_name};

/// The query surface the resolver, coverage parser and matcher need from a
/// collection of places.
pub trait PlaceStore: Send + Sync {
    fn get(&self, id: PlaceId) -> Option<&Place>;

    /// Places whose canonical name, abbreviation or alias equals `name`,
    /// ignoring case.
    ///
    /// With no `place_type`, a trailing " county"/" state" in `name` selects
    /// that type; otherwise counties are left out, since a bare name almost
    /// always means the city rather than the county of the same name.
    fn find_by_name(&self, name: &str, place_type: Option<PlaceType>) -> Vec<&Place>;

    /// The sentinel place standing for unrestricted coverage.
    fn everywhere(&self) -> &Place;

    /// The nation assumed when a coverage statement names none.
    fn default_nation(&self) -> Option<&Place>;

    fn children_of(&self, id: PlaceId) -> Vec<&Place>;

    /// Every place in the store, the sentinel included.
    fn places(&self) -> Box<dyn Iterator<Item = &Place> + '_>;

    fn parent_of(&self, place: &Place) -> Option<&Place> {
        place.parent.and_then(|id| self.get(id))
    }

    fn intersects(&self, a: &Place, b: &Place) -> bool {
        match (&a.geometry, &b.geometry) {
            (Some(a), Some(b)) => geometry::intersects(a, b),
            _ => false,
        }
    }

    fn touches(&self, a: &Place, b: &Place) -> bool {
        match (&a.geometry, &b.geometry) {
            (Some(a), Some(b)) => geometry::touches(a, b),
            _ => false,
        }
    }

    /// Approximate minimum distance in meters between two places, measured
    /// from the centroid of `a` to the nearest point of `b`.
    fn distance(&self, a: &Place, b: &Place) -> Option<f64> {
        use geo::Centroid;

        let (ga, gb) = (a.geometry.as_ref()?, b.geometry.as_ref()?);
        if geometry::intersects(ga, gb) {
            return Some(0.0);
        }
        geometry::distance_meters(ga.centroid()?, gb)
    }

    fn human_friendly_name(&self, place: &Place) -> Option<String> {
        place.human_friendly_name(self.parent_of(place))
    }
}

/// Counts from loading a batch of place records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// An arena of places with a case-insensitive name index.
///
/// The `everywhere` sentinel is created with the store and is never
/// duplicated: upserting another `everywhere` record returns the existing one.
#[derive(Debug, Clone)]
pub struct InMemoryPlaceStore {
    places: Vec<Place>,
    by_name: HashMap<String, Vec<PlaceId>>,
    by_external_id: HashMap<(String, PlaceType), PlaceId>,
    children: HashMap<PlaceId, Vec<PlaceId>>,
    everywhere: PlaceId,
    default_nation: Option<PlaceId>,
}

impl Default for InMemoryPlaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlaceStore {
    #[must_use]
    pub fn new() -> Self {
        let everywhere = PlaceId(0);
        Self {
            places: vec![Place::everywhere(everywhere)],
            by_name: HashMap::new(),
            by_external_id: HashMap::new(),
            children: HashMap::new(),
            everywhere,
            default_nation: None,
        }
    }

    /// Build a store from an NDJSON place stream.
    pub fn from_ndjson<R: BufRead>(reader: R) -> Result<Self> {
        let mut store = Self::new();
        store.load_ndjson(reader)?;
        Ok(store)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.places.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        // The sentinel is always present.
        self.places.len() <= 1
    }

    /// Add a place and return its id. The place's parent, if any, must
    /// already be in the store.
    pub fn insert(&mut self, mut place: Place) -> PlaceId {
        if place.is_everywhere() {
            return self.everywhere;
        }
        let id = PlaceId(self.places.len());
        place.id = id;
        if let Some(external_id) = &place.external_id {
            self.by_external_id
                .insert((external_id.clone(), place.place_type), id);
        }
        if let Some(parent) = place.parent {
            self.children.entry(parent).or_default().push(id);
        }
        self.places.push(place);
        self.index_names(id);
        id
    }

    pub fn add_alias(&mut self, id: PlaceId, name: &str, language: Option<&str>) {
        let Some(place) = self.places.get_mut(id.0) else {
            return;
        };
        let alias = PlaceAlias {
            name: name.to_string(),
            language: language.map(str::to_string),
        };
        if !place.aliases.contains(&alias) {
            place.aliases.push(alias);
            self.index_names(id);
        }
    }

    #[must_use]
    pub fn get_by_external_id(&self, external_id: &str, place_type: PlaceType) -> Option<&Place> {
        self.by_external_id
            .get(&(external_id.to_string(), place_type))
            .and_then(|id| self.get(*id))
    }

    /// Any place carrying `external_id`, preferring the largest type.
    fn find_external_id(&self, external_id: &str) -> Option<PlaceId> {
        PlaceType::ALL.into_iter().find_map(|place_type| {
            self.by_external_id
                .get(&(external_id.to_string(), place_type))
                .copied()
        })
    }

    /// Insert or update a place from a raw record, keyed by its external id
    /// and type. Returns the place's id and whether it was newly created.
    ///
    /// An update replaces the name, abbreviation, parent and geometry, and
    /// adds any aliases the place did not already have.
    pub fn upsert_record(&mut self, record: &PlaceRecord) -> Result<(PlaceId, bool)> {
        let metadata = &record.metadata;
        if metadata.place_type == PlaceType::Everywhere {
            return Ok((self.everywhere, false));
        }

        let parent = match &metadata.parent_id {
            Some(parent_id) => Some(self.find_external_id(parent_id).ok_or_else(|| {
                PlaceError::UnknownParent {
                    external_id: metadata.id.clone(),
                    parent_id: parent_id.clone(),
                }
            })?),
            None => None,
        };

        let key = (metadata.id.clone(), metadata.place_type);
        if let Some(&id) = self.by_external_id.get(&key) {
            self.unindex_names(id);
            let old_parent = self.places[id.0].parent;
            if old_parent != parent {
                if let Some(old) = old_parent.and_then(|p| self.children.get_mut(&p)) {
                    old.retain(|c| *c != id);
                }
                if let Some(new) = parent {
                    self.children.entry(new).or_default().push(id);
                }
            }

            let place = &mut self.places[id.0];
            place.external_name.clone_from(&metadata.name);
            place.abbreviated_name.clone_from(&metadata.abbreviated_name);
            place.parent = parent;
            place.geometry.clone_from(&record.geometry);
            for alias in &metadata.aliases {
                let alias = PlaceAlias {
                    name: alias.name.clone(),
                    language: alias.language.clone(),
                };
                if !place.aliases.contains(&alias) {
                    place.aliases.push(alias);
                }
            }
            self.index_names(id);
            debug!(%id, external_id = %metadata.id, "Updated place");
            return Ok((id, false));
        }

        let place = Place {
            id: PlaceId::UNASSIGNED,
            place_type: metadata.place_type,
            external_id: Some(metadata.id.clone()),
            external_name: metadata.name.clone(),
            abbreviated_name: metadata.abbreviated_name.clone(),
            parent,
            geometry: record.geometry.clone(),
            aliases: metadata
                .aliases
                .iter()
                .map(|a| PlaceAlias {
                    name: a.name.clone(),
                    language: a.language.clone(),
                })
                .collect(),
        };
        Ok((self.insert(place), true))
    }

    /// Upsert a batch of records in order. Parents must come before their
    /// children.
    #[instrument(name = "Load place records", skip_all, level = "info", fields(records = records.len()))]
    pub fn load_records(&mut self, records: &[PlaceRecord]) -> Result<LoadSummary> {
        let t_load = std::time::Instant::now();
        let mut summary = LoadSummary::default();
        for record in records {
            if self.upsert_record(record)?.1 {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }
        info!(
            elapsed_seconds = ?t_load.elapsed(),
            inserted = summary.inserted,
            updated = summary.updated,
            "Place records loaded"
        );
        Ok(summary)
    }

    pub fn load_ndjson<R: BufRead>(&mut self, reader: R) -> Result<LoadSummary> {
        let records = read_places_ndjson(reader)?;
        self.load_records(&records)
    }

    /// Make the nation with this exact abbreviation the default nation.
    pub fn set_default_nation(&mut self, abbreviation: &str) -> Result<PlaceId> {
        let id = self
            .places
            .iter()
            .find(|p| {
                p.place_type == PlaceType::Nation
                    && p.abbreviated_name.as_deref() == Some(abbreviation)
            })
            .map(Place::id);
        match id {
            Some(id) => {
                self.default_nation = Some(id);
                Ok(id)
            }
            None => {
                warn!(abbreviation, "Could not look up default nation");
                Err(PlaceError::UnknownNation(abbreviation.to_string()))
            }
        }
    }

    pub fn clear_default_nation(&mut self) {
        self.default_nation = None;
    }

    fn index_names(&mut self, id: PlaceId) {
        let Self {
            places, by_name, ..
        } = self;
        for name in places[id.0].names() {
            let ids = by_name.entry(name.to_lowercase()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    fn unindex_names(&mut self, id: PlaceId) {
        let Self {
            places, by_name, ..
        } = self;
        for name in places[id.0].names() {
            if let Some(ids) = by_name.get_mut(&name.to_lowercase()) {
                ids.retain(|i| *i != id);
            }
        }
    }
}

impl PlaceStore for InMemoryPlaceStore {
    fn get(&self, id: PlaceId) -> Option<&Place> {
        self.places.get(id.0)
    }

    fn find_by_name(&self, name: &str, place_type: Option<PlaceType>) -> Vec<&Place> {
        let (name, place_type) = match place_type {
            Some(place_type) => (name, Some(place_type)),
            None => parse_name(name),
        };
        let Some(ids) = self.by_name.get(&name.to_lowercase()) else {
            return Vec::new();
        };
        let mut found: Vec<&Place> = ids
            .iter()
            .filter_map(|id| self.get(*id))
            .filter(|p| match place_type {
                Some(place_type) => p.place_type == place_type,
                None => p.place_type != PlaceType::County,
            })
            .collect();
        found.sort_by_key(|p| p.id);
        found
    }

    fn everywhere(&self) -> &Place {
        &self.places[self.everywhere.0]
    }

    fn default_nation(&self) -> Option<&Place> {
        self.default_nation.and_then(|id| self.get(id))
    }

    fn children_of(&self, id: PlaceId) -> Vec<&Place> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| self.get(*c)).collect())
            .unwrap_or_default()
    }

    fn places(&self) -> Box<dyn Iterator<Item = &Place> + '_> {
        Box::new(self.places.iter())
    }
}

#[cfg(test)]
mod tests {
    use geo_types::{Rect, coord};
    use libmatch_data_processing::{AliasRecord, PlaceMetadata};

    use super::*;

    fn record(id: &str, name: &str, place_type: PlaceType, parent: Option<&str>) -> PlaceRecord {
        PlaceRecord {
            metadata: PlaceMetadata {
                id: id.to_string(),
                name: name.to_string(),
                place_type,
                abbreviated_name: None,
                parent_id: parent.map(str::to_string),
                aliases: Vec::new(),
            },
            geometry: None,
        }
    }

    fn sample_store() -> InMemoryPlaceStore {
        let mut store = InMemoryPlaceStore::new();
        let us = store.insert(
            Place::new(PlaceType::Nation, "United States")
                .with_abbreviation("US")
                .with_alias("USA", Some("eng")),
        );
        let il = store.insert(
            Place::new(PlaceType::State, "Illinois")
                .with_abbreviation("IL")
                .with_parent(us),
        );
        store.insert(Place::new(PlaceType::County, "Cook").with_parent(il));
        store.insert(Place::new(PlaceType::City, "Cook").with_parent(il));
        store.insert(Place::new(PlaceType::City, "Chicago").with_parent(il));
        store
    }

    #[test]
    fn test_everywhere_is_a_singleton() {
        let mut store = InMemoryPlaceStore::new();
        let first = store.everywhere().id();
        assert!(store.everywhere().is_everywhere());
        assert_eq!(store.insert(Place::new(PlaceType::Everywhere, "Everywhere")), first);
        let (id, is_new) = store
            .upsert_record(&record("Everywhere", "Everywhere", PlaceType::Everywhere, None))
            .unwrap();
        assert_eq!(id, first);
        assert!(!is_new);
        assert_eq!(
            store.places().filter(|p| p.is_everywhere()).count(),
            1
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_by_name_is_case_insensitive_and_uses_aliases() {
        let store = sample_store();
        let found = store.find_by_name("usa", None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_name, "United States");
        assert_eq!(store.find_by_name("us", Some(PlaceType::Nation)).len(), 1);
        assert!(store.find_by_name("US", Some(PlaceType::State)).is_empty());
        assert_eq!(store.find_by_name("CHICAGO", None).len(), 1);
        assert!(store.find_by_name("Gotham", None).is_empty());
    }

    #[test]
    fn test_find_by_name_excludes_counties_unless_asked() {
        let store = sample_store();

        let bare = store.find_by_name("Cook", None);
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].place_type, PlaceType::City);

        let county = store.find_by_name("Cook County", None);
        assert_eq!(county.len(), 1);
        assert_eq!(county[0].place_type, PlaceType::County);

        assert_eq!(store.find_by_name("Cook", Some(PlaceType::County)).len(), 1);
    }

    #[test]
    fn test_parent_and_children() {
        let store = sample_store();
        let il = store.find_by_name("IL", Some(PlaceType::State))[0];
        let children = store.children_of(il.id());
        assert_eq!(children.len(), 3);
        let chicago = store.find_by_name("Chicago", None)[0];
        assert_eq!(store.parent_of(chicago).map(|p| p.id()), Some(il.id()));
        assert_eq!(store.human_friendly_name(chicago).as_deref(), Some("Chicago, IL"));
    }

    #[test]
    fn test_upsert_updates_existing_place() {
        let mut store = InMemoryPlaceStore::new();
        let (us, is_new) = store
            .upsert_record(&record("US", "United States", PlaceType::Nation, None))
            .unwrap();
        assert!(is_new);

        let mut renamed = record("US", "United States of America", PlaceType::Nation, None);
        renamed.metadata.aliases.push(AliasRecord {
            name: "America".to_string(),
            language: None,
        });
        renamed.geometry = Some(
            Rect::new(coord! { x: -125.0, y: 24.0 }, coord! { x: -66.0, y: 50.0 })
                .to_polygon()
                .into(),
        );
        let (again, is_new) = store.upsert_record(&renamed).unwrap();
        assert_eq!(again, us);
        assert!(!is_new);

        assert!(store.find_by_name("United States", None).is_empty());
        assert_eq!(store.find_by_name("America", None).len(), 1);
        assert!(store.get(us).unwrap().geometry.is_some());

        // Same external id, different type: a different place.
        let (state, is_new) = store
            .upsert_record(&record("US", "Somewhere", PlaceType::State, Some("US")))
            .unwrap();
        assert!(is_new);
        assert_ne!(state, us);
        assert_eq!(store.get(state).unwrap().parent, Some(us));
    }

    #[test]
    fn test_upsert_unknown_parent_is_an_error() {
        let mut store = InMemoryPlaceStore::new();
        let err = store
            .upsert_record(&record("CA", "California", PlaceType::State, Some("US")))
            .unwrap_err();
        assert!(matches!(err, PlaceError::UnknownParent { .. }));
    }

    #[test]
    fn test_default_nation() {
        let mut store = sample_store();
        assert!(store.default_nation().is_none());
        assert!(store.set_default_nation("CA").is_err());
        store.set_default_nation("US").unwrap();
        assert_eq!(
            store.default_nation().map(|p| p.external_name.as_str()),
            Some("United States")
        );
        store.clear_default_nation();
        assert!(store.default_nation().is_none());
    }

    #[test]
    fn test_spatial_predicates() {
        let mut store = InMemoryPlaceStore::new();
        let left = store.insert(Place::new(PlaceType::State, "Left").with_geometry(
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }).to_polygon(),
        ));
        let right = store.insert(Place::new(PlaceType::State, "Right").with_geometry(
            Rect::new(coord! { x: 1.0, y: 0.0 }, coord! { x: 2.0, y: 1.0 }).to_polygon(),
        ));
        let far = store.insert(Place::new(PlaceType::State, "Far").with_geometry(
            Rect::new(coord! { x: 3.0, y: 0.0 }, coord! { x: 4.0, y: 1.0 }).to_polygon(),
        ));
        let (left, right, far) = (
            store.get(left).unwrap(),
            store.get(right).unwrap(),
            store.get(far).unwrap(),
        );

        assert!(store.intersects(left, right));
        assert!(store.touches(left, right));
        assert_eq!(store.distance(left, right), Some(0.0));
        assert!(store.distance(left, far).unwrap() > 200_000.0);
        assert!(!store.intersects(left, store.everywhere()));
        assert_eq!(store.distance(left, store.everywhere()), None);
    }
}
