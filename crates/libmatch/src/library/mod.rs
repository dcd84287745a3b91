//! Libraries, their visibility stages and their service areas.

use std::{
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use ahash::AHashMap as HashMap;
use itertools::Itertools;
use tracing::{debug, instrument};

pub use error::LibraryError;
pub(crate) use error::Result;

use crate::place::{PlaceId, PlaceStore};

/// Position of a library inside its store.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryId(pub(crate) usize);

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "library#{}", self.0)
    }
}

/// Where a library stands on its way into (or out of) public feeds.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LibraryStage {
    #[default]
    Testing,
    Production,
    Cancelled,
}

impl LibraryStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Production => "production",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LibraryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryStage {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "testing" => Ok(Self::Testing),
            "production" => Ok(Self::Production),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(LibraryError::UnknownStage(other.to_string())),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryAlias {
    pub name: String,
    pub language: Option<String>,
}

/// What a service area row says about a place.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceAreaRole {
    /// Residents of the place may use the library.
    Eligibility,
    /// The library considers the place its primary audience.
    Focus,
}

/// One (library, place, role) row. There is never more than one row per
/// triple.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceArea {
    pub library: LibraryId,
    pub place: PlaceId,
    pub role: ServiceAreaRole,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    pub(crate) id: LibraryId,
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<LibraryAlias>,
    /// The library's own opinion of its stage.
    library_stage: LibraryStage,
    /// The registry's opinion of the library's stage.
    pub registry_stage: LibraryStage,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LibraryId(usize::MAX),
            name: name.into(),
            description: None,
            aliases: Vec::new(),
            library_stage: LibraryStage::default(),
            registry_stage: LibraryStage::default(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_alias(mut self, name: impl Into<String>, language: Option<&str>) -> Self {
        self.aliases.push(LibraryAlias {
            name: name.into(),
            language: language.map(str::to_string),
        });
        self
    }

    /// Set both stages at once, bypassing the production lock. For loading
    /// libraries whose stages were already agreed on.
    #[must_use]
    pub fn with_stages(mut self, library_stage: LibraryStage, registry_stage: LibraryStage) -> Self {
        self.library_stage = library_stage;
        self.registry_stage = registry_stage;
        self
    }

    #[must_use]
    pub fn id(&self) -> LibraryId {
        self.id
    }

    #[must_use]
    pub fn library_stage(&self) -> LibraryStage {
        self.library_stage
    }

    /// Change the library's own stage. Once in production only the registry
    /// can take a library out.
    pub fn set_library_stage(&mut self, stage: LibraryStage) -> Result<()> {
        if self.in_production() && stage != LibraryStage::Production {
            return Err(LibraryError::LeavingProduction);
        }
        self.library_stage = stage;
        Ok(())
    }

    /// The stage the two opinions add up to: cancelled beats testing, which
    /// beats production.
    #[must_use]
    pub fn stage(&self) -> LibraryStage {
        use LibraryStage::*;
        match (self.library_stage, self.registry_stage) {
            (Cancelled, _) | (_, Cancelled) => Cancelled,
            (Testing, _) | (_, Testing) => Testing,
            (Production, Production) => Production,
        }
    }

    #[must_use]
    pub fn in_production(&self) -> bool {
        self.stage() == LibraryStage::Production
    }

    /// Whether the library belongs in a feed. A production feed admits only
    /// libraries both sides agree are in production; a testing feed also
    /// admits libraries either side still considers in testing.
    #[must_use]
    pub fn is_visible(&self, production_only: bool) -> bool {
        let admitted = |stage: LibraryStage| match stage {
            LibraryStage::Production => true,
            LibraryStage::Testing => !production_only,
            LibraryStage::Cancelled => false,
        };
        admitted(self.library_stage) && admitted(self.registry_stage)
    }

    /// The library's name followed by its aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(|a| a.name.as_str()))
    }
}

/// Counts from replacing a library's service areas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub created: usize,
    pub kept: usize,
    pub deleted: usize,
}

/// Libraries plus their service area rows.
///
/// Each library's rows sit behind their own lock, so replacing one library's
/// service areas never waits on another's and two replacements for the same
/// library cannot interleave.
#[derive(Debug, Default)]
pub struct LibraryStore {
    libraries: Vec<Library>,
    service_areas: Vec<Mutex<Vec<ServiceArea>>>,
    by_name: HashMap<String, Vec<LibraryId>>,
}

fn lock(rows: &Mutex<Vec<ServiceArea>>) -> MutexGuard<'_, Vec<ServiceArea>> {
    // A replacement either finished or never started, so the rows are
    // consistent even if a holder panicked.
    rows.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LibraryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut library: Library) -> LibraryId {
        let id = LibraryId(self.libraries.len());
        library.id = id;
        self.by_name
            .entry(library.name.to_lowercase())
            .or_default()
            .push(id);
        self.libraries.push(library);
        self.service_areas.push(Mutex::new(Vec::new()));
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: LibraryId) -> Option<&Library> {
        self.libraries.get(id.0)
    }

    pub fn get_mut(&mut self, id: LibraryId) -> Option<&mut Library> {
        self.libraries.get_mut(id.0)
    }

    /// Libraries whose name equals `name`, ignoring case.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Vec<&Library> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|ids| ids.iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }

    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.libraries.iter()
    }

    /// Libraries admitted to a production (or testing) feed.
    pub fn visible(&self, production_only: bool) -> impl Iterator<Item = &Library> {
        self.libraries
            .iter()
            .filter(move |l| l.is_visible(production_only))
    }

    /// A snapshot of the library's service area rows.
    #[must_use]
    pub fn service_areas(&self, id: LibraryId) -> Vec<ServiceArea> {
        self.service_areas
            .get(id.0)
            .map(|rows| lock(rows).clone())
            .unwrap_or_default()
    }

    /// Places the library serves, in any role, without repeats.
    #[must_use]
    pub fn service_area_places(&self, id: LibraryId) -> Vec<PlaceId> {
        self.service_areas(id)
            .iter()
            .map(|a| a.place)
            .sorted_unstable()
            .dedup()
            .collect()
    }

    #[must_use]
    pub fn places_with_role(&self, id: LibraryId, role: ServiceAreaRole) -> Vec<PlaceId> {
        self.service_areas(id)
            .into_iter()
            .filter(|a| a.role == role)
            .map(|a| a.place)
            .collect()
    }

    /// Make `areas` the library's complete set of service area rows.
    ///
    /// Rows already present are kept, missing ones created and any others
    /// deleted. Repeated pairs in `areas` produce a single row.
    #[instrument(level = "debug", skip(self, areas), fields(areas = areas.len()))]
    pub fn replace_service_areas(
        &self,
        id: LibraryId,
        areas: &[(PlaceId, ServiceAreaRole)],
    ) -> Result<ReplaceSummary> {
        let rows = self
            .service_areas
            .get(id.0)
            .ok_or(LibraryError::UnknownLibrary(id))?;
        let mut rows = lock(rows);

        let mut summary = ReplaceSummary::default();
        let mut replacement: Vec<ServiceArea> = Vec::with_capacity(areas.len());
        for &(place, role) in areas {
            let area = ServiceArea {
                library: id,
                place,
                role,
            };
            if replacement.contains(&area) {
                continue;
            }
            if rows.contains(&area) {
                summary.kept += 1;
            } else {
                summary.created += 1;
            }
            replacement.push(area);
        }
        summary.deleted = rows.iter().filter(|a| !replacement.contains(a)).count();
        *rows = replacement;

        debug!(
            created = summary.created,
            kept = summary.kept,
            deleted = summary.deleted,
            "Service areas replaced"
        );
        Ok(summary)
    }

    /// A short name for the area the library serves: its one focus area, or
    /// failing that its one eligibility area. `everywhere` never counts.
    #[must_use]
    pub fn service_area_name(&self, id: LibraryId, places: &dyn PlaceStore) -> Option<String> {
        let mut by_role: HashMap<ServiceAreaRole, Vec<PlaceId>> = HashMap::new();
        for area in self.service_areas(id) {
            let Some(place) = places.get(area.place) else {
                continue;
            };
            if place.is_everywhere() {
                continue;
            }
            by_role.entry(area.role).or_default().push(area.place);
        }

        [ServiceAreaRole::Focus, ServiceAreaRole::Eligibility]
            .into_iter()
            .find_map(|role| match by_role.get(&role).map(Vec::as_slice) {
                Some([only]) => Some(*only),
                _ => None,
            })
            .and_then(|id| places.get(id))
            .and_then(|place| places.human_friendly_name(place))
    }
}

mod error {
    use thiserror::Error;

    use super::LibraryId;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum LibraryError {
        #[error("This library is already in production; only the registry can take it out of production.")]
        LeavingProduction,
        #[error("Unknown library stage '{0}'")]
        UnknownStage(String),
        #[error("No such library: {0}")]
        UnknownLibrary(LibraryId),
    }
    pub type Result<T> = std::result::Result<T, LibraryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::place::{InMemoryPlaceStore, Place, PlaceType};

    use super::LibraryStage::*;

    #[test]
    fn test_effective_stage() {
        let cases = [
            (Testing, Testing, Testing),
            (Testing, Production, Testing),
            (Production, Testing, Testing),
            (Production, Production, Production),
            (Cancelled, Production, Cancelled),
            (Production, Cancelled, Cancelled),
            (Testing, Cancelled, Cancelled),
        ];
        for (library_stage, registry_stage, expected) in cases {
            let library = Library::new("Test").with_stages(library_stage, registry_stage);
            assert_eq!(library.stage(), expected, "{library_stage} / {registry_stage}");
            assert_eq!(library.in_production(), expected == Production);
        }
    }

    #[test]
    fn test_feed_visibility() {
        let production = Library::new("A").with_stages(Production, Production);
        let testing = Library::new("B").with_stages(Testing, Production);
        let cancelled = Library::new("C").with_stages(Production, Cancelled);

        assert!(production.is_visible(true));
        assert!(production.is_visible(false));
        assert!(!testing.is_visible(true));
        assert!(testing.is_visible(false));
        assert!(!cancelled.is_visible(true));
        assert!(!cancelled.is_visible(false));
    }

    #[test]
    fn test_library_cannot_leave_production() {
        let mut library = Library::new("Test").with_stages(Production, Production);
        assert_eq!(
            library.set_library_stage(Testing),
            Err(LibraryError::LeavingProduction)
        );
        assert_eq!(library.library_stage(), Production);
        assert!(library.set_library_stage(Production).is_ok());

        // The registry still can.
        library.registry_stage = Testing;
        assert!(library.set_library_stage(Cancelled).is_ok());
        assert_eq!(library.stage(), Cancelled);
    }

    #[test]
    fn test_stage_parsing() {
        assert_eq!("production".parse::<LibraryStage>(), Ok(Production));
        assert_eq!(Cancelled.to_string(), "cancelled");
        assert!("live".parse::<LibraryStage>().is_err());
    }

    #[test]
    fn test_replace_service_areas() {
        let mut store = LibraryStore::new();
        let id = store.insert(Library::new("Test"));
        let (a, b, c) = (PlaceId(1), PlaceId(2), PlaceId(3));

        let summary = store
            .replace_service_areas(
                id,
                &[
                    (a, ServiceAreaRole::Focus),
                    (b, ServiceAreaRole::Focus),
                    (a, ServiceAreaRole::Focus),
                ],
            )
            .unwrap();
        assert_eq!(
            summary,
            ReplaceSummary {
                created: 2,
                kept: 0,
                deleted: 0
            }
        );

        let summary = store
            .replace_service_areas(
                id,
                &[(b, ServiceAreaRole::Focus), (c, ServiceAreaRole::Eligibility)],
            )
            .unwrap();
        assert_eq!(
            summary,
            ReplaceSummary {
                created: 1,
                kept: 1,
                deleted: 1
            }
        );
        assert_eq!(store.places_with_role(id, ServiceAreaRole::Focus), vec![b]);
        assert_eq!(store.places_with_role(id, ServiceAreaRole::Eligibility), vec![c]);
        assert_eq!(store.service_area_places(id), vec![b, c]);

        assert_eq!(
            store.replace_service_areas(LibraryId(99), &[]),
            Err(LibraryError::UnknownLibrary(LibraryId(99)))
        );
    }

    #[test]
    fn test_service_area_name() {
        let mut places = InMemoryPlaceStore::new();
        let us = places.insert(Place::new(PlaceType::Nation, "United States").with_abbreviation("US"));
        let ca = places.insert(
            Place::new(PlaceType::State, "California")
                .with_abbreviation("CA")
                .with_parent(us),
        );
        let kern = places.insert(Place::new(PlaceType::County, "Kern").with_parent(ca));
        let irvine = places.insert(Place::new(PlaceType::City, "Irvine").with_parent(ca));
        let everywhere = places.everywhere().id();

        let mut libraries = LibraryStore::new();
        let id = libraries.insert(Library::new("Test"));
        assert_eq!(libraries.service_area_name(id, &places), None);

        libraries
            .replace_service_areas(id, &[(kern, ServiceAreaRole::Focus)])
            .unwrap();
        assert_eq!(
            libraries.service_area_name(id, &places).as_deref(),
            Some("Kern County, CA")
        );

        // Two focus areas: fall back on the single eligibility area.
        libraries
            .replace_service_areas(
                id,
                &[
                    (kern, ServiceAreaRole::Focus),
                    (irvine, ServiceAreaRole::Focus),
                    (ca, ServiceAreaRole::Eligibility),
                ],
            )
            .unwrap();
        assert_eq!(libraries.service_area_name(id, &places).as_deref(), Some("California"));

        // Everywhere is ignored.
        libraries
            .replace_service_areas(
                id,
                &[
                    (everywhere, ServiceAreaRole::Focus),
                    (irvine, ServiceAreaRole::Focus),
                ],
            )
            .unwrap();
        assert_eq!(libraries.service_area_name(id, &places).as_deref(), Some("Irvine, CA"));

        libraries
            .replace_service_areas(id, &[(everywhere, ServiceAreaRole::Focus)])
            .unwrap();
        assert_eq!(libraries.service_area_name(id, &places), None);
    }

    #[test]
    fn test_find_by_name() {
        let mut store = LibraryStore::new();
        store.insert(Library::new("Chicago Public Library").with_alias("CPL", None));
        assert_eq!(store.find_by_name("chicago public library").len(), 1);
        assert!(store.find_by_name("CPL").is_empty());
        let library = store.find_by_name("Chicago Public Library")[0];
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["Chicago Public Library", "CPL"]);
    }
}
