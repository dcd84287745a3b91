//! Places: nodes of the loose geographic hierarchy libraries are mapped onto.
//!
//! Places live in an arena owned by a [`PlaceStore`] and refer to their
//! parent by [`PlaceId`], so the hierarchy can be walked in either direction
//! without places owning each other.

use std::fmt;

use geo_types::Geometry;
pub use libmatch_data_processing::PlaceType;

pub use error::PlaceError;
pub(crate) use error::Result;
pub use store::{InMemoryPlaceStore, PlaceStore};

pub mod geometry;
mod store;

/// Position of a place inside its store.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceId(pub(crate) usize);

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "place#{}", self.0)
    }
}

/// An alternate name for a place.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceAlias {
    pub name: String,
    /// Three-letter language code, when known.
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub(crate) id: PlaceId,
    pub place_type: PlaceType,
    /// Identifier of this place in the dataset it came from.
    pub external_id: Option<String>,
    /// Canonical display name.
    pub external_name: String,
    /// Canonical short form, mostly for nations and states ("US", "CA").
    pub abbreviated_name: Option<String>,
    pub parent: Option<PlaceId>,
    /// Shape in WGS84 longitude/latitude. `everywhere` never has one.
    pub geometry: Option<Geometry<f64>>,
    pub aliases: Vec<PlaceAlias>,
}

impl PlaceId {
    /// Id carried by a place that has not been inserted into a store yet.
    pub(crate) const UNASSIGNED: Self = Self(usize::MAX);
}

impl Place {
    pub const EVERYWHERE_NAME: &'static str = "Everywhere";

    /// A new place, not yet in any store. Insert it with
    /// [`InMemoryPlaceStore::insert`] to give it an id.
    pub fn new(place_type: PlaceType, external_name: impl Into<String>) -> Self {
        Self {
            id: PlaceId::UNASSIGNED,
            place_type,
            external_id: None,
            external_name: external_name.into(),
            abbreviated_name: None,
            parent: None,
            geometry: None,
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    #[must_use]
    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviated_name = Some(abbreviation.into());
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: PlaceId) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_geometry(mut self, geometry: impl Into<Geometry<f64>>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    #[must_use]
    pub fn with_alias(mut self, name: impl Into<String>, language: Option<&str>) -> Self {
        self.aliases.push(PlaceAlias {
            name: name.into(),
            language: language.map(str::to_string),
        });
        self
    }

    pub(crate) fn everywhere(id: PlaceId) -> Self {
        Self {
            id,
            place_type: PlaceType::Everywhere,
            external_id: Some(Self::EVERYWHERE_NAME.to_string()),
            external_name: Self::EVERYWHERE_NAME.to_string(),
            abbreviated_name: None,
            parent: None,
            geometry: None,
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PlaceId {
        self.id
    }

    #[must_use]
    pub fn is_everywhere(&self) -> bool {
        self.place_type == PlaceType::Everywhere
    }

    /// Every name this place answers to: canonical, abbreviation, aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.external_name.as_str())
            .chain(self.abbreviated_name.as_deref())
            .chain(self.aliases.iter().map(|a| a.name.as_str()))
    }

    /// The name a person would recognise without further context, e.g.
    /// "Kern County, CA" or "Boston, MA".
    ///
    /// `parent` must be this place's parent, if it has one.
    #[must_use]
    pub fn human_friendly_name(&self, parent: Option<&Self>) -> Option<String> {
        if self.is_everywhere() {
            return None;
        }
        if let Some(parent) = parent.filter(|p| p.place_type == PlaceType::State) {
            let state = parent
                .abbreviated_name
                .as_deref()
                .unwrap_or(&parent.external_name);
            match self.place_type {
                PlaceType::County => return Some(format!("{} County, {state}", self.external_name)),
                PlaceType::City => return Some(format!("{}, {state}", self.external_name)),
                _ => {}
            }
        }
        Some(self.external_name.clone())
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.external_name, self.place_type)
    }
}

/// Split a trailing " county" or " state" off a name and report the type it
/// implies.
///
/// "Kern County" gives `("Kern", Some(County))`, "Arizona State" gives
/// `("Arizona", Some(State))` and "Chicago" gives `("Chicago", None)`.
#[must_use]
pub fn parse_name(name: &str) -> (&str, Option<PlaceType>) {
    const SUFFIXES: [(&str, PlaceType); 2] =
        [(" county", PlaceType::County), (" state", PlaceType::State)];

    for (suffix, place_type) in SUFFIXES {
        if let Some(at) = name.len().checked_sub(suffix.len())
            && name
                .get(at..)
                .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
        {
            return (&name[..at], Some(place_type));
        }
    }
    (name, None)
}

/// Place types known to be structurally larger than `place_type`.
///
/// The hierarchy is loose: postal codes are not smaller than cities, but
/// counties and cities sit inside states and states inside nations.
#[must_use]
pub fn larger_place_types(place_type: PlaceType) -> Vec<PlaceType> {
    let mut larger = vec![PlaceType::Everywhere];
    if !matches!(place_type, PlaceType::Nation | PlaceType::Everywhere) {
        larger.push(PlaceType::Nation);
    }
    if matches!(
        place_type,
        PlaceType::County | PlaceType::City | PlaceType::PostalCode
    ) {
        larger.push(PlaceType::State);
    }
    if place_type == PlaceType::City {
        larger.push(PlaceType::County);
    }
    larger
}

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum PlaceError {
        #[error("Place '{external_id}' refers to unknown parent '{parent_id}'")]
        UnknownParent {
            external_id: String,
            parent_id: String,
        },
        #[error("No nation with abbreviation '{0}' is loaded")]
        UnknownNation(String),
        #[error("Data error: {0}")]
        Data(#[from] libmatch_data_processing::DataError),
    }
    pub type Result<T> = std::result::Result<T, PlaceError>;
}
